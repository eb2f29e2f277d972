//! Core types shared across tablelink crates: time helpers and tracing setup

pub mod time;
pub mod tracing;

pub use time::{from_epoch_ms, now_ms, to_epoch_ms};
pub use tracing::{TracingConfig, TracingError, TracingOutputFormat, init_tracing};
