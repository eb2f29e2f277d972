//! OAuth2 authentication lifecycle for the tablelink connector.
//!
//! This crate obtains, caches, proactively refreshes, and hands out access
//! credentials for the wrapped records API. Many concurrent callers can ask
//! for a client at once; at most one network refresh is ever in flight, and
//! callers holding a still-valid token are answered without suspending.
//!
//! # Architecture
//!
//! - [`AuthProvider`] - the contract the rest of the system consumes
//! - [`OAuth2AuthProvider`] - the façade implementing it
//! - [`window`] - decides when a credential is close enough to expiry to
//!   refresh, with jitter so correlated instances spread out
//! - [`SingleFlight`] - shares one in-flight refresh between callers
//! - [`AuthorizationFlow`] - the interactive PKCE login: loopback listener,
//!   browser handoff, CSRF-checked code exchange
//! - [`CredentialStore`] - the persistence seam, file-backed by default
//!
//! # Authentication Flow
//!
//! 1. The provider loads any persisted credential at initialization
//! 2. `validate_auth` keeps it fresh: inside the jittered refresh window a
//!    single shared refresh runs against the token endpoint
//! 3. When no usable credential exists, `auth_client` runs the interactive
//!    flow: a CSRF state and PKCE pair are generated, the user's browser is
//!    pointed at the authorization URL, and the loopback listener captures
//!    the redirect
//! 4. The authorization code and PKCE verifier are exchanged for tokens,
//!    which are persisted before the call returns
//!
//! # Example
//!
//! ```ignore
//! use tablelink_auth::{AuthConfig, AuthProvider, ClientCredentials, OAuth2AuthProvider};
//!
//! let config = AuthConfig::new(ClientCredentials::new(client_id, client_secret));
//! let provider = OAuth2AuthProvider::with_defaults(config)?;
//!
//! let client = provider.auth_client().await?;
//! let response = client.request(reqwest::Method::GET, "/meta/bases").send().await?;
//! ```

pub mod browser;
pub mod client;
pub mod config;
pub mod credential;
pub mod error;
pub mod flow;
pub mod listener;
pub mod oauth;
pub mod pkce;
pub mod provider;
pub mod singleflight;
pub mod storage;
pub mod window;

pub mod oauth2;

pub use browser::{BrowserLauncher, NoopBrowser, SystemBrowser};
pub use client::ApiClient;
pub use config::{AuthConfig, ClientCredentials};
pub use credential::{Credential, StoredCredential};
pub use error::{AuthError, AuthErrorCode, AuthResult};
pub use flow::{AuthFlowState, AuthorizationFlow};
pub use listener::{CallbackListener, CallbackResult};
pub use oauth::{TokenClient, TokenResponse};
pub use oauth2::OAuth2AuthProvider;
pub use provider::{AuthInfo, AuthProvider, BoxFuture};
pub use singleflight::SingleFlight;
pub use storage::{CredentialStore, FileCredentialStore, MemoryCredentialStore};
pub use window::{
    DEFAULT_REFRESH_JITTER_MS, DEFAULT_REFRESH_THRESHOLD_MS, RefreshWindow,
    calculate_refresh_window, is_expiring_soon,
};
