//! Refresh-window calculation for proactive token refresh.
//!
//! Decides whether a credential is close enough to expiry that it should be
//! refreshed now, and if not, when the refresh becomes due. The decision is
//! jittered: each call draws a uniform offset in `[-jitter, +jitter]` and
//! widens or narrows the threshold by it, so a fleet of instances holding
//! credentials with correlated expiry times does not hit the token endpoint
//! at the same instant. A positive draw refreshes earlier.
//!
//! These functions are pure apart from the single random draw and are cheap
//! enough to call on every request.

use rand::Rng as _;

use tablelink_core::time::now_ms;

use crate::error::{AuthError, AuthResult};

/// Default threshold before expiry at which a refresh becomes due (5 minutes).
pub const DEFAULT_REFRESH_THRESHOLD_MS: i64 = 5 * 60 * 1000;

/// Default jitter half-width applied to the threshold (30 seconds).
pub const DEFAULT_REFRESH_JITTER_MS: i64 = 30 * 1000;

/// The refresh decision for one credential at one instant.
///
/// Derived on demand from the expiry timestamp; never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshWindow {
    /// Whether a refresh is due now.
    pub should_refresh: bool,
    /// The instant (epoch ms) at which the refresh is or becomes due.
    /// Never earlier than the evaluation instant.
    pub refresh_at_ms: i64,
    /// Milliseconds until `refresh_at_ms`; zero when the refresh is due.
    pub time_until_refresh_ms: i64,
    /// The credential expiry this window was computed from.
    pub expiry_ms: i64,
    /// The (unjittered) threshold the decision used.
    pub threshold_ms: i64,
}

/// Returns true if the credential expiring at `expiry_ms` should be
/// refreshed now.
///
/// # Errors
///
/// Returns an `InvalidArgument` error for negative `threshold_ms` or
/// `jitter_ms`.
pub fn is_expiring_soon(expiry_ms: i64, threshold_ms: i64, jitter_ms: i64) -> AuthResult<bool> {
    Ok(calculate_refresh_window(expiry_ms, threshold_ms, jitter_ms)?.should_refresh)
}

/// Computes the full refresh window for a credential expiring at `expiry_ms`.
///
/// A zero `threshold_ms` disables proactive refresh: only an already-expired
/// credential reports `should_refresh`.
///
/// # Errors
///
/// Returns an `InvalidArgument` error for negative `threshold_ms` or
/// `jitter_ms`.
pub fn calculate_refresh_window(
    expiry_ms: i64,
    threshold_ms: i64,
    jitter_ms: i64,
) -> AuthResult<RefreshWindow> {
    window_at(now_ms(), expiry_ms, threshold_ms, jitter_ms)
}

fn window_at(
    now: i64,
    expiry_ms: i64,
    threshold_ms: i64,
    jitter_ms: i64,
) -> AuthResult<RefreshWindow> {
    if threshold_ms < 0 {
        return Err(AuthError::invalid_argument(format!(
            "threshold_ms must be non-negative, got {threshold_ms}"
        )));
    }
    if jitter_ms < 0 {
        return Err(AuthError::invalid_argument(format!(
            "jitter_ms must be non-negative, got {jitter_ms}"
        )));
    }

    // Already expired: refresh immediately.
    if expiry_ms <= now {
        return Ok(RefreshWindow {
            should_refresh: true,
            refresh_at_ms: now,
            time_until_refresh_ms: 0,
            expiry_ms,
            threshold_ms,
        });
    }

    // Proactive refresh disabled; the expired case above is the only trigger.
    if threshold_ms == 0 {
        return Ok(RefreshWindow {
            should_refresh: false,
            refresh_at_ms: expiry_ms,
            time_until_refresh_ms: expiry_ms - now,
            expiry_ms,
            threshold_ms,
        });
    }

    let jitter = if jitter_ms == 0 {
        0
    } else {
        rand::rng().random_range(-jitter_ms..=jitter_ms)
    };

    // A positive draw widens the window so this instance refreshes earlier
    // than its peers; a negative draw narrows it.
    let effective_threshold = threshold_ms + jitter;
    let should_refresh = expiry_ms - now <= effective_threshold;

    // When the window has already opened, report "now" rather than an
    // instant in the past.
    let refresh_at_ms = if should_refresh {
        now
    } else {
        expiry_ms - effective_threshold
    };

    Ok(RefreshWindow {
        should_refresh,
        refresh_at_ms,
        time_until_refresh_ms: refresh_at_ms - now,
        expiry_ms,
        threshold_ms,
    })
}
