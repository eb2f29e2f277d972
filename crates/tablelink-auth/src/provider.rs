//! AuthProvider trait definition.
//!
//! This module defines the [`AuthProvider`] trait, the contract the rest of
//! the system consumes: obtain an authorized API client, check or refresh
//! the cached credential, and report authentication status.

use std::future::Future;
use std::pin::Pin;

use chrono::{DateTime, Utc};

use crate::client::ApiClient;
use crate::error::AuthResult;

/// A boxed future for async trait methods.
///
/// Used so the trait stays object-safe; async functions in traits do not
/// yet combine well with dynamic dispatch.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A snapshot of the provider's authentication state.
#[derive(Debug, Clone)]
pub struct AuthInfo {
    /// Whether a usable credential is present (valid now, or refreshable).
    pub is_authenticated: bool,
    /// The scopes granted to the current credential.
    pub scopes: Vec<String>,
    /// When the current access token expires, if known.
    pub expires_at: Option<DateTime<Utc>>,
    /// The client name this provider was configured with.
    pub client_name: String,
}

impl AuthInfo {
    /// Creates an unauthenticated snapshot for the given client name.
    pub fn unauthenticated(client_name: impl Into<String>) -> Self {
        Self {
            is_authenticated: false,
            scopes: Vec::new(),
            expires_at: None,
            client_name: client_name.into(),
        }
    }
}

/// The contract consumed by downstream callers.
///
/// Implementations own their credential and coordinate refreshes
/// internally; callers never see partially refreshed state.
///
/// # Implementation Notes
///
/// - Implementations must be `Send + Sync`; callers share one instance
///   across tasks.
/// - `validate_auth` must be cheap when the credential is far from expiry:
///   no I/O, no suspension.
/// - `auth_client` may run an interactive authorization flow when no usable
///   credential exists.
pub trait AuthProvider: Send + Sync {
    /// Returns the provider name (e.g. `"oauth2:default"`).
    fn name(&self) -> &str;

    /// Loads any persisted credential and prepares the provider for use.
    ///
    /// Calling this is optional; every other operation initializes lazily
    /// on first use.
    fn initialize(&self) -> BoxFuture<'_, AuthResult<()>>;

    /// Returns an API client carrying a fresh access token.
    ///
    /// Refreshes the credential if it is expiring, and falls back to the
    /// interactive authorization flow when no usable credential exists.
    fn auth_client(&self) -> BoxFuture<'_, AuthResult<ApiClient>>;

    /// Checks whether a usable credential is present, refreshing it
    /// proactively when it is close to expiry.
    ///
    /// Refresh failures are absorbed into an `Ok(false)` result; callers
    /// get a boolean, not a refresh-specific error.
    fn validate_auth(&self) -> BoxFuture<'_, AuthResult<bool>>;

    /// Forces a token refresh.
    ///
    /// Unlike `validate_auth`, failures surface as typed errors: a missing
    /// or rejected refresh token, a network failure, or a storage failure.
    fn refresh_token(&self) -> BoxFuture<'_, AuthResult<()>>;

    /// Returns a snapshot of the current authentication state.
    fn auth_info(&self) -> BoxFuture<'_, AuthResult<AuthInfo>>;

    /// Returns true if the provider is operational: storage reachable and a
    /// usable credential present.
    fn health_check(&self) -> BoxFuture<'_, AuthResult<bool>>;

    /// Discards the cached credential and clears persisted tokens.
    fn clear_auth(&self) -> BoxFuture<'_, AuthResult<()>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unauthenticated_snapshot() {
        let info = AuthInfo::unauthenticated("default");
        assert!(!info.is_authenticated);
        assert!(info.scopes.is_empty());
        assert!(info.expires_at.is_none());
        assert_eq!(info.client_name, "default");
    }
}
