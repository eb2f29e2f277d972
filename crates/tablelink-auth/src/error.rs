//! Error types for authentication operations.
//!
//! This module defines the error types produced by the auth lifecycle:
//! configuration validation, the interactive authorization flow, token
//! refresh, and credential storage. Errors carry a coarse [`AuthErrorCode`]
//! for classification plus the operation that produced them; token values
//! themselves never appear in error context.

use std::fmt;
use thiserror::Error;

/// The category of an authentication error.
///
/// This enum provides a high-level classification of errors so callers can
/// distinguish "the user said no" from "the network failed" from "someone
/// may be tampering with the callback".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthErrorCode {
    /// The provider has not been initialized, or initialization failed.
    NotInitialized,
    /// No refresh token is available, or the server rejected it.
    RefreshTokenMissing,
    /// The user denied consent during the interactive flow.
    UserDenied,
    /// The callback state did not match the value we sent (possible CSRF).
    StateMismatch,
    /// No callback arrived before the deadline.
    CallbackTimeout,
    /// Network or transport failure, including unexpected server responses.
    Network,
    /// The credential store failed to persist or load tokens.
    Storage,
    /// Missing or invalid configuration.
    Configuration,
    /// A caller passed an invalid argument (e.g. a negative threshold).
    InvalidArgument,
    /// A PKCE verifier did not match the required character set.
    PkceFormat,
    /// Internal error - unexpected state, bug.
    Internal,
}

impl AuthErrorCode {
    /// Returns true if this error is transient and the operation may be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network | Self::Storage)
    }

    /// Returns true if recovering requires a new interactive authorization.
    pub fn requires_reauth(&self) -> bool {
        matches!(self, Self::RefreshTokenMissing | Self::UserDenied)
    }

    /// Returns a stable machine-readable name for this error code.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotInitialized => "not_initialized",
            Self::RefreshTokenMissing => "refresh_token_missing",
            Self::UserDenied => "user_denied",
            Self::StateMismatch => "state_mismatch",
            Self::CallbackTimeout => "callback_timeout",
            Self::Network => "network_error",
            Self::Storage => "storage_error",
            Self::Configuration => "configuration_error",
            Self::InvalidArgument => "invalid_argument",
            Self::PkceFormat => "pkce_format_error",
            Self::Internal => "internal_error",
        }
    }
}

impl fmt::Display for AuthErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An error from an authentication operation.
#[derive(Debug, Error)]
pub struct AuthError {
    /// The error code categorizing this error.
    code: AuthErrorCode,
    /// A human-readable message describing the error.
    message: String,
    /// The operation that produced this error (e.g. "refresh_token").
    operation: Option<String>,
    /// The underlying cause of this error, if any.
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl AuthError {
    /// Creates a new auth error with the given code and message.
    pub fn new(code: AuthErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            operation: None,
            source: None,
        }
    }

    /// Creates a not-initialized error.
    pub fn not_initialized(message: impl Into<String>) -> Self {
        Self::new(AuthErrorCode::NotInitialized, message)
    }

    /// Creates a missing/rejected refresh token error.
    pub fn refresh_token_missing(message: impl Into<String>) -> Self {
        Self::new(AuthErrorCode::RefreshTokenMissing, message)
    }

    /// Creates a user-denied-consent error.
    pub fn user_denied(message: impl Into<String>) -> Self {
        Self::new(AuthErrorCode::UserDenied, message)
    }

    /// Creates a CSRF state mismatch error.
    pub fn state_mismatch(message: impl Into<String>) -> Self {
        Self::new(AuthErrorCode::StateMismatch, message)
    }

    /// Creates a callback timeout error.
    pub fn callback_timeout(message: impl Into<String>) -> Self {
        Self::new(AuthErrorCode::CallbackTimeout, message)
    }

    /// Creates a network error.
    pub fn network(message: impl Into<String>) -> Self {
        Self::new(AuthErrorCode::Network, message)
    }

    /// Creates a storage error.
    pub fn storage(message: impl Into<String>) -> Self {
        Self::new(AuthErrorCode::Storage, message)
    }

    /// Creates a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(AuthErrorCode::Configuration, message)
    }

    /// Creates an invalid argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(AuthErrorCode::InvalidArgument, message)
    }

    /// Creates a PKCE format error.
    pub fn pkce_format(message: impl Into<String>) -> Self {
        Self::new(AuthErrorCode::PkceFormat, message)
    }

    /// Creates an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(AuthErrorCode::Internal, message)
    }

    /// Sets the operation name for this error.
    pub fn with_operation(mut self, operation: impl Into<String>) -> Self {
        self.operation = Some(operation.into());
        self
    }

    /// Sets the source error for this error.
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.source = Some(Box::new(source));
        self
    }

    /// Returns the error code.
    pub fn code(&self) -> AuthErrorCode {
        self.code
    }

    /// Returns the error message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns the operation name, if set.
    pub fn operation(&self) -> Option<&str> {
        self.operation.as_deref()
    }

    /// Returns true if this error is transient and may be retried.
    pub fn is_retryable(&self) -> bool {
        self.code.is_retryable()
    }
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ref operation) = self.operation {
            write!(f, "[{}] ", operation)?;
        }
        write!(f, "{}: {}", self.code, self.message)
    }
}

/// A specialized Result type for authentication operations.
pub type AuthResult<T> = Result<T, AuthError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_code_retryable() {
        assert!(AuthErrorCode::Network.is_retryable());
        assert!(AuthErrorCode::Storage.is_retryable());
        assert!(!AuthErrorCode::UserDenied.is_retryable());
        assert!(!AuthErrorCode::StateMismatch.is_retryable());
        assert!(!AuthErrorCode::Configuration.is_retryable());
    }

    #[test]
    fn error_code_requires_reauth() {
        assert!(AuthErrorCode::RefreshTokenMissing.requires_reauth());
        assert!(AuthErrorCode::UserDenied.requires_reauth());
        assert!(!AuthErrorCode::Network.requires_reauth());
        assert!(!AuthErrorCode::CallbackTimeout.requires_reauth());
    }

    #[test]
    fn error_code_display() {
        assert_eq!(AuthErrorCode::StateMismatch.as_str(), "state_mismatch");
        assert_eq!(AuthErrorCode::CallbackTimeout.as_str(), "callback_timeout");
        assert_eq!(
            AuthErrorCode::RefreshTokenMissing.as_str(),
            "refresh_token_missing"
        );
    }

    #[test]
    fn auth_error_creation() {
        let err = AuthError::user_denied("authorization was denied");
        assert_eq!(err.code(), AuthErrorCode::UserDenied);
        assert_eq!(err.message(), "authorization was denied");
        assert!(err.operation().is_none());
        assert!(!err.is_retryable());
    }

    #[test]
    fn auth_error_with_operation() {
        let err = AuthError::network("connection reset").with_operation("refresh_token");
        assert_eq!(err.operation(), Some("refresh_token"));
        assert!(err.is_retryable());
    }

    #[test]
    fn auth_error_display() {
        let err = AuthError::callback_timeout("no callback within 300s").with_operation("authorize");
        let display = format!("{}", err);
        assert!(display.contains("[authorize]"));
        assert!(display.contains("callback_timeout"));
        assert!(display.contains("no callback within 300s"));
    }

    #[test]
    fn auth_error_with_source() {
        use std::error::Error;
        let io_err = std::io::Error::other("disk full");
        let err = AuthError::storage("failed to persist tokens").with_source(io_err);
        assert!(err.source().is_some());
    }
}
