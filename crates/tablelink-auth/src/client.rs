//! Authorized API client handle.
//!
//! The thin handle returned by [`AuthProvider::auth_client`]: a reqwest
//! client plus the API base URL and the bearer token current at the time it
//! was handed out. The per-resource operations built on top of it live
//! elsewhere; this module only guarantees that every request it builds
//! carries authorization.
//!
//! [`AuthProvider::auth_client`]: crate::provider::AuthProvider::auth_client

use std::fmt;
use std::time::Duration;

use reqwest::Method;

/// An HTTP handle authorized against the wrapped API.
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    access_token: String,
}

impl ApiClient {
    /// Creates a client for the given base URL and access token.
    pub fn new(
        access_token: impl Into<String>,
        base_url: impl Into<String>,
        timeout: Duration,
        user_agent: &str,
    ) -> Self {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()
            .expect("failed to create HTTP client");

        Self {
            http,
            base_url: base_url.into(),
            access_token: access_token.into(),
        }
    }

    /// Updates the access token (after a refresh).
    pub fn set_access_token(&mut self, token: impl Into<String>) {
        self.access_token = token.into();
    }

    /// Returns the API base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Builds an authorized request for a path under the base URL.
    ///
    /// The path should start with `/`; the bearer token is attached.
    pub fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        self.http
            .request(method, format!("{}{}", self.base_url, path))
            .bearer_auth(&self.access_token)
    }
}

// The access token never appears in debug output.
impl fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.base_url)
            .field("access_token", &"[REDACTED]")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_client() -> ApiClient {
        ApiClient::new(
            "secret-token",
            "https://api.example.com/v0",
            Duration::from_secs(5),
            "tablelink-test",
        )
    }

    #[test]
    fn request_targets_base_url() {
        let client = test_client();
        let request = client
            .request(Method::GET, "/meta/whoami")
            .build()
            .unwrap();
        assert_eq!(
            request.url().as_str(),
            "https://api.example.com/v0/meta/whoami"
        );
    }

    #[test]
    fn request_carries_bearer_token() {
        let client = test_client();
        let request = client
            .request(Method::GET, "/meta/whoami")
            .build()
            .unwrap();
        let auth = request.headers().get("authorization").unwrap();
        assert_eq!(auth.to_str().unwrap(), "Bearer secret-token");
    }

    #[test]
    fn debug_redacts_token() {
        let debug = format!("{:?}", test_client());
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("secret-token"));
    }

    #[test]
    fn token_can_be_replaced() {
        let mut client = test_client();
        client.set_access_token("rotated");
        let request = client
            .request(Method::GET, "/meta/whoami")
            .build()
            .unwrap();
        let auth = request.headers().get("authorization").unwrap();
        assert_eq!(auth.to_str().unwrap(), "Bearer rotated");
    }
}
