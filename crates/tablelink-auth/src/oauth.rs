//! Token endpoint client.
//!
//! Speaks the two token-endpoint grants this system uses: exchanging an
//! authorization code (with its PKCE verifier) for a token set, and
//! refreshing an access token. Everything else about the authorization
//! flow lives in [`crate::flow`].

use tracing::{debug, info};

use crate::config::AuthConfig;
use crate::credential::Credential;
use crate::error::{AuthError, AuthResult};

/// Client for the authorization server's token endpoint.
#[derive(Debug, Clone)]
pub struct TokenClient {
    http: reqwest::Client,
    token_url: String,
    client_id: String,
    client_secret: String,
}

/// Response from the token endpoint.
#[derive(Debug, serde::Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub token_type: Option<String>,
}

impl TokenClient {
    /// Creates a token client from the provider configuration.
    pub fn new(config: &AuthConfig) -> Self {
        let http = reqwest::Client::builder()
            .timeout(config.http_timeout)
            .user_agent(config.user_agent.clone())
            .build()
            .expect("failed to create HTTP client");

        Self {
            http,
            token_url: config.token_url.clone(),
            client_id: config.credentials.client_id.clone(),
            client_secret: config.credentials.client_secret.clone(),
        }
    }

    /// Exchanges an authorization code for a credential.
    ///
    /// The scopes recorded on the credential come from the response when
    /// the server echoes them, otherwise from the requested set.
    pub async fn exchange_code(
        &self,
        code: &str,
        verifier: &str,
        redirect_uri: &str,
        requested_scopes: &[String],
    ) -> AuthResult<Credential> {
        let params = [
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("code", code),
            ("code_verifier", verifier),
            ("grant_type", "authorization_code"),
            ("redirect_uri", redirect_uri),
        ];

        let response = self.post_form(&params, "exchange_code").await?;
        let granted_scopes = match &response.scope {
            Some(scope) => scope.split_whitespace().map(str::to_string).collect(),
            None => requested_scopes.to_vec(),
        };

        info!("exchanged authorization code for tokens");
        Ok(Credential::new(
            response.access_token,
            response.refresh_token,
            response.expires_in,
            granted_scopes,
        ))
    }

    /// Refreshes an access token.
    ///
    /// A 4xx rejection means the refresh token itself is no longer usable
    /// and surfaces as `RefreshTokenMissing`; transport failures and 5xx
    /// responses surface as `Network`.
    pub async fn refresh(&self, refresh_token: &str) -> AuthResult<TokenResponse> {
        let params = [
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("refresh_token", refresh_token),
            ("grant_type", "refresh_token"),
        ];

        let response = self.post_form(&params, "refresh_token").await?;
        debug!("refreshed access token");
        Ok(response)
    }

    async fn post_form(
        &self,
        params: &[(&str, &str)],
        operation: &str,
    ) -> AuthResult<TokenResponse> {
        let response = self
            .http
            .post(&self.token_url)
            .form(params)
            .send()
            .await
            .map_err(|e| {
                AuthError::network(format!("token endpoint request failed: {e}"))
                    .with_operation(operation)
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            AuthError::network(format!("failed to read token endpoint response: {e}"))
                .with_operation(operation)
        })?;

        if !status.is_success() {
            // The error body is the server's JSON error description; tokens
            // never appear in it.
            if status.is_client_error() {
                return Err(AuthError::refresh_token_missing(format!(
                    "token endpoint rejected the request ({status}): {body}"
                ))
                .with_operation(operation));
            }
            return Err(AuthError::network(format!(
                "token endpoint returned {status}: {body}"
            ))
            .with_operation(operation));
        }

        serde_json::from_str(&body).map_err(|e| {
            AuthError::network(format!("invalid token endpoint response: {e}"))
                .with_operation(operation)
        })
    }
}
