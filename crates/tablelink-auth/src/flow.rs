//! Interactive authorization flow.
//!
//! Orchestrates one end-to-end login: generate CSRF state and a PKCE pair,
//! start the loopback listener, hand the authorization URL to the user,
//! wait for the redirect, verify the echoed state, and exchange the code
//! for tokens. The listener is torn down on every exit path.

use tracing::{info, warn};

use crate::browser::BrowserLauncher;
use crate::config::AuthConfig;
use crate::credential::Credential;
use crate::error::{AuthError, AuthResult};
use crate::listener::{CallbackListener, CallbackResult};
use crate::oauth::TokenClient;
use crate::pkce;

/// State for one authorization attempt.
///
/// Created when the attempt starts and consumed exactly once by the token
/// exchange; nothing outlives the attempt.
#[derive(Debug)]
pub struct AuthFlowState {
    /// CSRF token round-tripped through the redirect.
    pub state: String,
    /// PKCE code verifier held locally until exchange.
    pub code_verifier: String,
    /// The redirect URI sent to the authorization server.
    pub redirect_uri: String,
    /// The scopes requested for this attempt.
    pub scopes: Vec<String>,
}

impl AuthFlowState {
    fn new(redirect_uri: String, scopes: Vec<String>) -> Self {
        Self {
            state: pkce::generate_state(),
            code_verifier: pkce::generate_code_verifier(),
            redirect_uri,
            scopes,
        }
    }
}

/// One-shot orchestrator for the interactive login.
pub struct AuthorizationFlow<'a> {
    config: &'a AuthConfig,
    tokens: &'a TokenClient,
    browser: &'a dyn BrowserLauncher,
}

impl<'a> AuthorizationFlow<'a> {
    /// Creates a flow over the given collaborators.
    pub fn new(
        config: &'a AuthConfig,
        tokens: &'a TokenClient,
        browser: &'a dyn BrowserLauncher,
    ) -> Self {
        Self {
            config,
            tokens,
            browser,
        }
    }

    /// Runs the flow to completion and returns the obtained credential.
    ///
    /// # Errors
    ///
    /// - `UserDenied` when the user refused consent
    /// - `StateMismatch` when the callback state differs from ours
    /// - `CallbackTimeout` when no redirect arrives in time
    /// - `Network` for transport failures and other server errors
    pub async fn run(&self) -> AuthResult<Credential> {
        let port = self.config.redirect_port()?;
        let path = self.config.redirect_path()?;

        let listener = CallbackListener::bind(port, &path).await?;

        // A configured port of 0 binds an ephemeral port; the URI sent to
        // the server must carry the one actually bound.
        let redirect_uri = if port == 0 {
            self.config
                .redirect_uri
                .replace(":0/", &format!(":{}/", listener.local_addr().port()))
        } else {
            self.config.redirect_uri.clone()
        };

        let flow = AuthFlowState::new(redirect_uri, self.config.scopes.clone());
        let challenge = pkce::generate_code_challenge(&flow.code_verifier)?;
        let auth_url = build_authorization_url(self.config, &flow, &challenge);

        info!("starting interactive authorization, opening browser");
        if let Err(e) = self.browser.open(&auth_url) {
            // A browser failure never aborts the flow; the user can follow
            // the URL by hand.
            warn!(error = %e, "failed to open browser");
            eprintln!("\nOpen this URL in your browser to continue:\n\n{auth_url}\n");
        }

        let callback = listener.wait(self.config.callback_timeout).await?;
        self.complete(flow, callback).await
    }

    /// Validates the callback and performs the token exchange.
    async fn complete(
        &self,
        flow: AuthFlowState,
        callback: CallbackResult,
    ) -> AuthResult<Credential> {
        if let Some(error) = callback.error {
            return Err(if error == "access_denied" {
                AuthError::user_denied("the user denied authorization")
            } else {
                AuthError::network(format!("authorization server returned an error: {error}"))
            }
            .with_operation("authorize"));
        }

        let code = callback.code.ok_or_else(|| {
            AuthError::network("callback carried no authorization code").with_operation("authorize")
        })?;

        // The echoed state must match ours exactly; anything else may be a
        // forged callback and never reaches token exchange.
        if callback.state.as_deref() != Some(flow.state.as_str()) {
            return Err(AuthError::state_mismatch(
                "callback state does not match this attempt",
            )
            .with_operation("authorize"));
        }

        info!("received authorization code, exchanging for tokens");
        self.tokens
            .exchange_code(&code, &flow.code_verifier, &flow.redirect_uri, &flow.scopes)
            .await
    }
}

/// Builds the authorization URL for one attempt.
///
/// `access_type=offline` and `prompt=consent` force the server to issue a
/// refresh token even on repeat logins.
pub fn build_authorization_url(
    config: &AuthConfig,
    flow: &AuthFlowState,
    challenge: &str,
) -> String {
    let scope = flow.scopes.join(" ");

    format!(
        "{}?client_id={}&redirect_uri={}&response_type=code&scope={}&\
         code_challenge={}&code_challenge_method=S256&state={}&\
         access_type=offline&prompt=consent",
        config.authorize_url,
        urlencoding::encode(&config.credentials.client_id),
        urlencoding::encode(&flow.redirect_uri),
        urlencoding::encode(&scope),
        urlencoding::encode(challenge),
        urlencoding::encode(&flow.state),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClientCredentials;
    use crate::error::AuthErrorCode;

    fn test_config() -> AuthConfig {
        AuthConfig::new(ClientCredentials::new("client-123", "secret-456"))
    }

    fn test_flow_state() -> AuthFlowState {
        AuthFlowState::new(
            "http://127.0.0.1:8763/oauth/callback".to_string(),
            vec!["data.records:read".to_string()],
        )
    }

    #[test]
    fn flow_state_is_fresh_per_attempt() {
        let a = test_flow_state();
        let b = test_flow_state();
        assert_ne!(a.state, b.state);
        assert_ne!(a.code_verifier, b.code_verifier);
    }

    #[test]
    fn authorization_url_format() {
        let config = test_config();
        let flow = test_flow_state();
        let challenge = pkce::generate_code_challenge(&flow.code_verifier).unwrap();
        let url = build_authorization_url(&config, &flow, &challenge);

        assert!(url.starts_with(AuthConfig::DEFAULT_AUTHORIZE_URL));
        assert!(url.contains("client_id=client-123"));
        assert!(url.contains("response_type=code"));
        assert!(url.contains("code_challenge_method=S256"));
        assert!(url.contains(&format!("code_challenge={challenge}")));
        assert!(url.contains(&format!("state={}", flow.state)));
        assert!(url.contains("access_type=offline"));
        assert!(url.contains("prompt=consent"));
        assert!(url.contains("redirect_uri=http%3A%2F%2F127.0.0.1%3A8763%2Foauth%2Fcallback"));
    }

    #[tokio::test]
    async fn denial_maps_to_user_denied() {
        let config = test_config();
        let tokens = TokenClient::new(&config);
        let flow = AuthorizationFlow::new(&config, &tokens, &crate::browser::NoopBrowser);

        let callback = CallbackResult {
            error: Some("access_denied".to_string()),
            ..Default::default()
        };
        let err = flow.complete(test_flow_state(), callback).await.unwrap_err();
        assert_eq!(err.code(), AuthErrorCode::UserDenied);
    }

    #[tokio::test]
    async fn other_callback_errors_map_to_network() {
        let config = test_config();
        let tokens = TokenClient::new(&config);
        let flow = AuthorizationFlow::new(&config, &tokens, &crate::browser::NoopBrowser);

        let callback = CallbackResult {
            error: Some("temporarily_unavailable".to_string()),
            ..Default::default()
        };
        let err = flow.complete(test_flow_state(), callback).await.unwrap_err();
        assert_eq!(err.code(), AuthErrorCode::Network);
    }

    #[tokio::test]
    async fn state_mismatch_never_reaches_exchange() {
        let config = test_config();
        let tokens = TokenClient::new(&config);
        let flow = AuthorizationFlow::new(&config, &tokens, &crate::browser::NoopBrowser);

        let state = test_flow_state();
        let callback = CallbackResult {
            code: Some("code-1".to_string()),
            state: Some("forged".to_string()),
            ..Default::default()
        };
        // The token endpoint here is the real default; reaching it would
        // fail with a network error, so a StateMismatch proves we stopped
        // before the exchange.
        let err = flow.complete(state, callback).await.unwrap_err();
        assert_eq!(err.code(), AuthErrorCode::StateMismatch);
    }

    #[tokio::test]
    async fn missing_state_is_a_mismatch() {
        let config = test_config();
        let tokens = TokenClient::new(&config);
        let flow = AuthorizationFlow::new(&config, &tokens, &crate::browser::NoopBrowser);

        let callback = CallbackResult {
            code: Some("code-1".to_string()),
            ..Default::default()
        };
        let err = flow.complete(test_flow_state(), callback).await.unwrap_err();
        assert_eq!(err.code(), AuthErrorCode::StateMismatch);
    }

    #[tokio::test]
    async fn missing_code_is_a_network_error() {
        let config = test_config();
        let tokens = TokenClient::new(&config);
        let flow = AuthorizationFlow::new(&config, &tokens, &crate::browser::NoopBrowser);

        let err = flow
            .complete(test_flow_state(), CallbackResult::default())
            .await
            .unwrap_err();
        assert_eq!(err.code(), AuthErrorCode::Network);
    }
}
