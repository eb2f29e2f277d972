//! OAuth2 auth provider.
//!
//! The façade composing the rest of this crate into the [`AuthProvider`]
//! contract. One instance exclusively owns its in-memory credential and
//! its in-flight refresh; there is no cross-instance sharing. The
//! `validate_auth` fast path (credential far from expiry) touches only an
//! atomic and one lock with no suspension; everything slow funnels through
//! the single-flight coordinator or the shared login gate.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Instant;

use tracing::{debug, info, warn};

use tablelink_core::time::now_ms;

use crate::browser::{BrowserLauncher, SystemBrowser};
use crate::client::ApiClient;
use crate::config::AuthConfig;
use crate::credential::{Credential, StoredCredential};
use crate::error::{AuthError, AuthResult};
use crate::flow::AuthorizationFlow;
use crate::oauth::TokenClient;
use crate::provider::{AuthInfo, AuthProvider, BoxFuture};
use crate::singleflight::SingleFlight;
use crate::storage::{CredentialStore, FileCredentialStore};
use crate::window;

/// OAuth2 implementation of the [`AuthProvider`] contract.
pub struct OAuth2AuthProvider {
    config: AuthConfig,
    display_name: String,
    tokens: TokenClient,
    store: Arc<dyn CredentialStore>,
    browser: Arc<dyn BrowserLauncher>,

    /// The credential owned by this instance. Mutated only by a refresh or
    /// a token exchange.
    credential: RwLock<Option<Credential>>,

    initialized: AtomicBool,
    init_gate: tokio::sync::Mutex<()>,

    /// Coordinates refresh attempts: at most one network refresh in flight.
    refresh_flight: SingleFlight,

    /// When the last proactive refresh attempt was admitted.
    last_refresh_attempt: Mutex<Option<Instant>>,

    /// Serializes interactive logins so concurrent callers share one
    /// browser handoff and listener.
    login_gate: tokio::sync::Mutex<()>,
}

impl std::fmt::Debug for OAuth2AuthProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuth2AuthProvider")
            .field("display_name", &self.display_name)
            .field("initialized", &self.initialized)
            .finish_non_exhaustive()
    }
}

impl OAuth2AuthProvider {
    /// Creates a provider over the given store and browser launcher.
    ///
    /// # Errors
    ///
    /// Returns a `Configuration` error when the config is invalid; a
    /// provider is never constructed from one.
    pub fn new(
        config: AuthConfig,
        store: Arc<dyn CredentialStore>,
        browser: Arc<dyn BrowserLauncher>,
    ) -> AuthResult<Self> {
        config.validate()?;

        let display_name = config.provider_name();
        let tokens = TokenClient::new(&config);

        Ok(Self {
            config,
            display_name,
            tokens,
            store,
            browser,
            credential: RwLock::new(None),
            initialized: AtomicBool::new(false),
            init_gate: tokio::sync::Mutex::new(()),
            refresh_flight: SingleFlight::new(),
            last_refresh_attempt: Mutex::new(None),
            login_gate: tokio::sync::Mutex::new(()),
        })
    }

    /// Creates a provider with the file-backed store from the config's
    /// token path and the system browser.
    pub fn with_defaults(config: AuthConfig) -> AuthResult<Self> {
        let store = Arc::new(FileCredentialStore::new(config.token_path.clone()));
        Self::new(config, store, Arc::new(SystemBrowser))
    }

    /// Returns the provider configuration.
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    fn credential(&self) -> Option<Credential> {
        self.credential.read().unwrap().clone()
    }

    fn set_credential(&self, credential: Credential) {
        *self.credential.write().unwrap() = Some(credential);
    }

    /// Loads the persisted credential once. Every public operation calls
    /// this; after the first success it is a single atomic load.
    async fn ensure_initialized(&self) -> AuthResult<()> {
        if self.initialized.load(Ordering::Acquire) {
            return Ok(());
        }

        let _gate = self.init_gate.lock().await;
        if self.initialized.load(Ordering::Acquire) {
            return Ok(());
        }

        match self.store.get_tokens().await {
            Ok(Some(stored)) => {
                if stored.client_id == self.config.credentials.client_id {
                    debug!(provider = %self.display_name, "adopted stored credential");
                    self.set_credential(stored.credential);
                } else {
                    // Tokens issued to a different client are useless here.
                    warn!(
                        provider = %self.display_name,
                        "ignoring stored credential for a different client id"
                    );
                }
            }
            Ok(None) => {}
            Err(e) => {
                return Err(AuthError::not_initialized(
                    "failed to load the persisted credential",
                )
                .with_operation("initialize")
                .with_source(e));
            }
        }

        self.initialized.store(true, Ordering::Release);
        Ok(())
    }

    /// Persists the credential; awaited before the operation that obtained
    /// it returns.
    async fn persist(&self, credential: Credential) -> AuthResult<()> {
        let stored = StoredCredential::new(credential, &self.config.credentials.client_id);
        self.store.save_tokens(stored).await
    }

    /// The actual token-endpoint refresh; only ever invoked through the
    /// single-flight coordinator.
    async fn perform_refresh(&self) -> AuthResult<()> {
        let Some(credential) = self.credential() else {
            return Err(AuthError::refresh_token_missing("no credential is loaded")
                .with_operation("refresh_token"));
        };
        let Some(refresh_token) = credential.refresh_token.clone() else {
            return Err(AuthError::refresh_token_missing(
                "the stored credential has no refresh token",
            )
            .with_operation("refresh_token"));
        };

        let response = self.tokens.refresh(&refresh_token).await?;
        let updated = credential.refreshed(
            response.access_token,
            response.refresh_token,
            response.expires_in,
        );

        // The in-memory credential is updated even if persistence fails;
        // the error below tells the caller the disk copy is stale.
        self.set_credential(updated.clone());
        info!(provider = %self.display_name, "access token refreshed");

        self.persist(updated).await
    }

    async fn run_shared_refresh(&self) -> AuthResult<()> {
        self.refresh_flight.run(|| self.perform_refresh()).await
    }

    /// Admits or rejects a proactive refresh attempt.
    ///
    /// Joining an attempt already in flight is always admitted (the network
    /// cost is already being paid); otherwise attempts are spaced at least
    /// `min_refresh_interval` apart.
    fn refresh_guard_admits(&self) -> bool {
        if self.refresh_flight.in_flight() {
            return true;
        }

        let mut last = self.last_refresh_attempt.lock().unwrap();
        match *last {
            Some(at) if at.elapsed() < self.config.min_refresh_interval => false,
            _ => {
                *last = Some(Instant::now());
                true
            }
        }
    }

    /// Clears the attempt guard so the next call may retry immediately.
    fn reset_refresh_guard(&self) {
        *self.last_refresh_attempt.lock().unwrap() = None;
    }

    /// Runs a shared refresh, absorbing failure into `false`.
    async fn refresh_absorbing_failure(&self, context: &str) -> bool {
        match self.run_shared_refresh().await {
            Ok(()) => true,
            Err(e) => {
                warn!(
                    provider = %self.display_name,
                    error = %e,
                    context,
                    "token refresh failed"
                );
                self.reset_refresh_guard();
                false
            }
        }
    }

    /// The `validate_auth` state machine.
    async fn validate(&self) -> AuthResult<bool> {
        self.ensure_initialized().await?;

        let Some(credential) = self.credential() else {
            return Ok(false);
        };

        // No expiry information: treat as valid (some tokens do not expire).
        let Some(expiry_ms) = credential.expiry_ms() else {
            return Ok(true);
        };

        if expiry_ms <= now_ms() {
            // Expired: always attempt, regardless of the interval guard.
            if credential.refresh_token.is_none() {
                return Ok(false);
            }
            return Ok(self.refresh_absorbing_failure("expired credential").await);
        }

        // Fast path: proactive refresh disabled, nothing to refresh with,
        // or not yet inside the (jittered) window.
        if !self.config.proactive_refresh || credential.refresh_token.is_none() {
            return Ok(true);
        }
        let expiring = window::is_expiring_soon(
            expiry_ms,
            self.config.refresh_threshold_ms,
            self.config.refresh_jitter_ms,
        )?;
        if !expiring {
            return Ok(true);
        }

        // Expiring soon: the token is still good, so a guarded-out attempt
        // simply reports authenticated and leaves the refresh to a later
        // call.
        if !self.refresh_guard_admits() {
            return Ok(true);
        }
        Ok(self.refresh_absorbing_failure("expiring credential").await)
    }

    fn build_client(&self) -> AuthResult<ApiClient> {
        let Some(credential) = self.credential() else {
            return Err(
                AuthError::internal("no credential after successful validation")
                    .with_operation("auth_client"),
            );
        };
        Ok(ApiClient::new(
            credential.access_token,
            self.config.api_base_url.clone(),
            self.config.http_timeout,
            &self.config.user_agent,
        ))
    }

    async fn get_client(&self) -> AuthResult<ApiClient> {
        self.ensure_initialized().await?;

        if self.validate().await? {
            return self.build_client();
        }

        // Interactive login. Concurrent callers queue on the gate and
        // re-check: whoever ran the flow first authenticated for everyone.
        let _gate = self.login_gate.lock().await;
        if self.validate().await? {
            return self.build_client();
        }

        info!(provider = %self.display_name, "no usable credential, starting interactive login");
        let flow = AuthorizationFlow::new(&self.config, &self.tokens, self.browser.as_ref());
        let credential = flow.run().await?;

        self.set_credential(credential.clone());
        self.persist(credential).await?;

        self.build_client()
    }

    async fn refresh(&self) -> AuthResult<()> {
        self.ensure_initialized().await?;
        self.run_shared_refresh().await
    }

    async fn info(&self) -> AuthResult<AuthInfo> {
        self.ensure_initialized().await?;

        let Some(credential) = self.credential() else {
            return Ok(AuthInfo::unauthenticated(&self.config.client_name));
        };

        Ok(AuthInfo {
            // Usable now, or recoverable through a refresh.
            is_authenticated: !credential.is_expired() || credential.refresh_token.is_some(),
            scopes: credential.scopes.clone(),
            expires_at: credential.expires_at,
            client_name: self.config.client_name.clone(),
        })
    }

    async fn health(&self) -> AuthResult<bool> {
        self.ensure_initialized().await?;

        // The store must be reachable for the provider to be healthy.
        self.store
            .has_tokens()
            .await
            .map_err(|e| e.with_operation("health_check"))?;

        self.validate().await
    }

    async fn clear(&self) -> AuthResult<()> {
        *self.credential.write().unwrap() = None;
        self.reset_refresh_guard();
        self.store.clear_tokens().await?;
        info!(provider = %self.display_name, "cleared credentials");
        Ok(())
    }
}

impl AuthProvider for OAuth2AuthProvider {
    fn name(&self) -> &str {
        &self.display_name
    }

    fn initialize(&self) -> BoxFuture<'_, AuthResult<()>> {
        Box::pin(async move { self.ensure_initialized().await })
    }

    fn auth_client(&self) -> BoxFuture<'_, AuthResult<ApiClient>> {
        Box::pin(async move { self.get_client().await })
    }

    fn validate_auth(&self) -> BoxFuture<'_, AuthResult<bool>> {
        Box::pin(async move { self.validate().await })
    }

    fn refresh_token(&self) -> BoxFuture<'_, AuthResult<()>> {
        Box::pin(async move { self.refresh().await })
    }

    fn auth_info(&self) -> BoxFuture<'_, AuthResult<AuthInfo>> {
        Box::pin(async move { self.info().await })
    }

    fn health_check(&self) -> BoxFuture<'_, AuthResult<bool>> {
        Box::pin(async move { self.health().await })
    }

    fn clear_auth(&self) -> BoxFuture<'_, AuthResult<()>> {
        Box::pin(async move { self.clear().await })
    }
}
