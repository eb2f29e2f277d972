//! Auth provider configuration.
//!
//! Configuration is captured once at construction and validated eagerly:
//! a provider cannot be built from a config missing its client identity or
//! scopes. Runtime tunables (thresholds, jitter, retry interval) live here
//! too, so nothing reads the environment after construction.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use url::Url;

use crate::error::{AuthError, AuthResult};
use crate::storage::FileCredentialStore;
use crate::window::{DEFAULT_REFRESH_JITTER_MS, DEFAULT_REFRESH_THRESHOLD_MS};

/// OAuth 2.0 client identity.
#[derive(Debug, Clone)]
pub struct ClientCredentials {
    /// The OAuth 2.0 client ID from the provider's developer console.
    pub client_id: String,
    /// The OAuth 2.0 client secret.
    pub client_secret: String,
}

impl ClientCredentials {
    /// Creates new client credentials.
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }

    /// Validates that both parts are present.
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.client_id.is_empty() {
            return Err("client_id is required");
        }
        if self.client_secret.is_empty() {
            return Err("client_secret is required");
        }
        Ok(())
    }
}

/// Configuration for the OAuth2 auth provider.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Client name for multi-account support. Defaults to `"default"`.
    pub client_name: String,

    /// OAuth client identity.
    pub credentials: ClientCredentials,

    /// Authorization endpoint URL.
    pub authorize_url: String,

    /// Token endpoint URL.
    pub token_url: String,

    /// Base URL of the wrapped API.
    pub api_base_url: String,

    /// Redirect URI the local callback listener serves.
    ///
    /// Must be an `http` loopback URL with an explicit port and path. A
    /// port of `0` binds an ephemeral port, substituted into the URI when
    /// the flow starts.
    pub redirect_uri: String,

    /// OAuth scopes to request.
    pub scopes: Vec<String>,

    /// Whether to refresh proactively before expiry.
    pub proactive_refresh: bool,

    /// How long before expiry a refresh becomes due (ms).
    pub refresh_threshold_ms: i64,

    /// Jitter half-width applied to the threshold (ms).
    pub refresh_jitter_ms: i64,

    /// Minimum interval between proactive refresh attempts.
    pub min_refresh_interval: Duration,

    /// How long the interactive flow waits for the callback.
    pub callback_timeout: Duration,

    /// Timeout for token endpoint and API requests.
    pub http_timeout: Duration,

    /// Path where the file-backed store keeps tokens.
    pub token_path: PathBuf,

    /// User agent string for HTTP requests.
    pub user_agent: String,
}

impl AuthConfig {
    /// Default authorization endpoint.
    pub const DEFAULT_AUTHORIZE_URL: &'static str = "https://airtable.com/oauth2/v1/authorize";

    /// Default token endpoint.
    pub const DEFAULT_TOKEN_URL: &'static str = "https://airtable.com/oauth2/v1/token";

    /// Default API base URL.
    pub const DEFAULT_API_BASE_URL: &'static str = "https://api.airtable.com/v0";

    /// Default redirect URI for the loopback listener.
    pub const DEFAULT_REDIRECT_URI: &'static str = "http://127.0.0.1:8763/oauth/callback";

    /// Default scopes: record read/write plus base schema.
    pub const DEFAULT_SCOPES: [&'static str; 3] = [
        "data.records:read",
        "data.records:write",
        "schema.bases:read",
    ];

    /// Default timeout in seconds for HTTP requests.
    pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;

    /// Default callback wait in seconds.
    pub const DEFAULT_CALLBACK_TIMEOUT_SECS: u64 = 300;

    /// Default minimum interval between proactive refresh attempts.
    pub const DEFAULT_MIN_REFRESH_INTERVAL_SECS: u64 = 30;

    /// Creates a configuration with defaults for the given credentials.
    pub fn new(credentials: ClientCredentials) -> Self {
        Self {
            client_name: "default".to_string(),
            credentials,
            authorize_url: Self::DEFAULT_AUTHORIZE_URL.to_string(),
            token_url: Self::DEFAULT_TOKEN_URL.to_string(),
            api_base_url: Self::DEFAULT_API_BASE_URL.to_string(),
            redirect_uri: Self::DEFAULT_REDIRECT_URI.to_string(),
            scopes: Self::DEFAULT_SCOPES.iter().map(|s| s.to_string()).collect(),
            proactive_refresh: true,
            refresh_threshold_ms: DEFAULT_REFRESH_THRESHOLD_MS,
            refresh_jitter_ms: DEFAULT_REFRESH_JITTER_MS,
            min_refresh_interval: Duration::from_secs(Self::DEFAULT_MIN_REFRESH_INTERVAL_SECS),
            callback_timeout: Duration::from_secs(Self::DEFAULT_CALLBACK_TIMEOUT_SECS),
            http_timeout: Duration::from_secs(Self::DEFAULT_HTTP_TIMEOUT_SECS),
            token_path: FileCredentialStore::default_path("default"),
            user_agent: format!("tablelink/{}", env!("CARGO_PKG_VERSION")),
        }
    }

    /// Builds a configuration from `TABLELINK_*` environment variables.
    ///
    /// `TABLELINK_CLIENT_ID` and `TABLELINK_CLIENT_SECRET` are required;
    /// everything else falls back to defaults. The environment is read once
    /// here; nothing re-reads it later.
    ///
    /// # Errors
    ///
    /// Returns a `Configuration` error for missing required variables or
    /// unparseable numeric/boolean values.
    pub fn from_env() -> AuthResult<Self> {
        let client_id = env::var("TABLELINK_CLIENT_ID").map_err(|_| {
            AuthError::configuration("TABLELINK_CLIENT_ID is not set")
        })?;
        let client_secret = env::var("TABLELINK_CLIENT_SECRET").map_err(|_| {
            AuthError::configuration("TABLELINK_CLIENT_SECRET is not set")
        })?;

        let mut config = Self::new(ClientCredentials::new(client_id, client_secret));

        if let Ok(name) = env::var("TABLELINK_CLIENT_NAME") {
            config = config.with_client_name(name);
        }
        if let Ok(uri) = env::var("TABLELINK_REDIRECT_URI") {
            config.redirect_uri = uri;
        }
        if let Ok(scopes) = env::var("TABLELINK_SCOPES") {
            config.scopes = scopes.split_whitespace().map(str::to_string).collect();
        }
        if let Ok(value) = env::var("TABLELINK_PROACTIVE_REFRESH") {
            config.proactive_refresh = parse_env_bool("TABLELINK_PROACTIVE_REFRESH", &value)?;
        }
        if let Ok(value) = env::var("TABLELINK_REFRESH_THRESHOLD_MS") {
            config.refresh_threshold_ms =
                parse_env_i64("TABLELINK_REFRESH_THRESHOLD_MS", &value)?;
        }
        if let Ok(value) = env::var("TABLELINK_REFRESH_JITTER_MS") {
            config.refresh_jitter_ms = parse_env_i64("TABLELINK_REFRESH_JITTER_MS", &value)?;
        }
        if let Ok(value) = env::var("TABLELINK_MIN_REFRESH_INTERVAL_MS") {
            let ms = parse_env_i64("TABLELINK_MIN_REFRESH_INTERVAL_MS", &value)?;
            config.min_refresh_interval = Duration::from_millis(ms.max(0) as u64);
        }
        if let Ok(path) = env::var("TABLELINK_TOKEN_PATH") {
            config.token_path = PathBuf::from(path);
        }

        Ok(config)
    }

    /// Sets the client name, moving the default token path along with it.
    pub fn with_client_name(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        if self.token_path == FileCredentialStore::default_path(&self.client_name) {
            self.token_path = FileCredentialStore::default_path(&name);
        }
        self.client_name = name;
        self
    }

    /// Returns the provider name for this client (e.g. `"oauth2:work"`).
    pub fn provider_name(&self) -> String {
        format!("oauth2:{}", self.client_name)
    }

    /// Sets the redirect URI.
    pub fn with_redirect_uri(mut self, uri: impl Into<String>) -> Self {
        self.redirect_uri = uri.into();
        self
    }

    /// Sets the OAuth scopes.
    pub fn with_scopes(mut self, scopes: Vec<String>) -> Self {
        self.scopes = scopes;
        self
    }

    /// Enables or disables proactive refresh.
    pub fn with_proactive_refresh(mut self, enabled: bool) -> Self {
        self.proactive_refresh = enabled;
        self
    }

    /// Sets the refresh threshold in milliseconds.
    pub fn with_refresh_threshold_ms(mut self, threshold_ms: i64) -> Self {
        self.refresh_threshold_ms = threshold_ms;
        self
    }

    /// Sets the refresh jitter half-width in milliseconds.
    pub fn with_refresh_jitter_ms(mut self, jitter_ms: i64) -> Self {
        self.refresh_jitter_ms = jitter_ms;
        self
    }

    /// Sets the minimum interval between proactive refresh attempts.
    pub fn with_min_refresh_interval(mut self, interval: Duration) -> Self {
        self.min_refresh_interval = interval;
        self
    }

    /// Sets the callback wait timeout.
    pub fn with_callback_timeout(mut self, timeout: Duration) -> Self {
        self.callback_timeout = timeout;
        self
    }

    /// Sets the HTTP request timeout.
    pub fn with_http_timeout(mut self, timeout: Duration) -> Self {
        self.http_timeout = timeout;
        self
    }

    /// Sets the authorization and token endpoint URLs.
    pub fn with_endpoints(
        mut self,
        authorize_url: impl Into<String>,
        token_url: impl Into<String>,
    ) -> Self {
        self.authorize_url = authorize_url.into();
        self.token_url = token_url.into();
        self
    }

    /// Sets the API base URL.
    pub fn with_api_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into();
        self
    }

    /// Sets the token storage path.
    pub fn with_token_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.token_path = path.into();
        self
    }

    /// Returns the port of the redirect URI.
    pub fn redirect_port(&self) -> AuthResult<u16> {
        let url = self.parse_redirect_uri()?;
        url.port().ok_or_else(|| {
            AuthError::configuration("redirect_uri must carry an explicit port")
        })
    }

    /// Returns the path of the redirect URI.
    pub fn redirect_path(&self) -> AuthResult<String> {
        Ok(self.parse_redirect_uri()?.path().to_string())
    }

    fn parse_redirect_uri(&self) -> AuthResult<Url> {
        Url::parse(&self.redirect_uri).map_err(|e| {
            AuthError::configuration(format!("invalid redirect_uri: {e}"))
        })
    }

    /// Validates the configuration.
    ///
    /// Called by the provider constructor; a provider is never built from
    /// an invalid configuration.
    pub fn validate(&self) -> AuthResult<()> {
        self.credentials
            .validate()
            .map_err(|e| AuthError::configuration(format!("invalid credentials: {e}")))?;

        if self.scopes.is_empty() {
            return Err(AuthError::configuration(
                "at least one OAuth scope is required",
            ));
        }

        let url = self.parse_redirect_uri()?;
        if url.scheme() != "http" {
            return Err(AuthError::configuration(
                "redirect_uri must be an http loopback URL",
            ));
        }
        if url.port().is_none() {
            return Err(AuthError::configuration(
                "redirect_uri must carry an explicit port",
            ));
        }
        if url.path() == "/" || url.path().is_empty() {
            return Err(AuthError::configuration(
                "redirect_uri must carry a callback path",
            ));
        }

        if self.refresh_threshold_ms < 0 {
            return Err(AuthError::configuration(
                "refresh_threshold_ms must be non-negative",
            ));
        }
        if self.refresh_jitter_ms < 0 {
            return Err(AuthError::configuration(
                "refresh_jitter_ms must be non-negative",
            ));
        }

        Ok(())
    }
}

fn parse_env_bool(name: &str, value: &str) -> AuthResult<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(AuthError::configuration(format!(
            "{name} must be a boolean, got {value:?}"
        ))),
    }
}

fn parse_env_i64(name: &str, value: &str) -> AuthResult<i64> {
    value.parse().map_err(|_| {
        AuthError::configuration(format!("{name} must be an integer, got {value:?}"))
    })
}
