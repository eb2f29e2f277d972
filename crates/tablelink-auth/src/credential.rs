//! Credential model.
//!
//! [`Credential`] is the in-memory token set owned by a provider instance;
//! it is mutated only by a refresh or a token exchange. [`StoredCredential`]
//! is the persisted form, tagged with the client identity that obtained it.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use tablelink_core::time::to_epoch_ms;

/// An OAuth2 token set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credential {
    /// The access token for API requests.
    pub access_token: String,

    /// The refresh token for obtaining new access tokens.
    pub refresh_token: Option<String>,

    /// When the access token expires. Present whenever the token response
    /// carried an `expires_in`.
    pub expires_at: Option<DateTime<Utc>>,

    /// The OAuth scopes that were granted.
    pub scopes: Vec<String>,

    /// When this token set was obtained or last refreshed.
    pub obtained_at: DateTime<Utc>,
}

impl Credential {
    /// Creates a credential from token response data.
    pub fn new(
        access_token: impl Into<String>,
        refresh_token: Option<String>,
        expires_in_secs: Option<i64>,
        scopes: Vec<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            access_token: access_token.into(),
            refresh_token,
            expires_at: expires_in_secs.map(|secs| now + Duration::seconds(secs)),
            scopes,
            obtained_at: now,
        }
    }

    /// Returns true if the access token is past its expiry.
    ///
    /// A credential without expiry information never reports expired; some
    /// tokens do not expire.
    pub fn is_expired(&self) -> bool {
        match self.expires_at {
            Some(expires_at) => Utc::now() >= expires_at,
            None => false,
        }
    }

    /// Returns the expiry as epoch milliseconds, if known.
    pub fn expiry_ms(&self) -> Option<i64> {
        self.expires_at.map(to_epoch_ms)
    }

    /// Returns true if every required scope was granted.
    pub fn has_scopes(&self, required: &[String]) -> bool {
        required.iter().all(|scope| self.scopes.contains(scope))
    }

    /// Returns the time until expiry, if known. Negative once expired.
    pub fn time_until_expiry(&self) -> Option<Duration> {
        self.expires_at.map(|expires_at| expires_at - Utc::now())
    }

    /// Returns the credential produced by a successful refresh.
    ///
    /// A server that does not rotate refresh tokens omits the field from
    /// the response; the previous refresh token is kept in that case.
    pub fn refreshed(
        &self,
        access_token: impl Into<String>,
        new_refresh_token: Option<String>,
        expires_in_secs: Option<i64>,
    ) -> Self {
        let now = Utc::now();
        Self {
            access_token: access_token.into(),
            refresh_token: new_refresh_token.or_else(|| self.refresh_token.clone()),
            expires_at: expires_in_secs.map(|secs| now + Duration::seconds(secs)),
            scopes: self.scopes.clone(),
            obtained_at: now,
        }
    }
}

/// The persisted form of a credential.
///
/// Written after every successful token acquisition or refresh; read once
/// at provider initialization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredCredential {
    /// The token set.
    pub credential: Credential,
    /// The OAuth client id that obtained these tokens.
    pub client_id: String,
    /// When the tokens were written.
    pub stored_at: DateTime<Utc>,
}

impl StoredCredential {
    /// Creates a stored credential for the given client identity.
    pub fn new(credential: Credential, client_id: impl Into<String>) -> Self {
        Self {
            credential,
            client_id: client_id.into(),
            stored_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credential_creation() {
        let cred = Credential::new(
            "access-token",
            Some("refresh-token".to_string()),
            Some(3600),
            vec!["data.records:read".to_string()],
        );

        assert_eq!(cred.access_token, "access-token");
        assert_eq!(cred.refresh_token, Some("refresh-token".to_string()));
        assert!(cred.expires_at.is_some());
        assert!(!cred.is_expired());
        assert!(cred.expiry_ms().unwrap() > to_epoch_ms(Utc::now()));
    }

    #[test]
    fn credential_without_expiry_never_expires() {
        let cred = Credential::new("access", None, None, vec![]);
        assert!(!cred.is_expired());
        assert!(cred.expiry_ms().is_none());
        assert!(cred.time_until_expiry().is_none());
    }

    #[test]
    fn credential_expired() {
        let mut cred = Credential::new("access", None, Some(3600), vec![]);
        cred.expires_at = Some(Utc::now() - Duration::hours(1));
        assert!(cred.is_expired());
        assert!(cred.time_until_expiry().unwrap() < Duration::zero());
    }

    #[test]
    fn scope_check() {
        let cred = Credential::new(
            "access",
            None,
            None,
            vec![
                "data.records:read".to_string(),
                "data.records:write".to_string(),
            ],
        );

        assert!(cred.has_scopes(&["data.records:read".to_string()]));
        assert!(cred.has_scopes(&[
            "data.records:read".to_string(),
            "data.records:write".to_string()
        ]));
        assert!(!cred.has_scopes(&["schema.bases:read".to_string()]));
        assert!(cred.has_scopes(&[]));
    }

    #[test]
    fn refresh_keeps_previous_refresh_token() {
        let cred = Credential::new("old", Some("rt-1".to_string()), Some(60), vec![]);
        let updated = cred.refreshed("new", None, Some(3600));

        assert_eq!(updated.access_token, "new");
        assert_eq!(updated.refresh_token, Some("rt-1".to_string()));
        assert!(updated.obtained_at >= cred.obtained_at);
    }

    #[test]
    fn refresh_adopts_rotated_refresh_token() {
        let cred = Credential::new("old", Some("rt-1".to_string()), Some(60), vec![]);
        let updated = cred.refreshed("new", Some("rt-2".to_string()), Some(3600));
        assert_eq!(updated.refresh_token, Some("rt-2".to_string()));
    }

    #[test]
    fn stored_credential_roundtrips_through_json() {
        let stored = StoredCredential::new(
            Credential::new("access", Some("refresh".to_string()), Some(3600), vec![]),
            "client-123",
        );

        let json = serde_json::to_string(&stored).unwrap();
        let back: StoredCredential = serde_json::from_str(&json).unwrap();
        assert_eq!(back.client_id, "client-123");
        assert_eq!(back.credential.access_token, "access");
    }
}
