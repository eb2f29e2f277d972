//! Credential storage.
//!
//! [`CredentialStore`] is the persistence seam: the provider writes through
//! it after every successful token acquisition and reads it once at
//! initialization, but does not own its lifecycle. Two implementations are
//! provided: a JSON file store for real deployments and an in-memory store
//! for tests and ephemeral processes.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use tracing::{debug, info};

use crate::credential::StoredCredential;
use crate::error::{AuthError, AuthResult};
use crate::provider::BoxFuture;

/// Persistence contract for the last-known token set.
pub trait CredentialStore: Send + Sync {
    /// Persists a token set. Called after every successful acquisition or
    /// refresh, and awaited before the triggering operation returns.
    fn save_tokens(&self, stored: StoredCredential) -> BoxFuture<'_, AuthResult<()>>;

    /// Retrieves the last-known token set, if any.
    fn get_tokens(&self) -> BoxFuture<'_, AuthResult<Option<StoredCredential>>>;

    /// Returns true if a token set is present.
    fn has_tokens(&self) -> BoxFuture<'_, AuthResult<bool>>;

    /// Removes any persisted token set.
    fn clear_tokens(&self) -> BoxFuture<'_, AuthResult<()>>;
}

/// File-backed credential store.
///
/// Tokens are stored as JSON. Writes go to a temp file first and are
/// renamed into place; on unix the file is restricted to the owner.
#[derive(Debug)]
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    /// Creates a file store at the given path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Returns the default token path for a client name, under the user's
    /// data directory.
    pub fn default_path(client_name: &str) -> PathBuf {
        let data_dir = dirs::home_dir()
            .map(|h| h.join(".local").join("share"))
            .unwrap_or_else(|| PathBuf::from("."))
            .join("tablelink");
        data_dir.join(format!("tokens-{client_name}.json"))
    }

    /// Returns the token file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> AuthResult<Option<StoredCredential>> {
        if !self.path.exists() {
            debug!(path = %self.path.display(), "no token file");
            return Ok(None);
        }

        let content = fs::read_to_string(&self.path).map_err(|e| {
            AuthError::storage(format!("failed to read token file: {e}"))
                .with_operation("get_tokens")
        })?;

        let stored: StoredCredential = serde_json::from_str(&content).map_err(|e| {
            AuthError::storage(format!("failed to parse token file: {e}"))
                .with_operation("get_tokens")
        })?;

        debug!(path = %self.path.display(), "loaded tokens");
        Ok(Some(stored))
    }

    fn write(&self, stored: &StoredCredential) -> AuthResult<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                AuthError::storage(format!("failed to create token directory: {e}"))
                    .with_operation("save_tokens")
            })?;
        }

        let content = serde_json::to_string_pretty(stored).map_err(|e| {
            AuthError::internal(format!("failed to serialize tokens: {e}"))
                .with_operation("save_tokens")
        })?;

        // Write to a temp file first, then rename for atomicity.
        let temp_path = self.path.with_extension("json.tmp");
        fs::write(&temp_path, &content).map_err(|e| {
            AuthError::storage(format!("failed to write token file: {e}"))
                .with_operation("save_tokens")
        })?;

        fs::rename(&temp_path, &self.path).map_err(|e| {
            AuthError::storage(format!("failed to rename token file: {e}"))
                .with_operation("save_tokens")
        })?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = fs::Permissions::from_mode(0o600);
            let _ = fs::set_permissions(&self.path, perms);
        }

        debug!(path = %self.path.display(), "saved tokens");
        Ok(())
    }

    fn remove(&self) -> AuthResult<()> {
        if self.path.exists() {
            fs::remove_file(&self.path).map_err(|e| {
                AuthError::storage(format!("failed to remove token file: {e}"))
                    .with_operation("clear_tokens")
            })?;
            info!(path = %self.path.display(), "cleared tokens");
        }
        Ok(())
    }
}

impl CredentialStore for FileCredentialStore {
    fn save_tokens(&self, stored: StoredCredential) -> BoxFuture<'_, AuthResult<()>> {
        Box::pin(async move { self.write(&stored) })
    }

    fn get_tokens(&self) -> BoxFuture<'_, AuthResult<Option<StoredCredential>>> {
        Box::pin(async move { self.read() })
    }

    fn has_tokens(&self) -> BoxFuture<'_, AuthResult<bool>> {
        Box::pin(async move { Ok(self.path.exists()) })
    }

    fn clear_tokens(&self) -> BoxFuture<'_, AuthResult<()>> {
        Box::pin(async move { self.remove() })
    }
}

/// In-memory credential store for tests and ephemeral processes.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    tokens: RwLock<Option<StoredCredential>>,
}

impl MemoryCredentialStore {
    /// Creates an empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store pre-seeded with a credential.
    pub fn with_tokens(stored: StoredCredential) -> Self {
        Self {
            tokens: RwLock::new(Some(stored)),
        }
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn save_tokens(&self, stored: StoredCredential) -> BoxFuture<'_, AuthResult<()>> {
        Box::pin(async move {
            *self.tokens.write().unwrap() = Some(stored);
            Ok(())
        })
    }

    fn get_tokens(&self) -> BoxFuture<'_, AuthResult<Option<StoredCredential>>> {
        Box::pin(async move { Ok(self.tokens.read().unwrap().clone()) })
    }

    fn has_tokens(&self) -> BoxFuture<'_, AuthResult<bool>> {
        Box::pin(async move { Ok(self.tokens.read().unwrap().is_some()) })
    }

    fn clear_tokens(&self) -> BoxFuture<'_, AuthResult<()>> {
        Box::pin(async move {
            *self.tokens.write().unwrap() = None;
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credential::Credential;

    fn sample() -> StoredCredential {
        StoredCredential::new(
            Credential::new(
                "access-token",
                Some("refresh-token".to_string()),
                Some(3600),
                vec!["data.records:read".to_string()],
            ),
            "client-123",
        )
    }

    #[tokio::test]
    async fn file_store_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tokens.json");
        let store = FileCredentialStore::new(&path);

        assert!(!store.has_tokens().await.unwrap());
        store.save_tokens(sample()).await.unwrap();
        assert!(path.exists());
        assert!(store.has_tokens().await.unwrap());

        // A fresh store over the same path sees the same tokens.
        let store2 = FileCredentialStore::new(&path);
        let loaded = store2.get_tokens().await.unwrap().unwrap();
        assert_eq!(loaded.credential.access_token, "access-token");
        assert_eq!(loaded.client_id, "client-123");
    }

    #[tokio::test]
    async fn file_store_clear() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tokens.json");
        let store = FileCredentialStore::new(&path);

        store.save_tokens(sample()).await.unwrap();
        assert!(path.exists());

        store.clear_tokens().await.unwrap();
        assert!(!path.exists());
        assert!(store.get_tokens().await.unwrap().is_none());

        // Clearing an already-empty store is fine.
        store.clear_tokens().await.unwrap();
    }

    #[tokio::test]
    async fn file_store_missing_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCredentialStore::new(dir.path().join("nope.json"));
        assert!(store.get_tokens().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn file_store_corrupt_file_is_storage_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tokens.json");
        fs::write(&path, "not json").unwrap();

        let store = FileCredentialStore::new(&path);
        let err = store.get_tokens().await.unwrap_err();
        assert_eq!(err.code(), crate::error::AuthErrorCode::Storage);
    }

    #[tokio::test]
    async fn file_store_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("deep").join("tokens.json");
        let store = FileCredentialStore::new(&path);
        store.save_tokens(sample()).await.unwrap();
        assert!(path.exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn file_store_restricts_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tokens.json");
        let store = FileCredentialStore::new(&path);
        store.save_tokens(sample()).await.unwrap();

        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[tokio::test]
    async fn memory_store_roundtrip() {
        let store = MemoryCredentialStore::new();
        assert!(!store.has_tokens().await.unwrap());

        store.save_tokens(sample()).await.unwrap();
        let loaded = store.get_tokens().await.unwrap().unwrap();
        assert_eq!(loaded.credential.access_token, "access-token");

        store.clear_tokens().await.unwrap();
        assert!(store.get_tokens().await.unwrap().is_none());
    }

    #[test]
    fn default_path_includes_client_name() {
        let path = FileCredentialStore::default_path("work");
        assert!(path.to_string_lossy().contains("tokens-work.json"));
        assert!(path.to_string_lossy().contains("tablelink"));
    }
}
