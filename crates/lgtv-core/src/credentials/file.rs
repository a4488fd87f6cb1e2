//! File-backed credential store
//!
//! The token is kept as a small JSON document in the user's state directory
//! (`$XDG_STATE_HOME/lgtv-bridge/client-key.json` on Linux). The file is
//! written owner-only on Unix. A missing file means the device has never
//! been paired.

use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::default_state_dir;
use crate::error::StorageError;
use crate::traits::CredentialStore;

/// Token file name
const TOKEN_FILENAME: &str = "client-key.json";

/// Token file contents
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredToken {
    #[serde(rename = "client-key")]
    client_key: String,
}

/// Stores the token in a JSON file
#[derive(Debug, Clone)]
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    /// Store at an explicit path
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store at the default location in the state directory
    pub fn default_location() -> Self {
        Self::new(default_token_path())
    }

    /// Path of the token file
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, e: impl std::fmt::Display) -> StorageError {
        StorageError::Io {
            path: self.path.clone(),
            message: e.to_string(),
        }
    }
}

/// Default path of the token file
pub fn default_token_path() -> PathBuf {
    default_state_dir().join(TOKEN_FILENAME)
}

#[async_trait]
impl CredentialStore for FileCredentialStore {
    async fn read_token(&self) -> Result<Option<String>, StorageError> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(self.io_error(e)),
        };

        let stored: StoredToken = serde_json::from_str(&content)
            .map_err(|e| StorageError::InvalidResponse(format!("{}: {}", self.path.display(), e)))?;
        Ok(Some(stored.client_key))
    }

    async fn save_token(&self, token: &str) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| self.io_error(e))?;
        }

        let content = serde_json::to_string_pretty(&StoredToken {
            client_key: token.to_string(),
        })
        .map_err(|e| self.io_error(e))?;

        tokio::fs::write(&self.path, content)
            .await
            .map_err(|e| self.io_error(e))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o600);
            tokio::fs::set_permissions(&self.path, perms)
                .await
                .map_err(|e| self.io_error(e))?;
        }

        tracing::debug!("Saved client key to {}", self.path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_file_reads_as_absent() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCredentialStore::new(dir.path().join("client-key.json"));
        assert!(store.read_token().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_save_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCredentialStore::new(dir.path().join("state").join("client-key.json"));

        store.save_token("0123abcd").await.unwrap();
        assert_eq!(store.read_token().await.unwrap().as_deref(), Some("0123abcd"));

        let raw = std::fs::read_to_string(store.path()).unwrap();
        assert!(raw.contains(r#""client-key": "0123abcd""#));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_token_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let store = FileCredentialStore::new(dir.path().join("client-key.json"));
        store.save_token("secret").await.unwrap();

        let mode = std::fs::metadata(store.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[tokio::test]
    async fn test_corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("client-key.json");
        std::fs::write(&path, "not json").unwrap();

        let store = FileCredentialStore::new(path);
        assert!(matches!(
            store.read_token().await,
            Err(StorageError::InvalidResponse(_))
        ));
    }

    #[test]
    fn test_default_path_file_name() {
        assert!(default_token_path().ends_with("lgtv-bridge/client-key.json"));
    }
}
