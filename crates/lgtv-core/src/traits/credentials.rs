//! Credential storage traits

use async_trait::async_trait;

use crate::error::StorageError;

/// Persists the pairing token granted by the device
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Read the stored token, if any
    async fn read_token(&self) -> Result<Option<String>, StorageError>;

    /// Store a freshly granted token
    async fn save_token(&self, token: &str) -> Result<(), StorageError>;
}
