//! In-memory credential store

use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::StorageError;
use crate::traits::CredentialStore;

/// Keeps the token for the lifetime of the process
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    token: Mutex<Option<String>>,
    saves: Mutex<usize>,
}

impl MemoryCredentialStore {
    /// Create a store, optionally pre-seeded with a token
    pub fn new(token: Option<String>) -> Self {
        Self {
            token: Mutex::new(token),
            saves: Mutex::new(0),
        }
    }

    /// Current token
    pub fn token(&self) -> Option<String> {
        self.token.lock().map(|t| t.clone()).unwrap_or_default()
    }

    /// Number of successful `save_token` calls
    pub fn save_count(&self) -> usize {
        self.saves.lock().map(|n| *n).unwrap_or_default()
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn read_token(&self) -> Result<Option<String>, StorageError> {
        Ok(self.token())
    }

    async fn save_token(&self, token: &str) -> Result<(), StorageError> {
        let mut slot = self
            .token
            .lock()
            .map_err(|_| StorageError::Unavailable("token lock poisoned".to_string()))?;
        *slot = Some(token.to_string());
        if let Ok(mut saves) = self.saves.lock() {
            *saves += 1;
        }
        Ok(())
    }
}
