//! Credential storage backends for the pairing token

mod file;
mod memory;
mod vault;

pub use file::{default_token_path, FileCredentialStore};
pub use memory::MemoryCredentialStore;
pub use vault::{VaultCredentialStore, VAULT_TOKEN_ENV};

use std::sync::Arc;

use crate::config::CredentialConfig;
use crate::error::StorageError;
use crate::traits::CredentialStore;

/// Build the credential store selected by configuration
pub fn from_config(config: &CredentialConfig) -> Result<Arc<dyn CredentialStore>, StorageError> {
    let store: Arc<dyn CredentialStore> = match config {
        CredentialConfig::Memory => Arc::new(MemoryCredentialStore::default()),
        CredentialConfig::File { path: Some(path) } => Arc::new(FileCredentialStore::new(path)),
        CredentialConfig::File { path: None } => Arc::new(FileCredentialStore::default_location()),
        CredentialConfig::Vault(vault) => Arc::new(VaultCredentialStore::from_config(vault)?),
    };
    Ok(store)
}
