//! Vault-backed credential store
//!
//! Reads and writes a KV v2 secret at `<address>/v1/<mount>/data/<path>`.
//! A 404 from Vault means no token has been stored yet.

use std::path::Path;

use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use serde_json::{json, Value};

use crate::config::VaultConfig;
use crate::error::StorageError;
use crate::traits::CredentialStore;

/// Header carrying the Vault token
const VAULT_TOKEN_HEADER: &str = "X-Vault-Token";

/// Environment variable consulted when the config has no token
pub const VAULT_TOKEN_ENV: &str = "VAULT_TOKEN";

/// Stores the token as a Vault KV v2 secret
#[derive(Debug, Clone)]
pub struct VaultCredentialStore {
    client: Client,
    secret_url: Url,
    vault_token: String,
}

impl VaultCredentialStore {
    /// Build a store from configuration
    pub fn from_config(config: &VaultConfig) -> Result<Self, StorageError> {
        let vault_token = match &config.token {
            Some(token) => token.clone(),
            None => std::env::var(VAULT_TOKEN_ENV).map_err(|_| {
                StorageError::Unavailable(format!(
                    "no Vault token configured and {} is not set",
                    VAULT_TOKEN_ENV
                ))
            })?,
        };

        let mut builder = Client::builder();
        if let Some(ca_path) = &config.ca_cert_path {
            builder = builder.add_root_certificate(load_certificate(ca_path)?);
        }
        let client = builder
            .build()
            .map_err(|e| StorageError::Unavailable(format!("Failed to build HTTP client: {}", e)))?;

        Self::with_client(client, &config.address, &config.mount, &config.secret_path, vault_token)
    }

    /// Build a store around an existing HTTP client
    pub fn with_client(
        client: Client,
        address: &str,
        mount: &str,
        secret_path: &str,
        vault_token: String,
    ) -> Result<Self, StorageError> {
        let base = Url::parse(address)
            .map_err(|e| StorageError::Unavailable(format!("Invalid Vault address {}: {}", address, e)))?;
        let secret_url = base
            .join(&format!(
                "/v1/{}/data/{}",
                mount.trim_matches('/'),
                secret_path.trim_matches('/')
            ))
            .map_err(|e| StorageError::Unavailable(format!("Invalid secret path: {}", e)))?;

        Ok(Self {
            client,
            secret_url,
            vault_token,
        })
    }

    /// URL of the secret
    pub fn secret_url(&self) -> &Url {
        &self.secret_url
    }
}

fn load_certificate(path: &Path) -> Result<reqwest::Certificate, StorageError> {
    let pem = std::fs::read(path).map_err(|e| StorageError::Io {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    reqwest::Certificate::from_pem(&pem)
        .map_err(|e| StorageError::InvalidResponse(format!("Invalid CA certificate: {}", e)))
}

/// Pull the token out of a KV v2 read, tolerating a flat `{ "token": ... }` body
fn extract_token(body: &Value) -> Result<Option<String>, StorageError> {
    let token = body
        .pointer("/data/data/token")
        .or_else(|| body.get("token"));

    match token {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(token)) => Ok(Some(token.clone())),
        Some(other) => Err(StorageError::InvalidResponse(format!(
            "token is not a string: {}",
            other
        ))),
    }
}

async fn status_error(response: reqwest::Response) -> StorageError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    StorageError::Status { status, body }
}

#[async_trait]
impl CredentialStore for VaultCredentialStore {
    async fn read_token(&self) -> Result<Option<String>, StorageError> {
        let response = self
            .client
            .get(self.secret_url.clone())
            .header(VAULT_TOKEN_HEADER, &self.vault_token)
            .send()
            .await
            .map_err(|e| StorageError::Unavailable(format!("Failed to read from Vault: {}", e)))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(status_error(response).await);
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| StorageError::InvalidResponse(e.to_string()))?;
        extract_token(&body)
    }

    async fn save_token(&self, token: &str) -> Result<(), StorageError> {
        let response = self
            .client
            .post(self.secret_url.clone())
            .header(VAULT_TOKEN_HEADER, &self.vault_token)
            .json(&json!({ "data": { "token": token } }))
            .send()
            .await
            .map_err(|e| StorageError::Unavailable(format!("Failed to write to Vault: {}", e)))?;

        if !response.status().is_success() {
            return Err(status_error(response).await);
        }

        tracing::debug!("Saved client key to {}", self.secret_url);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secret_url_layout() {
        let store = VaultCredentialStore::with_client(
            Client::new(),
            "https://vault.lan:8200",
            "kv/",
            "/lgtv/living-room",
            "t".to_string(),
        )
        .unwrap();

        assert_eq!(
            store.secret_url().as_str(),
            "https://vault.lan:8200/v1/kv/data/lgtv/living-room"
        );
    }

    #[test]
    fn test_extract_token_shapes() {
        assert_eq!(
            extract_token(&json!({ "data": { "data": { "token": "abc" } } })).unwrap(),
            Some("abc".to_string())
        );
        assert_eq!(
            extract_token(&json!({ "token": "flat" })).unwrap(),
            Some("flat".to_string())
        );
        assert_eq!(extract_token(&json!({ "data": {} })).unwrap(), None);
        assert!(extract_token(&json!({ "token": 5 })).is_err());
    }
}
