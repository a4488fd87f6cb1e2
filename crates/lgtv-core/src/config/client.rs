//! Protocol client configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use super::serde_utils::duration_millis;

/// Device URL used when none is configured
pub const DEFAULT_URL: &str = "ws://lgwebostv:3000";

/// Configuration for the protocol client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// WebSocket URL of the device's control endpoint
    pub url: String,

    /// How long a one-shot request waits for its response
    #[serde(with = "duration_millis")]
    pub request_timeout: Duration,

    /// Fixed delay between reconnect attempts; zero disables auto-reconnect
    #[serde(with = "duration_millis")]
    pub reconnect_interval: Duration,

    /// Dial timeout for primary and secondary connections
    #[serde(with = "duration_millis")]
    pub connect_timeout: Duration,

    /// JSON file replacing the built-in pairing manifest
    pub manifest_path: Option<PathBuf>,

    /// Where the pairing token is kept
    pub credentials: CredentialConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_URL.to_string(),
            request_timeout: Duration::from_secs(15),
            reconnect_interval: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(10),
            manifest_path: None,
            credentials: CredentialConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Default configuration pointed at a specific device
    pub fn with_url(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }
}

/// Credential backend selection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum CredentialConfig {
    /// Keep the token in memory only
    Memory,
    /// JSON file on local disk
    File {
        /// Override the default state-directory location
        #[serde(default)]
        path: Option<PathBuf>,
    },
    /// HashiCorp Vault KV v2 secret
    Vault(VaultConfig),
}

impl Default for CredentialConfig {
    fn default() -> Self {
        CredentialConfig::File { path: None }
    }
}

/// Connection details for the Vault credential backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultConfig {
    /// Vault base address, e.g. `https://vault.internal:8200`
    pub address: String,

    /// PEM file with an additional trusted root certificate
    #[serde(default)]
    pub ca_cert_path: Option<PathBuf>,

    /// Vault token; falls back to `VAULT_TOKEN` when absent
    #[serde(default)]
    pub token: Option<String>,

    /// KV v2 mount name
    #[serde(default = "default_kv_mount")]
    pub mount: String,

    /// Secret path under the mount
    pub secret_path: String,
}

fn default_kv_mount() -> String {
    "secret".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.url, DEFAULT_URL);
        assert_eq!(config.request_timeout, Duration::from_secs(15));
        assert_eq!(config.reconnect_interval, Duration::from_secs(5));
        assert_eq!(config.credentials, CredentialConfig::File { path: None });
    }

    #[test]
    fn test_zero_reconnect_interval_parses() {
        let config: ClientConfig = toml::from_str("reconnect_interval = 0").unwrap();
        assert!(config.reconnect_interval.is_zero());
        assert_eq!(config.url, DEFAULT_URL);
    }

    #[test]
    fn test_parse_partial_toml() {
        let config: ClientConfig = toml::from_str(
            r#"
            url = "ws://10.0.0.20:3000"
            reconnect_interval = 1000

            [credentials]
            backend = "vault"
            address = "https://vault.lan:8200"
            secret_path = "lgtv/living-room"
            "#,
        )
        .unwrap();

        assert_eq!(config.url, "ws://10.0.0.20:3000");
        assert_eq!(config.reconnect_interval, Duration::from_secs(1));
        assert_eq!(config.request_timeout, Duration::from_secs(15));
        match config.credentials {
            CredentialConfig::Vault(vault) => {
                assert_eq!(vault.mount, "secret");
                assert_eq!(vault.secret_path, "lgtv/living-room");
                assert!(vault.token.is_none());
            }
            other => panic!("Expected vault backend, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_memory_backend() {
        let config: ClientConfig = toml::from_str(
            r#"
            [credentials]
            backend = "memory"
            "#,
        )
        .unwrap();
        assert_eq!(config.credentials, CredentialConfig::Memory);
    }
}
