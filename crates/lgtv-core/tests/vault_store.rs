//! Vault credential store tests
//!
//! Runs the store against a mock Vault server.

use reqwest::Client;
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use lgtv_core::config::{CredentialConfig, VaultConfig};
use lgtv_core::credentials::{self, VaultCredentialStore};
use lgtv_core::{CredentialStore, StorageError};

const SECRET_PATH: &str = "/v1/secret/data/lgtv/living-room";

fn store_for(server: &MockServer) -> VaultCredentialStore {
    VaultCredentialStore::with_client(
        Client::new(),
        &server.uri(),
        "secret",
        "lgtv/living-room",
        "test-token".to_string(),
    )
    .expect("Failed to build store")
}

#[tokio::test]
async fn test_read_kv2_token() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(SECRET_PATH))
        .and(header("X-Vault-Token", "test-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": { "data": { "token": "abc123" }, "metadata": { "version": 2 } }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let token = store_for(&server).read_token().await.unwrap();
    assert_eq!(token.as_deref(), Some("abc123"));
}

#[tokio::test]
async fn test_missing_secret_reads_as_absent() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(SECRET_PATH))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({ "errors": [] })))
        .mount(&server)
        .await;

    assert!(store_for(&server).read_token().await.unwrap().is_none());
}

#[tokio::test]
async fn test_server_error_is_reported_with_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(SECRET_PATH))
        .respond_with(ResponseTemplate::new(503).set_body_string("sealed"))
        .mount(&server)
        .await;

    let err = store_for(&server).read_token().await.unwrap_err();
    assert_eq!(
        err,
        StorageError::Status {
            status: 503,
            body: "sealed".to_string()
        }
    );
}

#[tokio::test]
async fn test_save_posts_kv2_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(SECRET_PATH))
        .and(header("X-Vault-Token", "test-token"))
        .and(body_json(json!({ "data": { "token": "fresh" } })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": { "version": 3 } })))
        .expect(1)
        .mount(&server)
        .await;

    store_for(&server).save_token("fresh").await.unwrap();
}

#[tokio::test]
async fn test_save_failure_is_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(SECRET_PATH))
        .respond_with(ResponseTemplate::new(403).set_body_string("permission denied"))
        .mount(&server)
        .await;

    let err = store_for(&server).save_token("fresh").await.unwrap_err();
    assert!(matches!(err, StorageError::Status { status: 403, .. }));
}

#[tokio::test]
async fn test_unreachable_vault_is_unavailable() {
    let store = VaultCredentialStore::with_client(
        Client::new(),
        "http://127.0.0.1:1",
        "secret",
        "lgtv",
        "t".to_string(),
    )
    .unwrap();

    assert!(matches!(
        store.read_token().await,
        Err(StorageError::Unavailable(_))
    ));
}

#[tokio::test]
async fn test_from_config_uses_configured_token() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(SECRET_PATH))
        .and(header("X-Vault-Token", "configured"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": { "data": { "token": "via-config" } }
        })))
        .mount(&server)
        .await;

    let config = CredentialConfig::Vault(VaultConfig {
        address: server.uri(),
        ca_cert_path: None,
        token: Some("configured".to_string()),
        mount: "secret".to_string(),
        secret_path: "lgtv/living-room".to_string(),
    });

    let store = credentials::from_config(&config).unwrap();
    assert_eq!(store.read_token().await.unwrap().as_deref(), Some("via-config"));
}
