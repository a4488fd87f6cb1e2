//! Shared test harness
//!
//! A scripted in-memory [`Connector`] stands in for the TV. Every accepted
//! dial hands the test a [`FakeDevice`] holding the far end of the
//! connection.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::{broadcast, mpsc, Semaphore};

use lgtv_client::{ClientEvent, ProtocolClient};
use lgtv_core::config::ClientConfig;
use lgtv_core::credentials::MemoryCredentialStore;
use lgtv_core::{
    Connector, CredentialStore, Incoming, PeerEnd, StorageError, TransportConnection,
    TransportError,
};

pub const DEVICE_URL: &str = "ws://tv.test:3000";

/// What the next dial does
#[derive(Debug, Clone)]
pub enum Dial {
    Accept,
    Fail(String),
}

/// Connector that follows a script, accepting once the script runs out
pub struct FakeConnector {
    script: Mutex<VecDeque<Dial>>,
    dials: Mutex<Vec<String>>,
    devices: mpsc::UnboundedSender<FakeDevice>,
    capacity: usize,
}

impl FakeConnector {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<FakeDevice>) {
        Self::with_capacity(64)
    }

    /// Connector whose connections buffer `capacity` frames per direction
    pub fn with_capacity(capacity: usize) -> (Arc<Self>, mpsc::UnboundedReceiver<FakeDevice>) {
        let (devices, devices_rx) = mpsc::unbounded_channel();
        let connector = Arc::new(Self {
            script: Mutex::new(VecDeque::new()),
            dials: Mutex::new(Vec::new()),
            devices,
            capacity,
        });
        (connector, devices_rx)
    }

    /// Queue the outcome of a future dial
    pub fn push(&self, dial: Dial) {
        self.script.lock().unwrap().push_back(dial);
    }

    /// URLs dialed so far
    pub fn dials(&self) -> Vec<String> {
        self.dials.lock().unwrap().clone()
    }
}

#[async_trait]
impl Connector for FakeConnector {
    async fn connect(&self, url: &str) -> Result<TransportConnection, TransportError> {
        self.dials.lock().unwrap().push(url.to_string());
        let next = self.script.lock().unwrap().pop_front().unwrap_or(Dial::Accept);

        match next {
            Dial::Fail(message) => Err(TransportError::Dial {
                url: url.to_string(),
                message,
            }),
            Dial::Accept => {
                let (connection, peer) = TransportConnection::pair(self.capacity);
                let _ = self.devices.send(FakeDevice {
                    url: url.to_string(),
                    peer,
                });
                Ok(connection)
            }
        }
    }
}

/// Far end of one accepted connection
pub struct FakeDevice {
    pub url: String,
    peer: PeerEnd,
}

impl FakeDevice {
    /// Next raw text frame sent by the client
    pub async fn recv_text(&mut self) -> String {
        self.peer
            .outbound
            .recv()
            .await
            .expect("client closed the connection")
    }

    /// Next frame sent by the client, parsed as JSON
    pub async fn recv_json(&mut self) -> Value {
        let text = self.recv_text().await;
        serde_json::from_str(&text).expect("client sent invalid JSON")
    }

    /// A frame the client has already sent, without waiting
    pub fn try_recv_text(&mut self) -> Option<String> {
        self.peer.outbound.try_recv().ok()
    }

    pub async fn send_incoming(&self, incoming: Incoming) {
        self.peer
            .inbound
            .send(incoming)
            .await
            .expect("client dropped the connection");
    }

    pub async fn send_json(&self, value: Value) {
        self.send_incoming(Incoming::Text(value.to_string())).await;
    }

    /// Answer call `id` with a plain response
    pub async fn respond(&self, id: &str, payload: Value) {
        self.send_json(json!({ "type": "response", "id": id, "payload": payload }))
            .await;
    }

    /// Read the next frame, which must be a registration, and return its id and payload
    pub async fn expect_register(&mut self) -> (String, Value) {
        let frame = self.recv_json().await;
        assert_eq!(frame["type"], "register", "expected a register frame: {}", frame);
        (
            frame["id"].as_str().expect("register id").to_string(),
            frame["payload"].clone(),
        )
    }

    /// Read the next frame, which must be a request, and return its id and uri
    pub async fn expect_request(&mut self) -> (String, String) {
        let frame = self.recv_json().await;
        assert_eq!(frame["type"], "request", "expected a request frame: {}", frame);
        (
            frame["id"].as_str().expect("request id").to_string(),
            frame["uri"].as_str().expect("request uri").to_string(),
        )
    }

    /// Grant `key` to the pending registration
    pub async fn accept_registration(&mut self, key: &str) {
        let (id, _) = self.expect_register().await;
        self.send_json(json!({
            "type": "registered",
            "id": id,
            "payload": { "client-key": key }
        }))
        .await;
    }

    /// Whether the client has asked for this connection to close
    pub fn is_shut_down(&self) -> bool {
        self.peer.shutdown.is_cancelled()
    }
}

/// Credential store whose operations can be made to fail
#[derive(Default)]
pub struct FlakyStore {
    pub inner: MemoryCredentialStore,
    pub fail_reads: bool,
    pub fail_saves: bool,
}

#[async_trait]
impl CredentialStore for FlakyStore {
    async fn read_token(&self) -> Result<Option<String>, StorageError> {
        if self.fail_reads {
            return Err(StorageError::Unavailable("vault sealed".to_string()));
        }
        self.inner.read_token().await
    }

    async fn save_token(&self, token: &str) -> Result<(), StorageError> {
        if self.fail_saves {
            return Err(StorageError::Status {
                status: 403,
                body: "permission denied".to_string(),
            });
        }
        self.inner.save_token(token).await
    }
}

/// Credential store whose reads wait until [`open`](Self::open) is called
pub struct GatedStore {
    pub inner: MemoryCredentialStore,
    gate: Semaphore,
}

impl GatedStore {
    pub fn new() -> Self {
        Self {
            inner: MemoryCredentialStore::default(),
            gate: Semaphore::new(0),
        }
    }

    /// Let every pending and future read through
    pub fn open(&self) {
        self.gate.add_permits(1);
    }
}

#[async_trait]
impl CredentialStore for GatedStore {
    async fn read_token(&self) -> Result<Option<String>, StorageError> {
        let _permit = self
            .gate
            .acquire()
            .await
            .map_err(|_| StorageError::Unavailable("gate closed".to_string()))?;
        self.inner.read_token().await
    }

    async fn save_token(&self, token: &str) -> Result<(), StorageError> {
        self.inner.save_token(token).await
    }
}

pub fn test_config() -> ClientConfig {
    ClientConfig {
        request_timeout: Duration::from_secs(15),
        reconnect_interval: Duration::from_secs(5),
        ..ClientConfig::with_url(DEVICE_URL)
    }
}

/// A spawned client wired to a fake connector
pub struct Harness {
    pub client: ProtocolClient,
    pub connector: Arc<FakeConnector>,
    pub devices: mpsc::UnboundedReceiver<FakeDevice>,
    pub events: broadcast::Receiver<ClientEvent>,
}

impl Harness {
    pub fn new(store: Arc<dyn CredentialStore>) -> Self {
        Self::with_config(test_config(), store)
    }

    pub fn with_config(config: ClientConfig, store: Arc<dyn CredentialStore>) -> Self {
        Self::build(config, store, FakeConnector::new())
    }

    /// Harness whose connections buffer only `capacity` frames
    pub fn with_capacity(capacity: usize, store: Arc<dyn CredentialStore>) -> Self {
        Self::build(test_config(), store, FakeConnector::with_capacity(capacity))
    }

    fn build(
        config: ClientConfig,
        store: Arc<dyn CredentialStore>,
        (connector, devices): (Arc<FakeConnector>, mpsc::UnboundedReceiver<FakeDevice>),
    ) -> Self {
        let client = ProtocolClient::builder(config, store)
            .connector(connector.clone())
            .spawn();
        let events = client.events();
        Self {
            client,
            connector,
            devices,
            events,
        }
    }

    /// Next accepted connection
    pub async fn next_device(&mut self) -> FakeDevice {
        self.devices.recv().await.expect("connector dropped")
    }

    /// Next event
    pub async fn next_event(&mut self) -> ClientEvent {
        self.events.recv().await.expect("event channel closed")
    }

    /// Skip events until one matches
    pub async fn wait_for(&mut self, matches: impl Fn(&ClientEvent) -> bool) -> ClientEvent {
        loop {
            let event = self.next_event().await;
            if matches(&event) {
                return event;
            }
        }
    }

    /// Connect and complete pairing with a fresh key
    pub async fn connect_paired(&mut self) -> FakeDevice {
        self.client.connect();
        let mut device = self.next_device().await;
        device.accept_registration("KEY").await;
        self.wait_for(|e| matches!(e, ClientEvent::Ready)).await;
        device
    }
}

/// Let spawned work (credential writes, watchers) run to completion
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}
