//! Protocol client for the TV control channel
//!
//! [`ProtocolClient`] is a cheap, cloneable handle. All protocol state lives
//! in a single background task that owns the primary connection, the table
//! of outstanding calls, the reconnect timer and the input-socket cache.
//! Handles only send commands to it, so no state is shared between threads.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use lgtv_client::{ClientEvent, ProtocolClient};
//! use lgtv_core::config::ClientConfig;
//! use lgtv_core::credentials::MemoryCredentialStore;
//!
//! # async fn run() -> Result<(), lgtv_core::ClientError> {
//! let client = ProtocolClient::builder(
//!     ClientConfig::with_url("ws://192.168.1.20:3000"),
//!     Arc::new(MemoryCredentialStore::default()),
//! )
//! .spawn();
//!
//! let mut events = client.events();
//! client.connect();
//! while let Ok(event) = events.recv().await {
//!     if matches!(event, ClientEvent::Ready) {
//!         break;
//!     }
//! }
//!
//! let volume = client.request("ssap://audio/getVolume", None).await?;
//! println!("{}", volume);
//! # Ok(())
//! # }
//! ```

mod events;
mod pending;
mod task;

pub use events::{ClientEvent, ConnectionState};

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::Stream;
use serde_json::Value;
use tokio::sync::{broadcast, mpsc, oneshot, watch};

use lgtv_core::config::ClientConfig;
use lgtv_core::{ClientError, Connector, CredentialStore};
use lgtv_protocol::PairingManifest;

use crate::secondary::{InputSocket, SocketResult};
use crate::transport::WsConnector;
use pending::CallResult;
use task::ClientTask;

/// Capacity of the event broadcast channel
///
/// Observers that fall further behind than this see `RecvError::Lagged`.
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Commands sent from handles to the client task
#[derive(Debug)]
pub(crate) enum Command {
    Connect,
    Disconnect,
    Register,
    Request {
        uri: String,
        payload: Option<Value>,
        reply: Option<oneshot::Sender<CallResult>>,
    },
    Subscribe {
        uri: String,
        payload: Option<Value>,
        updates: mpsc::UnboundedSender<CallResult>,
    },
    GetSocket {
        address: String,
        reply: oneshot::Sender<SocketResult>,
    },
}

/// Builder for a [`ProtocolClient`]
pub struct ClientBuilder {
    config: ClientConfig,
    credentials: Arc<dyn CredentialStore>,
    connector: Option<Arc<dyn Connector>>,
    manifest: PairingManifest,
}

impl ClientBuilder {
    /// Use a custom transport (defaults to [`WsConnector`])
    pub fn connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = Some(connector);
        self
    }

    /// Use a custom pairing manifest (defaults to the built-in one)
    pub fn manifest(mut self, manifest: PairingManifest) -> Self {
        self.manifest = manifest;
        self
    }

    /// Start the client task
    ///
    /// Must be called within a tokio runtime. The client does not connect
    /// until [`ProtocolClient::connect`] is called.
    pub fn spawn(self) -> ProtocolClient {
        let connector: Arc<dyn Connector> = match self.connector {
            Some(connector) => connector,
            None => Arc::new(WsConnector::new(self.config.connect_timeout)),
        };

        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (events_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);

        let task = ClientTask::new(
            self.config,
            self.manifest,
            connector,
            self.credentials,
            commands_rx,
            events_tx.clone(),
            state_tx,
        );
        tokio::spawn(task.run());

        ProtocolClient {
            commands: commands_tx,
            events: events_tx,
            state: state_rx,
        }
    }
}

/// Handle to a running protocol client
#[derive(Clone)]
pub struct ProtocolClient {
    commands: mpsc::UnboundedSender<Command>,
    events: broadcast::Sender<ClientEvent>,
    state: watch::Receiver<ConnectionState>,
}

impl ProtocolClient {
    /// Start building a client
    pub fn builder(config: ClientConfig, credentials: Arc<dyn CredentialStore>) -> ClientBuilder {
        ClientBuilder {
            config,
            credentials,
            connector: None,
            manifest: PairingManifest::default(),
        }
    }

    fn send(&self, command: Command) {
        if self.commands.send(command).is_err() {
            tracing::debug!("Client task has stopped; command dropped");
        }
    }

    /// Open the control connection and enable auto-reconnect
    ///
    /// Re-starts pairing on a live but unpaired connection; otherwise a
    /// no-op while connecting or paired.
    pub fn connect(&self) {
        self.send(Command::Connect);
    }

    /// Close every connection, disable auto-reconnect and drop all calls
    pub fn disconnect(&self) {
        self.send(Command::Disconnect);
    }

    /// Send the pairing manifest on the live connection
    ///
    /// A no-op while a registration is already pending.
    pub fn register(&self) {
        self.send(Command::Register);
    }

    /// Issue a one-shot call
    ///
    /// The call is sent immediately; the returned future resolves exactly
    /// once, with the response payload or an error.
    pub fn request(&self, uri: impl Into<String>, payload: Option<Value>) -> ResponseFuture {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Request {
            uri: uri.into(),
            payload,
            reply: Some(reply),
        });
        ResponseFuture { rx }
    }

    /// Issue a one-shot call whose response is not wanted
    pub fn request_no_reply(&self, uri: impl Into<String>, payload: Option<Value>) {
        self.send(Command::Request {
            uri: uri.into(),
            payload,
            reply: None,
        });
    }

    /// Subscribe to pushed updates
    pub fn subscribe(&self, uri: impl Into<String>, payload: Option<Value>) -> Subscription {
        let (updates, rx) = mpsc::unbounded_channel();
        self.send(Command::Subscribe {
            uri: uri.into(),
            payload,
            updates,
        });
        Subscription { rx }
    }

    /// Get the input socket for `address`, opening it if needed
    pub async fn get_socket(&self, address: impl Into<String>) -> Result<InputSocket, ClientError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::GetSocket {
            address: address.into(),
            reply,
        });
        rx.await.unwrap_or(Err(ClientError::Disconnected))
    }

    /// Register an observer
    pub fn events(&self) -> broadcast::Receiver<ClientEvent> {
        self.events.subscribe()
    }

    /// Current pairing state
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }
}

/// Pending answer to [`ProtocolClient::request`]
///
/// Dropping it is fine; the call still expires inside the client.
#[derive(Debug)]
pub struct ResponseFuture {
    rx: oneshot::Receiver<CallResult>,
}

impl Future for ResponseFuture {
    type Output = Result<Value, ClientError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|result| result.unwrap_or(Err(ClientError::Disconnected)))
    }
}

/// Updates pushed for a [`ProtocolClient::subscribe`] call
///
/// Ends when the subscription is dropped by `disconnect()` or by the
/// connection closing.
#[derive(Debug)]
pub struct Subscription {
    rx: mpsc::UnboundedReceiver<CallResult>,
}

impl Subscription {
    /// Next update, or `None` once the subscription has ended
    pub async fn next(&mut self) -> Option<Result<Value, ClientError>> {
        self.rx.recv().await
    }
}

impl Stream for Subscription {
    type Item = Result<Value, ClientError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}
