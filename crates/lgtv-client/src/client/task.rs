//! The client task
//!
//! One task owns every piece of protocol state and reacts to five sources:
//! handle commands, results of spawned slow work (dials, credential reads
//! and writes), input-socket notices, frames from the primary connection,
//! and timers (request deadlines and the reconnect delay).

use std::future;
use std::pin::Pin;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::time::Sleep;

use lgtv_core::config::ClientConfig;
use lgtv_core::{
    ClientError, Connector, CredentialStore, Incoming, PairingError, StorageError,
    TransportConnection, TransportError,
};
use lgtv_protocol::{
    synthesize_changed, ChannelDescriptor, CorrelationId, CorrelationIdGenerator, Envelope,
    PairingManifest, ProtocolError, RegistrationOutcome, Response,
};

use super::events::{ClientEvent, ConnectionState};
use super::pending::{CallResult, Completion, PendingCall, PendingCalls};
use super::Command;
use crate::reconnect::{ErrorDedup, ReconnectState};
use crate::secondary::{Lookup, SecondaryChannels, SecondaryNotice, SocketResult};

/// Results of work spawned off the client task
#[derive(Debug)]
enum Internal {
    Dialed {
        attempt: u64,
        result: Result<TransportConnection, TransportError>,
    },
    TokenLoaded {
        attempt: u64,
        result: Result<Option<String>, StorageError>,
    },
    TokenSaved {
        result: Result<(), StorageError>,
    },
}

/// Where the pairing handshake stands on the current connection
#[derive(Debug, Clone, PartialEq, Eq)]
enum Registration {
    /// Nothing in flight
    Idle,
    /// Reading the stored client key
    LoadingToken,
    /// Manifest sent; waiting on this id
    Pending(CorrelationId),
}

pub(crate) struct ClientTask {
    config: ClientConfig,
    manifest: PairingManifest,
    connector: Arc<dyn Connector>,
    credentials: Arc<dyn CredentialStore>,

    commands: mpsc::UnboundedReceiver<Command>,
    internal_tx: mpsc::UnboundedSender<Internal>,
    internal_rx: mpsc::UnboundedReceiver<Internal>,
    notices: mpsc::UnboundedReceiver<SecondaryNotice>,
    events: broadcast::Sender<ClientEvent>,
    state: watch::Sender<ConnectionState>,

    ids: CorrelationIdGenerator,
    connection: Option<TransportConnection>,
    /// Serial of the latest dial; results of older dials are discarded
    attempt: u64,
    dialing: bool,
    registration: Registration,
    pending: PendingCalls,
    sockets: SecondaryChannels,

    reconnect: ReconnectState,
    reconnect_timer: Option<Pin<Box<Sleep>>>,
    errors: ErrorDedup,
}

impl ClientTask {
    pub fn new(
        config: ClientConfig,
        manifest: PairingManifest,
        connector: Arc<dyn Connector>,
        credentials: Arc<dyn CredentialStore>,
        commands: mpsc::UnboundedReceiver<Command>,
        events: broadcast::Sender<ClientEvent>,
        state: watch::Sender<ConnectionState>,
    ) -> Self {
        let (internal_tx, internal_rx) = mpsc::unbounded_channel();
        let (sockets, notices) = SecondaryChannels::new();
        let pending = PendingCalls::new(config.request_timeout);
        let reconnect = ReconnectState::new(config.reconnect_interval);

        Self {
            config,
            manifest,
            connector,
            credentials,
            commands,
            internal_tx,
            internal_rx,
            notices,
            events,
            state,
            ids: CorrelationIdGenerator::new(),
            connection: None,
            attempt: 0,
            dialing: false,
            registration: Registration::Idle,
            pending,
            sockets,
            reconnect,
            reconnect_timer: None,
            errors: ErrorDedup::new(),
        }
    }

    /// Run until every handle has been dropped
    pub async fn run(mut self) {
        tracing::debug!("Client task started (id prefix {})", self.ids.prefix());

        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => break,
                },
                Some(internal) = self.internal_rx.recv() => self.handle_internal(internal),
                Some(notice) = self.notices.recv() => {
                    if let Some(error) = self.sockets.handle(notice) {
                        self.report(error);
                    }
                }
                incoming = next_incoming(&mut self.connection) => match incoming {
                    Some(incoming) => self.handle_incoming(incoming),
                    None => self.handle_close(),
                },
                (id, completion) = self.pending.next_expired() => {
                    let after = self.pending.timeout();
                    tracing::debug!("Request {} timed out after {:?}", id, after);
                    self.complete(completion, Err(ClientError::Timeout { id, after }));
                }
                () = reconnect_due(&mut self.reconnect_timer) => {
                    self.reconnect_timer = None;
                    tracing::info!("Reconnecting to {}", self.config.url);
                    self.connect();
                }
            }
        }

        self.disconnect();
        tracing::debug!("Client task stopped");
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Connect => {
                self.reconnect.enable();
                self.connect();
            }
            Command::Disconnect => self.disconnect(),
            Command::Register => self.register(),
            Command::Request {
                uri,
                payload,
                reply,
            } => self.request(uri, payload, reply),
            Command::Subscribe {
                uri,
                payload,
                updates,
            } => {
                let pruned = self.pending.prune_abandoned_subscriptions();
                if pruned > 0 {
                    tracing::debug!("Dropped {} abandoned subscriptions", pruned);
                }
                let id = self.ids.next_id();
                self.pending.insert_subscription(id.clone(), updates);
                self.send_envelope(Envelope::subscribe(id, uri, payload));
            }
            Command::GetSocket { address, reply } => self.get_socket(address, reply),
        }
    }

    fn handle_internal(&mut self, internal: Internal) {
        match internal {
            Internal::Dialed { attempt, result } => self.handle_dialed(attempt, result),
            Internal::TokenLoaded { attempt, result } => self.handle_token(attempt, result),
            Internal::TokenSaved { result } => match result {
                Ok(()) => tracing::debug!("Client key saved"),
                Err(e) => self.report(ClientError::Storage(e)),
            },
        }
    }

    // ---- connection lifecycle ----

    fn connect(&mut self) {
        if self.connection.is_some() {
            if *self.state.borrow() != ConnectionState::Paired {
                self.register();
            }
            return;
        }
        if self.dialing {
            return;
        }

        self.reconnect_timer = None;
        self.attempt += 1;
        self.dialing = true;
        self.set_state(ConnectionState::Connecting);
        tracing::info!("Connecting to {}", self.config.url);
        self.emit(ClientEvent::Connecting {
            url: self.config.url.clone(),
        });

        let attempt = self.attempt;
        let url = self.config.url.clone();
        let connector = Arc::clone(&self.connector);
        let internal = self.internal_tx.clone();
        tokio::spawn(async move {
            let result = connector.connect(&url).await;
            let _ = internal.send(Internal::Dialed { attempt, result });
        });
    }

    fn handle_dialed(&mut self, attempt: u64, result: Result<TransportConnection, TransportError>) {
        if attempt != self.attempt || !self.dialing {
            if let Ok(connection) = result {
                tracing::debug!("Discarding connection from stale attempt {}", attempt);
                connection.close();
            }
            return;
        }
        self.dialing = false;

        match result {
            Ok(connection) => {
                tracing::info!("Connected to {}", self.config.url);
                self.errors.clear();
                self.connection = Some(connection);
                self.set_state(ConnectionState::AwaitingPairing);
                self.emit(ClientEvent::Connected);
                self.register();
            }
            Err(e) => {
                self.set_state(ConnectionState::Disconnected);
                self.report(ClientError::Transport(e));
                self.schedule_reconnect();
            }
        }
    }

    fn handle_close(&mut self) {
        tracing::info!("Connection to {} closed", self.config.url);
        self.connection = None;
        self.registration = Registration::Idle;
        let dropped = self.pending.drop_connection_bound();
        if dropped > 0 {
            tracing::debug!("Dropped {} connection-bound calls", dropped);
        }
        self.set_state(ConnectionState::Disconnected);
        self.emit(ClientEvent::Closed);
        self.schedule_reconnect();
    }

    fn disconnect(&mut self) {
        self.reconnect.disable();
        self.reconnect_timer = None;
        self.dialing = false;
        self.attempt += 1;
        self.registration = Registration::Idle;

        let dropped = self.pending.len();
        for address in self.pending.clear() {
            self.sockets.fail(&address, ClientError::Disconnected);
        }
        self.sockets.close_all();

        let was_connected = match self.connection.take() {
            Some(connection) => {
                connection.close();
                true
            }
            None => false,
        };

        self.set_state(ConnectionState::Disconnected);
        if was_connected {
            tracing::info!("Disconnected from {} ({} calls dropped)", self.config.url, dropped);
            self.emit(ClientEvent::Closed);
        }
    }

    fn schedule_reconnect(&mut self) {
        if let Some(delay) = self.reconnect.next_delay() {
            tracing::debug!("Reconnecting in {:?}", delay);
            self.reconnect_timer = Some(Box::pin(tokio::time::sleep(delay)));
        }
    }

    // ---- pairing ----

    fn register(&mut self) {
        if self.connection.is_none() {
            tracing::debug!("Not connected; registration deferred until connect");
            return;
        }
        match &self.registration {
            Registration::Idle => {}
            Registration::LoadingToken => {
                tracing::debug!("Registration already in flight (reading client key)");
                return;
            }
            Registration::Pending(id) => {
                tracing::debug!("Registration {} already pending", id);
                return;
            }
        }

        self.registration = Registration::LoadingToken;
        let attempt = self.attempt;
        let credentials = Arc::clone(&self.credentials);
        let internal = self.internal_tx.clone();
        tokio::spawn(async move {
            let result = credentials.read_token().await;
            let _ = internal.send(Internal::TokenLoaded { attempt, result });
        });
    }

    fn handle_token(&mut self, attempt: u64, result: Result<Option<String>, StorageError>) {
        if attempt != self.attempt || self.registration != Registration::LoadingToken {
            return;
        }

        match result {
            Ok(token) => {
                let id = self.ids.next_id();
                tracing::debug!(
                    "Registering as {} ({})",
                    id,
                    if token.is_some() { "known client key" } else { "first pairing" }
                );
                let payload = self.manifest.registration_payload(token.as_deref());
                self.pending.insert_register(id.clone(), token);
                self.registration = Registration::Pending(id.clone());
                if !self.send_envelope(Envelope::register(id.clone(), payload)) {
                    // Nothing will ever answer this id
                    self.pending.take(&id);
                    self.registration = Registration::Idle;
                }
            }
            Err(e) => {
                self.registration = Registration::Idle;
                self.report(PairingError::Storage(e).into());
            }
        }
    }

    fn handle_registration(
        &mut self,
        id: CorrelationId,
        sent_token: Option<String>,
        response: Response,
    ) {
        if response.is_error() {
            self.registration = Registration::Idle;
            self.report(PairingError::Rejected(response.error_message()).into());
            return;
        }

        match RegistrationOutcome::from_payload(&response.payload) {
            Ok(RegistrationOutcome::Granted(key)) => {
                self.registration = Registration::Idle;
                if sent_token.as_deref() != Some(key.as_str()) {
                    let credentials = Arc::clone(&self.credentials);
                    let internal = self.internal_tx.clone();
                    tokio::spawn(async move {
                        let result = credentials.save_token(&key).await;
                        let _ = internal.send(Internal::TokenSaved { result });
                    });
                }
                tracing::info!("Paired with {}", self.config.url);
                self.set_state(ConnectionState::Paired);
                self.emit(ClientEvent::Ready);
            }
            Ok(RegistrationOutcome::PromptRequired) => {
                tracing::info!("Waiting for the pairing prompt to be accepted on the device");
                self.pending
                    .restore(id, PendingCall::Register { sent_token });
                self.emit(ClientEvent::PairingPrompt);
            }
            Err(e) => {
                self.pending
                    .restore(id, PendingCall::Register { sent_token });
                self.report(ClientError::Protocol(e));
            }
        }
    }

    // ---- calls ----

    fn request(
        &mut self,
        uri: String,
        payload: Option<Value>,
        reply: Option<oneshot::Sender<CallResult>>,
    ) {
        let id = self.ids.next_id();
        if let Some(reply) = reply {
            self.pending
                .insert_request(id.clone(), Completion::Caller(reply));
        }
        self.send_envelope(Envelope::request(id, uri, payload));
    }

    fn get_socket(&mut self, address: String, reply: oneshot::Sender<SocketResult>) {
        if self.sockets.lookup(&address, reply) != Lookup::RequestDescriptor {
            return;
        }

        let id = self.ids.next_id();
        tracing::debug!("Requesting input socket descriptor for {} as {}", address, id);
        self.pending.insert_request(
            id.clone(),
            Completion::Descriptor {
                address: address.clone(),
            },
        );
        self.send_envelope(Envelope::request(id, address, None));
    }

    fn complete(&mut self, completion: Completion, result: CallResult) {
        match completion {
            Completion::Caller(reply) => {
                let _ = reply.send(result);
            }
            Completion::Descriptor { address } => {
                let descriptor = result.and_then(|payload| {
                    ChannelDescriptor::from_payload(&payload).map_err(ClientError::Protocol)
                });
                match descriptor {
                    Ok(descriptor) => {
                        let connector = Arc::clone(&self.connector);
                        self.sockets.dial(address, descriptor.socket_path, connector);
                    }
                    Err(e) => self.sockets.fail(&address, e),
                }
            }
        }
    }

    // ---- inbound frames ----

    fn handle_incoming(&mut self, incoming: Incoming) {
        match incoming {
            Incoming::Text(text) => {
                tracing::trace!("-> {}", text);
                match Response::parse(&text) {
                    Ok(response) => self.dispatch(response),
                    Err(e) => self.report(ClientError::Protocol(e)),
                }
            }
            Incoming::Binary(data) => {
                self.report(ProtocolError::NonTextFrame { len: data.len() }.into());
            }
            Incoming::Error(message) => {
                self.report(TransportError::Socket(message).into());
            }
        }
    }

    fn dispatch(&mut self, response: Response) {
        let id = response.id.clone();
        match self.pending.take(&id) {
            Some(PendingCall::Request { completion, .. }) => {
                let result = response
                    .into_result()
                    .map_err(|message| ClientError::Device { message });
                self.complete(completion, result);
            }
            Some(PendingCall::Register { sent_token }) => {
                self.handle_registration(id, sent_token, response);
            }
            Some(PendingCall::Subscription { updates }) => {
                let update = response
                    .into_result()
                    .map(|mut payload| {
                        synthesize_changed(&mut payload);
                        payload
                    })
                    .map_err(|message| ClientError::Device { message });

                if updates.send(update).is_ok() {
                    self.pending
                        .restore(id, PendingCall::Subscription { updates });
                } else {
                    tracing::debug!("Subscription {} dropped by its receiver", id);
                }
            }
            None => tracing::trace!("No pending call for {}; dropping frame", id),
        }
    }

    // ---- output ----

    /// Queue a frame on the primary connection; returns whether it was queued
    fn send_envelope(&mut self, envelope: Envelope) -> bool {
        let text = match envelope.to_text() {
            Ok(text) => text,
            Err(e) => {
                self.report(ClientError::Protocol(e));
                return false;
            }
        };

        let Some(connection) = &self.connection else {
            tracing::debug!("Not connected; dropping {}", envelope.id);
            return false;
        };

        tracing::trace!("<- {}", text);
        match connection.outbound.try_send(text) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("Failed to queue {}: {}", envelope.id, e);
                false
            }
        }
    }

    fn set_state(&self, state: ConnectionState) {
        self.state.send_if_modified(|current| {
            if *current == state {
                return false;
            }
            tracing::debug!("State {:?} -> {:?}", current, state);
            *current = state;
            true
        });
    }

    fn emit(&self, event: ClientEvent) {
        // No receivers is fine
        let _ = self.events.send(event);
    }

    /// Report an error to observers; transport errors are de-duplicated
    fn report(&mut self, error: ClientError) {
        if let ClientError::Transport(e) = &error {
            if !self.errors.should_report(e) {
                tracing::debug!("Suppressing repeated error: {}", e);
                return;
            }
        }
        tracing::warn!("{}", error);
        self.emit(ClientEvent::Error(error));
    }
}

/// Next frame from the primary connection; `None` once it has closed
///
/// Never resolves while there is no connection.
async fn next_incoming(connection: &mut Option<TransportConnection>) -> Option<Incoming> {
    match connection {
        Some(connection) => connection.inbound.recv().await,
        None => future::pending().await,
    }
}

/// Fires when the reconnect delay has elapsed
async fn reconnect_due(timer: &mut Option<Pin<Box<Sleep>>>) {
    match timer {
        Some(sleep) => sleep.as_mut().await,
        None => future::pending().await,
    }
}
