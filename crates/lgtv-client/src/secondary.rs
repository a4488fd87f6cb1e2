//! Secondary input channels
//!
//! Continuous input (remote-control buttons, pointer moves) goes over a
//! dedicated socket whose URL the device hands out on request. Channels are
//! cached by the logical address they were requested for and evicted as
//! soon as their connection closes.
//!
//! The cache lives inside the client task. Dials and close notifications
//! come back to it as [`SecondaryNotice`]s tagged with a serial number so
//! that a notice about a replaced channel is ignored.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use lgtv_core::{ClientError, Connector, Incoming, TransportConnection, TransportError};
use lgtv_protocol::InputEvent;

/// Answer to a `get_socket` caller
pub(crate) type SocketResult = Result<InputSocket, ClientError>;

/// Handle to an open input channel
///
/// Clones share the same underlying connection.
#[derive(Debug, Clone)]
pub struct InputSocket {
    inner: Arc<SocketInner>,
}

#[derive(Debug)]
struct SocketInner {
    address: String,
    url: String,
    serial: u64,
    outbound: mpsc::Sender<String>,
    shutdown: CancellationToken,
}

impl InputSocket {
    /// Logical address the channel was requested for
    pub fn address(&self) -> &str {
        &self.inner.address
    }

    /// Socket URL returned by the device
    pub fn url(&self) -> &str {
        &self.inner.url
    }

    /// Whether both handles refer to the same connection
    pub fn same_channel(&self, other: &InputSocket) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Whether the connection is still usable
    pub fn is_open(&self) -> bool {
        !self.inner.shutdown.is_cancelled() && !self.inner.outbound.is_closed()
    }

    /// Send one event, framed as `key:value` lines
    ///
    /// Fails with a protocol error, sending nothing, when the event cannot
    /// be framed as a single block.
    pub async fn send(&self, event: &InputEvent) -> Result<(), ClientError> {
        if self.inner.shutdown.is_cancelled() {
            return Err(TransportError::Closed.into());
        }
        let text = event.to_text()?;
        tracing::trace!("{} <- {:?}", self.inner.address, text);
        self.inner
            .outbound
            .send(text)
            .await
            .map_err(|_| ClientError::Transport(TransportError::Closed))
    }

    /// Press a named remote-control button
    pub async fn button(&self, name: &str) -> Result<(), ClientError> {
        self.send(&InputEvent::button(name)).await
    }

    /// Close the connection
    pub fn close(&self) {
        self.inner.shutdown.cancel();
    }

    fn serial(&self) -> u64 {
        self.inner.serial
    }
}

/// Report from a secondary dial or connection watcher
#[derive(Debug)]
pub(crate) enum SecondaryNotice {
    Dialed {
        address: String,
        url: String,
        serial: u64,
        result: Result<TransportConnection, TransportError>,
    },
    Error {
        address: String,
        message: String,
    },
    Closed {
        address: String,
        serial: u64,
    },
}

/// A channel whose descriptor or dial is still in flight
#[derive(Debug, Default)]
struct Opening {
    /// Serial of the dial, once the descriptor has arrived
    serial: Option<u64>,
    waiters: Vec<oneshot::Sender<SocketResult>>,
}

/// What the client task must do for a `get_socket` call
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Lookup {
    /// The caller has been answered from the cache
    Cached,
    /// A lookup is already in flight; the caller will be answered with it
    Joined,
    /// The caller is queued; a descriptor request must be sent
    RequestDescriptor,
}

/// Cache of open input channels keyed by logical address
#[derive(Debug)]
pub(crate) struct SecondaryChannels {
    open: HashMap<String, InputSocket>,
    opening: HashMap<String, Opening>,
    next_serial: u64,
    notices: mpsc::UnboundedSender<SecondaryNotice>,
}

impl SecondaryChannels {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<SecondaryNotice>) {
        let (notices, notices_rx) = mpsc::unbounded_channel();
        (
            Self {
                open: HashMap::new(),
                opening: HashMap::new(),
                next_serial: 0,
                notices,
            },
            notices_rx,
        )
    }

    /// Answer from the cache or queue the caller
    pub fn lookup(&mut self, address: &str, reply: oneshot::Sender<SocketResult>) -> Lookup {
        if let Some(socket) = self.open.get(address) {
            if socket.is_open() {
                let _ = reply.send(Ok(socket.clone()));
                return Lookup::Cached;
            }
            tracing::debug!("Evicting closed input socket for {}", address);
            self.open.remove(address);
        }

        match self.opening.get_mut(address) {
            Some(opening) => {
                opening.waiters.push(reply);
                Lookup::Joined
            }
            None => {
                self.opening.insert(
                    address.to_string(),
                    Opening {
                        serial: None,
                        waiters: vec![reply],
                    },
                );
                Lookup::RequestDescriptor
            }
        }
    }

    /// Dial the socket URL the device returned for `address`
    pub fn dial(&mut self, address: String, url: String, connector: Arc<dyn Connector>) {
        let Some(opening) = self.opening.get_mut(&address) else {
            tracing::debug!("Descriptor for {} arrived with no waiters", address);
            return;
        };

        self.next_serial += 1;
        let serial = self.next_serial;
        opening.serial = Some(serial);

        tracing::debug!("Opening input socket for {} at {}", address, url);
        let notices = self.notices.clone();
        tokio::spawn(async move {
            let result = connector.connect(&url).await;
            let _ = notices.send(SecondaryNotice::Dialed {
                address,
                url,
                serial,
                result,
            });
        });
    }

    /// Fail every caller waiting on `address`
    pub fn fail(&mut self, address: &str, error: ClientError) {
        if let Some(opening) = self.opening.remove(address) {
            for waiter in opening.waiters {
                let _ = waiter.send(Err(error.clone()));
            }
        }
    }

    /// Apply a notice; returns an error to report to observers, if any
    pub fn handle(&mut self, notice: SecondaryNotice) -> Option<ClientError> {
        match notice {
            SecondaryNotice::Dialed {
                address,
                url,
                serial,
                result,
            } => {
                let current = self
                    .opening
                    .get(&address)
                    .is_some_and(|opening| opening.serial == Some(serial));
                if !current {
                    if let Ok(connection) = result {
                        connection.close();
                    }
                    return None;
                }

                match result {
                    Ok(connection) => {
                        let socket = self.adopt(address.clone(), url, serial, connection);
                        if let Some(opening) = self.opening.remove(&address) {
                            for waiter in opening.waiters {
                                let _ = waiter.send(Ok(socket.clone()));
                            }
                        }
                        self.open.insert(address, socket);
                        None
                    }
                    Err(e) => {
                        let error = ClientError::Transport(e);
                        self.fail(&address, error.clone());
                        Some(error)
                    }
                }
            }
            SecondaryNotice::Error { address, message } => {
                tracing::debug!("Input socket for {} reported: {}", address, message);
                Some(ClientError::Transport(TransportError::Socket(message)))
            }
            SecondaryNotice::Closed { address, serial } => {
                if self
                    .open
                    .get(&address)
                    .is_some_and(|socket| socket.serial() == serial)
                {
                    tracing::debug!("Input socket for {} closed", address);
                    self.open.remove(&address);
                }
                None
            }
        }
    }

    /// Close every cached channel and drop pending lookups
    pub fn close_all(&mut self) {
        for (_, socket) in self.open.drain() {
            socket.close();
        }
        self.opening.clear();
    }

    /// Wrap a fresh connection and watch it until it closes
    fn adopt(
        &self,
        address: String,
        url: String,
        serial: u64,
        connection: TransportConnection,
    ) -> InputSocket {
        let TransportConnection {
            outbound,
            mut inbound,
            shutdown,
        } = connection;

        let socket = InputSocket {
            inner: Arc::new(SocketInner {
                address: address.clone(),
                url,
                serial,
                outbound,
                shutdown: shutdown.clone(),
            }),
        };

        // Inbound traffic is ignored apart from errors and close
        let notices = self.notices.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    incoming = inbound.recv() => match incoming {
                        Some(Incoming::Error(message)) => {
                            let _ = notices.send(SecondaryNotice::Error {
                                address: address.clone(),
                                message,
                            });
                        }
                        Some(_) => {}
                        None => break,
                    },
                }
            }
            let _ = notices.send(SecondaryNotice::Closed { address, serial });
        });

        socket
    }
}
