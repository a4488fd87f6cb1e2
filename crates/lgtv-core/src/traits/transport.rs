//! Transport traits
//!
//! A [`TransportConnection`] is a message-oriented, full-duplex text
//! connection expressed as a pair of channels. Whoever implements
//! [`Connector`] owns the other ends (a [`PeerEnd`]) and pumps frames between
//! them and the real socket. Dropping the inbound sender on the peer side is
//! how a closed connection is signalled.

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::TransportError;

/// A frame or condition reported by the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Incoming {
    /// UTF-8 text frame
    Text(String),
    /// Binary frame (not part of the protocol)
    Binary(Vec<u8>),
    /// Socket error; the connection is expected to close afterwards
    Error(String),
}

/// Client side of a live connection
#[derive(Debug)]
pub struct TransportConnection {
    /// Text frames to send
    pub outbound: mpsc::Sender<String>,
    /// Frames received; yields `None` once the connection has closed
    pub inbound: mpsc::Receiver<Incoming>,
    /// Cancelled to ask the transport to close the connection
    pub shutdown: CancellationToken,
}

/// Transport side of a live connection
#[derive(Debug)]
pub struct PeerEnd {
    /// Frames the client wants sent
    pub outbound: mpsc::Receiver<String>,
    /// Frames to hand to the client
    pub inbound: mpsc::Sender<Incoming>,
    /// Cancelled when the client closes the connection
    pub shutdown: CancellationToken,
}

impl TransportConnection {
    /// Create a connected client/peer pair with the given buffer capacity
    pub fn pair(capacity: usize) -> (TransportConnection, PeerEnd) {
        let (outbound_tx, outbound_rx) = mpsc::channel(capacity);
        let (inbound_tx, inbound_rx) = mpsc::channel(capacity);
        let shutdown = CancellationToken::new();

        (
            TransportConnection {
                outbound: outbound_tx,
                inbound: inbound_rx,
                shutdown: shutdown.clone(),
            },
            PeerEnd {
                outbound: outbound_rx,
                inbound: inbound_tx,
                shutdown,
            },
        )
    }

    /// Ask the transport to close this connection
    pub fn close(&self) {
        self.shutdown.cancel();
    }
}

/// Opens transport connections
#[async_trait]
pub trait Connector: Send + Sync {
    /// Dial `url` and return the client side of the new connection
    async fn connect(&self, url: &str) -> Result<TransportConnection, TransportError>;
}
