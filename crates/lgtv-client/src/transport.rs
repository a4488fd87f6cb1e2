//! WebSocket transport
//!
//! Each connection is pumped by its own task that moves text frames between
//! the socket and the channel pair handed to the client.

use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::Message;

use lgtv_core::{Connector, Incoming, PeerEnd, TransportConnection, TransportError};

/// Buffered frames per direction.
///
/// The client task never waits on a full outbound buffer; frames that do
/// not fit are dropped and their calls time out.
const FRAME_CHANNEL_CAPACITY: usize = 256;

/// Dials plain `ws://` URLs with tokio-tungstenite
///
/// Built without a TLS backend, so a `wss://` dial always fails with
/// [`TransportError::Dial`]. Supply a TLS-capable [`Connector`] through
/// `ClientBuilder::connector` for devices that require one.
#[derive(Debug, Clone)]
pub struct WsConnector {
    connect_timeout: Duration,
}

impl WsConnector {
    /// Create a connector that gives up on a dial after `connect_timeout`
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, url: &str) -> Result<TransportConnection, TransportError> {
        let dial_error = |message: String| TransportError::Dial {
            url: url.to_string(),
            message,
        };

        tracing::debug!("Dialing {}", url);
        let (socket, _response) =
            tokio::time::timeout(self.connect_timeout, tokio_tungstenite::connect_async(url))
                .await
                .map_err(|_| dial_error("connection timed out".to_string()))?
                .map_err(|e| dial_error(e.to_string()))?;

        let (connection, peer) = TransportConnection::pair(FRAME_CHANNEL_CAPACITY);
        let url = url.to_string();
        tokio::spawn(async move {
            pump(socket, peer).await;
            tracing::debug!("Socket pump for {} exited", url);
        });

        Ok(connection)
    }
}

async fn pump<S>(socket: S, mut peer: PeerEnd)
where
    S: futures::Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>>
        + futures::Sink<Message, Error = tokio_tungstenite::tungstenite::Error>
        + Unpin,
{
    let (mut sink, mut stream) = socket.split();

    loop {
        tokio::select! {
            _ = peer.shutdown.cancelled() => {
                let _ = sink.send(Message::Close(None)).await;
                break;
            }
            frame = peer.outbound.recv() => match frame {
                Some(text) => {
                    if let Err(e) = sink.send(Message::Text(text)).await {
                        let _ = peer.inbound.send(Incoming::Error(e.to_string())).await;
                        break;
                    }
                }
                None => {
                    let _ = sink.send(Message::Close(None)).await;
                    break;
                }
            },
            message = stream.next() => {
                let incoming = match message {
                    Some(Ok(Message::Text(text))) => Incoming::Text(text),
                    Some(Ok(Message::Binary(data))) => Incoming::Binary(data),
                    Some(Ok(Message::Close(frame))) => {
                        tracing::debug!("Peer closed the socket: {:?}", frame);
                        break;
                    }
                    // Ping/pong are answered by tungstenite
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        let _ = peer.inbound.send(Incoming::Error(e.to_string())).await;
                        break;
                    }
                    None => break,
                };
                if peer.inbound.send(incoming).await.is_err() {
                    break;
                }
            }
        }
    }
}
