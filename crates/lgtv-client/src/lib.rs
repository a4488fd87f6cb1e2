//! lgtv-client: protocol client for webOS TVs
//!
//! Holds the persistent control connection to the TV, performs the pairing
//! handshake, correlates request/response/subscription traffic, reconnects
//! after failures and opens secondary input sockets for remote-control
//! events.

pub mod client;
pub mod reconnect;
pub mod secondary;
pub mod transport;

pub use client::{
    ClientBuilder, ClientEvent, ConnectionState, ProtocolClient, ResponseFuture, Subscription,
};
pub use secondary::InputSocket;
pub use transport::WsConnector;
