//! Core trait definitions

mod credentials;
mod transport;

pub use credentials::CredentialStore;
pub use transport::{Connector, Incoming, PeerEnd, TransportConnection};
