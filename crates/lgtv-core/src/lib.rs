//! lgtv-core: Core abstractions and configuration for lgtv-bridge
//!
//! This crate provides the error taxonomy, configuration structures, the
//! transport and credential-store traits, and the credential backends used
//! by the protocol client.

pub mod config;
pub mod credentials;
pub mod error;
pub mod traits;

pub use error::{ClientError, ConfigError, PairingError, StorageError, TransportError};
pub use traits::{Connector, CredentialStore, Incoming, PeerEnd, TransportConnection};
