//! Observer-facing events and connection state

use serde::Serialize;

use lgtv_core::ClientError;

/// Something observers of the client may react to
#[derive(Debug, Clone)]
pub enum ClientEvent {
    /// A primary connection attempt has started
    Connecting { url: String },
    /// Transport is up and pairing is starting
    Connected,
    /// Pairing completed; requests may be issued
    Ready,
    /// The device is showing an approval prompt
    PairingPrompt,
    /// The primary connection closed
    Closed,
    /// A reported error (transport errors are de-duplicated)
    Error(ClientError),
}

/// Pairing state machine position
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// No primary connection
    #[default]
    Disconnected,
    /// Dial in progress
    Connecting,
    /// Connected, registration not yet granted
    AwaitingPairing,
    /// Registration granted
    Paired,
}
