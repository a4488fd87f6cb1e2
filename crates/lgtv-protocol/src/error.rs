//! Protocol error types

use thiserror::Error;

/// Errors that can occur while encoding or interpreting protocol traffic
///
/// None of these are fatal to a session: the offending frame is dropped and
/// the connection stays open.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Inbound text frame is not a valid response envelope
    #[error("Malformed frame: {reason}")]
    MalformedFrame { reason: String },

    /// Inbound frame was binary instead of text
    #[error("Received non-text frame ({len} bytes)")]
    NonTextFrame { len: usize },

    /// Channel descriptor response is missing a usable socket path
    #[error("Malformed channel descriptor: {reason}")]
    MalformedDescriptor { reason: String },

    /// Registration response has an unusable client key
    #[error("Malformed pairing response: {reason}")]
    MalformedPairing { reason: String },

    /// Pairing manifest is not a JSON object
    #[error("Invalid pairing manifest: {reason}")]
    InvalidManifest { reason: String },

    /// Input-socket event could not be parsed
    #[error("Malformed input event: {reason}")]
    MalformedInputEvent { reason: String },

    /// Outbound envelope could not be serialized
    #[error("Encoding error: {0}")]
    Encode(String),

    /// I/O error surfaced through a codec
    #[error("I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for ProtocolError {
    fn from(e: std::io::Error) -> Self {
        ProtocolError::Io(e.to_string())
    }
}
