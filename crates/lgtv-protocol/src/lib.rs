//! lgtv-protocol: Wire protocol for webOS TV remote control
//!
//! This crate defines the JSON envelopes exchanged on the primary control
//! websocket, the pairing manifest, and the line-oriented format used on
//! secondary input sockets. It performs no I/O.

pub mod codec;
pub mod correlation;
pub mod error;
pub mod message;
pub mod pairing;

pub use codec::{InputEvent, InputEventCodec};
pub use correlation::{CorrelationId, CorrelationIdGenerator};
pub use error::ProtocolError;
pub use message::{
    synthesize_changed, CallType, ChannelDescriptor, Envelope, Response, ResponseType,
    CHANGED_FIELD, STATUS_FIELDS,
};
pub use pairing::{PairingManifest, RegistrationOutcome, CLIENT_KEY_FIELD};
