//! Envelopes for the primary control channel
//!
//! Every text frame on the control channel carries exactly one JSON
//! envelope. Outbound envelopes name the call type and target URI; inbound
//! envelopes are matched back to their call purely by `id`.
//!
//! # Message Flow
//!
//! 1. Client connects and sends a `register` envelope carrying the pairing
//!    manifest (and a client key, if one is known)
//! 2. Device answers on the same id, either with the client key or with a
//!    prompt notice followed later by a `registered` push on that id
//! 3. `request` envelopes get exactly one answer; `subscribe` envelopes get
//!    an answer per status change, all on the subscription's id
//!
//! Payloads are free-form JSON. Consumers validate the fields they need and
//! report a [`ProtocolError`] instead of assuming a shape.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::correlation::CorrelationId;
use crate::error::ProtocolError;

/// Field carrying the list of status fields that changed in an update
pub const CHANGED_FIELD: &str = "changed";

/// Status fields recognised by changed-fields synthesis, in reporting order
pub const STATUS_FIELDS: [&str; 2] = ["muted", "volume"];

/// Kind of outbound call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallType {
    /// Pairing handshake
    Register,
    /// One-shot call
    Request,
    /// Call whose id stays live for pushed updates
    Subscribe,
}

/// Outbound envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Correlation id the device echoes back
    pub id: CorrelationId,
    /// Call type
    #[serde(rename = "type")]
    pub call_type: CallType,
    /// Target URI (absent for registration)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
    /// Call arguments
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
}

impl Envelope {
    /// Build a `register` envelope
    pub fn register(id: CorrelationId, payload: Value) -> Self {
        Self {
            id,
            call_type: CallType::Register,
            uri: None,
            payload: Some(payload),
        }
    }

    /// Build a `request` envelope
    pub fn request(id: CorrelationId, uri: impl Into<String>, payload: Option<Value>) -> Self {
        Self {
            id,
            call_type: CallType::Request,
            uri: Some(uri.into()),
            payload,
        }
    }

    /// Build a `subscribe` envelope
    pub fn subscribe(id: CorrelationId, uri: impl Into<String>, payload: Option<Value>) -> Self {
        Self {
            id,
            call_type: CallType::Subscribe,
            uri: Some(uri.into()),
            payload,
        }
    }

    /// Serialize to the text frame sent on the wire
    pub fn to_text(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(|e| ProtocolError::Encode(e.to_string()))
    }
}

/// Type tag on inbound envelopes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseType {
    /// Answer to a request or subscription update
    #[default]
    Response,
    /// Pairing completed after on-screen approval
    Registered,
    /// Device rejected the call
    Error,
    /// Anything else the device sends
    #[serde(other)]
    Other,
}

/// Inbound envelope
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Response {
    /// Correlation id of the call this answers
    pub id: CorrelationId,
    /// Type tag
    #[serde(rename = "type", default)]
    pub response_type: ResponseType,
    /// Free-form payload
    #[serde(default)]
    pub payload: Value,
    /// Error description on `error` envelopes
    #[serde(default)]
    pub error: Option<String>,
}

impl Response {
    /// Parse an inbound text frame
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(text).map_err(|e| ProtocolError::MalformedFrame {
            reason: format!("{}: {}", e, text),
        })
    }

    /// Whether the device flagged this envelope as an error
    pub fn is_error(&self) -> bool {
        self.response_type == ResponseType::Error
    }

    /// Error description, falling back to a generic message
    pub fn error_message(&self) -> String {
        self.error
            .clone()
            .unwrap_or_else(|| "unspecified device error".to_string())
    }

    /// Split into payload or device error message
    pub fn into_result(self) -> Result<Value, String> {
        if self.is_error() {
            Err(self.error_message())
        } else {
            Ok(self.payload)
        }
    }
}

/// Target of a secondary channel, as returned by the device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelDescriptor {
    /// WebSocket URL to dial for the secondary channel
    pub socket_path: String,
}

impl ChannelDescriptor {
    /// Validate a descriptor response payload
    pub fn from_payload(payload: &Value) -> Result<Self, ProtocolError> {
        match payload.get("socketPath") {
            Some(Value::String(path)) if !path.is_empty() => Ok(Self {
                socket_path: path.clone(),
            }),
            Some(Value::String(_)) => Err(ProtocolError::MalformedDescriptor {
                reason: "socketPath is empty".to_string(),
            }),
            Some(other) => Err(ProtocolError::MalformedDescriptor {
                reason: format!("socketPath is not a string: {}", other),
            }),
            None => Err(ProtocolError::MalformedDescriptor {
                reason: "socketPath missing".to_string(),
            }),
        }
    }
}

/// Fill in the changed-fields list on a subscription update that lacks one
///
/// The first update of a status subscription may omit `changed`. When the
/// payload carries any of [`STATUS_FIELDS`], the list is synthesized from
/// exactly the fields present. Returns whether the payload was modified.
pub fn synthesize_changed(payload: &mut Value) -> bool {
    let Some(object) = payload.as_object_mut() else {
        return false;
    };
    if object.contains_key(CHANGED_FIELD) {
        return false;
    }

    let present: Vec<Value> = STATUS_FIELDS
        .iter()
        .filter(|field| object.contains_key(**field))
        .map(|field| Value::String((*field).to_string()))
        .collect();

    if present.is_empty() {
        return false;
    }

    object.insert(CHANGED_FIELD.to_string(), Value::Array(present));
    true
}
