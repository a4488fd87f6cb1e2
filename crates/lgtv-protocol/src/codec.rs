//! Tokio codec for input-socket events
//!
//! Secondary channels do not speak JSON. Each event is a block of lines:
//!
//! ```text
//! type:<event-type>;
//! <key>:<value>
//! ...
//! <blank line>
//! ```
//!
//! One event must produce exactly one block, so the type and keys may not
//! contain `:`, `;` or newlines, and values may not contain newlines.

use bytes::{BufMut, BytesMut};
use tokio_util::codec::Encoder;

use crate::error::ProtocolError;

/// A single input event, e.g. a remote-control button press
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputEvent {
    /// Event type (`button`, `move`, `click`, ...)
    pub event_type: String,
    /// Fields in the order they are written
    pub fields: Vec<(String, String)>,
}

impl InputEvent {
    /// Create an event with no fields
    pub fn new(event_type: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            fields: Vec::new(),
        }
    }

    /// Append a field
    pub fn field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.push((key.into(), value.into()));
        self
    }

    /// A button press, with the name upper-cased as the device expects
    pub fn button(name: &str) -> Self {
        Self::new("button").field("name", name.to_uppercase())
    }

    /// Check that the event frames as a single block
    pub fn validate(&self) -> Result<(), ProtocolError> {
        check_name("event type", &self.event_type)?;
        for (key, value) in &self.fields {
            check_name("field name", key)?;
            if value.contains('\n') {
                return Err(ProtocolError::MalformedInputEvent {
                    reason: format!("value of {:?} contains a newline", key),
                });
            }
        }
        Ok(())
    }

    /// Render the event as the text frame sent on the wire
    pub fn to_text(&self) -> Result<String, ProtocolError> {
        let mut buf = BytesMut::new();
        InputEventCodec::new().encode(self, &mut buf)?;
        String::from_utf8(buf.to_vec()).map_err(|e| ProtocolError::Encode(e.to_string()))
    }
}

fn check_name(what: &str, name: &str) -> Result<(), ProtocolError> {
    if name.is_empty() {
        return Err(ProtocolError::MalformedInputEvent {
            reason: format!("{} is empty", what),
        });
    }
    if let Some(c) = name.chars().find(|c| matches!(c, ':' | ';' | '\n' | '\r')) {
        return Err(ProtocolError::MalformedInputEvent {
            reason: format!("{} {:?} contains {:?}", what, name, c),
        });
    }
    Ok(())
}

/// Encoder for input events
#[derive(Debug, Default)]
pub struct InputEventCodec;

impl InputEventCodec {
    /// Create a new codec
    pub fn new() -> Self {
        Self
    }
}

impl Encoder<&InputEvent> for InputEventCodec {
    type Error = ProtocolError;

    fn encode(&mut self, event: &InputEvent, dst: &mut BytesMut) -> Result<(), Self::Error> {
        event.validate()?;

        dst.put_slice(b"type:");
        dst.put_slice(event.event_type.as_bytes());
        dst.put_slice(b";\n");
        for (key, value) in &event.fields {
            dst.put_slice(key.as_bytes());
            dst.put_u8(b':');
            dst.put_slice(value.as_bytes());
            dst.put_u8(b'\n');
        }
        dst.put_u8(b'\n');
        Ok(())
    }
}
