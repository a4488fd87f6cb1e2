//! Correlation identifiers for request/response matching

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque identifier linking a call to its response(s)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(String);

impl CorrelationId {
    /// Wrap a raw identifier
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the raw identifier
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CorrelationId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for CorrelationId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Generates process-unique correlation ids for one client instance
///
/// Ids are an 8-digit hex prefix chosen at construction followed by a
/// counter formatted to at least 8 hex digits. The counter only moves
/// forward, so an id is never handed out twice by the same generator, even
/// across reconnects.
#[derive(Debug)]
pub struct CorrelationIdGenerator {
    prefix: String,
    counter: u64,
}

impl CorrelationIdGenerator {
    /// Create a generator with a random prefix
    pub fn new() -> Self {
        Self::with_prefix(rand::random::<u32>())
    }

    /// Create a generator with a fixed prefix
    pub fn with_prefix(prefix: u32) -> Self {
        Self {
            prefix: format!("{:08x}", prefix),
            counter: 0,
        }
    }

    /// The per-instance prefix shared by every id from this generator
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Produce the next id
    pub fn next_id(&mut self) -> CorrelationId {
        let id = format!("{}{:08x}", self.prefix, self.counter);
        self.counter += 1;
        CorrelationId(id)
    }
}

impl Default for CorrelationIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_fixed_prefix_format() {
        let mut ids = CorrelationIdGenerator::with_prefix(0xdead_beef);

        assert_eq!(ids.next_id().as_str(), "deadbeef00000000");
        assert_eq!(ids.next_id().as_str(), "deadbeef00000001");
        assert_eq!(ids.prefix(), "deadbeef");
    }

    #[test]
    fn test_small_prefix_is_zero_padded() {
        let mut ids = CorrelationIdGenerator::with_prefix(0x2a);
        assert_eq!(ids.next_id().as_str(), "0000002a00000000");
    }

    #[test]
    fn test_ids_are_unique() {
        let mut ids = CorrelationIdGenerator::new();
        let seen: HashSet<_> = (0..10_000).map(|_| ids.next_id()).collect();
        assert_eq!(seen.len(), 10_000);
    }

    #[test]
    fn test_counter_widens_past_fixed_width() {
        let mut ids = CorrelationIdGenerator::with_prefix(1);
        ids.counter = 0xffff_ffff;

        let last_narrow = ids.next_id();
        let first_wide = ids.next_id();

        assert_eq!(last_narrow.as_str(), "00000001ffffffff");
        assert_eq!(first_wide.as_str(), "00000001100000000");
        assert_ne!(last_narrow, first_wide);
    }

    #[test]
    fn test_serializes_as_plain_string() {
        let id = CorrelationId::new("abc");
        assert_eq!(serde_json::to_string(&id).unwrap(), r#""abc""#);
    }
}
