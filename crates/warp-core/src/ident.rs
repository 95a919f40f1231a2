//! Identity primitives: dots and event ids.
//!
//! A [`Dot`] is the identity of a single add operation: an ordered pair of
//! writer id and a per-writer counter. Dots are identities, not timestamps;
//! they never express ordering of effects, only which add they belong to.
//!
//! An [`EventId`] is a strict total order used exclusively for
//! last-writer-wins tie-breaking. It extends the (lamport, writer) pair with
//! the hosting patch sha and the op's position inside that patch, so no two
//! distinct operations ever compare equal.
//!
//! # Wire forms
//!
//! - A dot serializes as the string `"<writer>:<counter>"`. Decoding splits
//!   on the *last* colon, so writer ids may themselves contain colons.
//! - An event id serializes as the 4-tuple
//!   `[lamport, writer, patchSha, opIndex]`, which sorts in comparison
//!   order when compared field by field.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

use crate::error::ErrorCode;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Validation and decoding failures for identity primitives.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdentError {
    /// Dot construction or decoding rejected the input.
    #[error("invalid dot: {0}")]
    InvalidDot(String),

    /// Event id construction rejected the input.
    #[error("invalid event id: {0}")]
    InvalidEventId(String),
}

impl IdentError {
    /// Stable machine-readable code.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidDot(_) => ErrorCode::InvalidDot,
            Self::InvalidEventId(_) => ErrorCode::InvalidEventId,
        }
    }
}

// ---------------------------------------------------------------------------
// Dot
// ---------------------------------------------------------------------------

/// The identity of a single add operation: `(writer, counter)`.
///
/// Ordering is writer-lexicographic, then counter-numeric. Counters start
/// at 1; a zero counter never appears in a valid dot.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Dot {
    writer: String,
    counter: u64,
}

impl Dot {
    /// Build a dot, validating a non-empty writer and a positive counter.
    ///
    /// # Errors
    ///
    /// Returns [`IdentError::InvalidDot`] on an empty writer or zero counter.
    pub fn new(writer: impl Into<String>, counter: u64) -> Result<Self, IdentError> {
        let writer = writer.into();
        if writer.is_empty() {
            return Err(IdentError::InvalidDot("writer must be non-empty".into()));
        }
        if counter == 0 {
            return Err(IdentError::InvalidDot("counter must be positive".into()));
        }
        Ok(Self { writer, counter })
    }

    /// The writer id that minted this dot.
    #[must_use]
    pub fn writer(&self) -> &str {
        &self.writer
    }

    /// The per-writer counter, starting at 1.
    #[must_use]
    pub const fn counter(&self) -> u64 {
        self.counter
    }

    /// Encode to the `"<writer>:<counter>"` wire form.
    #[must_use]
    pub fn encode(&self) -> String {
        format!("{}:{}", self.writer, self.counter)
    }

    /// Decode the `"<writer>:<counter>"` wire form.
    ///
    /// The split is on the last colon, so writer ids containing colons
    /// round-trip.
    ///
    /// # Errors
    ///
    /// Returns [`IdentError::InvalidDot`] when the separator is missing, the
    /// writer is empty, or the counter does not parse to a positive integer.
    pub fn decode(encoded: &str) -> Result<Self, IdentError> {
        let (writer, counter) = encoded
            .rsplit_once(':')
            .ok_or_else(|| IdentError::InvalidDot(format!("missing separator in {encoded:?}")))?;
        let counter: u64 = counter
            .parse()
            .map_err(|_| IdentError::InvalidDot(format!("bad counter in {encoded:?}")))?;
        Self::new(writer, counter)
    }
}

impl fmt::Display for Dot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.writer, self.counter)
    }
}

impl Serialize for Dot {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.encode())
    }
}

impl<'de> Deserialize<'de> for Dot {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        Self::decode(&encoded).map_err(D::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// EventId
// ---------------------------------------------------------------------------

/// Strict total order for last-writer-wins tie-breaking.
///
/// Compares lexicographically by `(lamport, writer, patch_sha, op_index)`.
/// Distinct from a [`Dot`]: it additionally encodes the hosting patch and
/// the op's position, which makes the order total.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EventId {
    lamport: u64,
    writer: String,
    patch_sha: String,
    op_index: u32,
}

impl EventId {
    /// Build an event id, validating non-empty writer and patch sha.
    ///
    /// # Errors
    ///
    /// Returns [`IdentError::InvalidEventId`] when the writer or patch sha
    /// is empty.
    pub fn new(
        lamport: u64,
        writer: impl Into<String>,
        patch_sha: impl Into<String>,
        op_index: u32,
    ) -> Result<Self, IdentError> {
        let writer = writer.into();
        let patch_sha = patch_sha.into();
        if writer.is_empty() {
            return Err(IdentError::InvalidEventId("writer must be non-empty".into()));
        }
        if patch_sha.is_empty() {
            return Err(IdentError::InvalidEventId(
                "patch sha must be non-empty".into(),
            ));
        }
        Ok(Self {
            lamport,
            writer,
            patch_sha,
            op_index,
        })
    }

    /// Lamport component.
    #[must_use]
    pub const fn lamport(&self) -> u64 {
        self.lamport
    }

    /// Writer component.
    #[must_use]
    pub fn writer(&self) -> &str {
        &self.writer
    }

    /// Hosting patch sha.
    #[must_use]
    pub fn patch_sha(&self) -> &str {
        &self.patch_sha
    }

    /// Position of the op inside the hosting patch.
    #[must_use]
    pub const fn op_index(&self) -> u32 {
        self.op_index
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}@{}/{}#{}",
            self.writer, self.lamport, self.patch_sha, self.op_index
        )
    }
}

impl Serialize for EventId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        (&self.lamport, &self.writer, &self.patch_sha, &self.op_index).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for EventId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let (lamport, writer, patch_sha, op_index) =
            <(u64, String, String, u32)>::deserialize(deserializer)?;
        Self::new(lamport, writer, patch_sha, op_index).map_err(D::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn dot(writer: &str, counter: u64) -> Dot {
        Dot::new(writer, counter).expect("valid dot")
    }

    // === Dot construction and validation ===

    #[test]
    fn rejects_empty_writer() {
        let err = Dot::new("", 1).unwrap_err();
        assert_eq!(err.code().code(), "E_INVALID_DOT");
    }

    #[test]
    fn rejects_zero_counter() {
        assert!(Dot::new("a", 0).is_err());
    }

    // === Dot encoding ===

    #[test]
    fn encode_decode_roundtrip() {
        let d = dot("alice", 42);
        assert_eq!(d.encode(), "alice:42");
        assert_eq!(Dot::decode("alice:42").expect("decodes"), d);
    }

    #[test]
    fn decode_splits_on_last_colon() {
        let d = Dot::decode("node:eu-west:7").expect("decodes");
        assert_eq!(d.writer(), "node:eu-west");
        assert_eq!(d.counter(), 7);
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(Dot::decode("no-separator").is_err());
        assert!(Dot::decode("a:zero").is_err());
        assert!(Dot::decode("a:0").is_err());
        assert!(Dot::decode(":1").is_err());
    }

    // === Dot ordering ===

    #[test]
    fn orders_by_writer_then_numeric_counter() {
        assert!(dot("a", 99) < dot("b", 1));
        // Numeric, not lexicographic: 2 < 10.
        assert!(dot("a", 2) < dot("a", 10));
    }

    #[test]
    fn serde_uses_encoded_string() {
        let d = dot("w", 3);
        let json = serde_json::to_string(&d).expect("serializes");
        assert_eq!(json, "\"w:3\"");
        let back: Dot = serde_json::from_str(&json).expect("deserializes");
        assert_eq!(back, d);
    }

    // === EventId ===

    #[test]
    fn event_id_orders_by_field_sequence() {
        let a = EventId::new(1, "a", "s1", 0).expect("valid");
        let b = EventId::new(2, "a", "s1", 0).expect("valid");
        let c = EventId::new(2, "b", "s1", 0).expect("valid");
        let d = EventId::new(2, "b", "s2", 0).expect("valid");
        let e = EventId::new(2, "b", "s2", 1).expect("valid");
        assert!(a < b && b < c && c < d && d < e);
    }

    #[test]
    fn event_id_rejects_empty_fields() {
        assert!(EventId::new(1, "", "sha", 0).is_err());
        let err = EventId::new(1, "w", "", 0).unwrap_err();
        assert_eq!(err.code().code(), "E_INVALID_EVENTID");
    }

    #[test]
    fn event_id_serde_tuple_roundtrip() {
        let id = EventId::new(7, "alice", "cafe", 2).expect("valid");
        let json = serde_json::to_string(&id).expect("serializes");
        assert_eq!(json, "[7,\"alice\",\"cafe\",2]");
        let back: EventId = serde_json::from_str(&json).expect("deserializes");
        assert_eq!(back, id);
    }
}
