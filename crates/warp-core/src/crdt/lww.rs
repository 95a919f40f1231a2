//! Last-writer-wins registers keyed by event id.
//!
//! The register's merge keeps whichever operand carries the greater
//! [`EventId`]. Event ids form a strict total order (lamport, writer,
//! patch sha, op index), so two distinct writes never tie; when the ids
//! are equal the operands are the same write and the first operand is
//! kept, which makes the join idempotent.

use serde::{Deserialize, Serialize};

use super::merge::Merge;
use crate::ident::EventId;

/// A value tagged with the event id that wrote it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LwwRegister {
    /// The event id of the winning write.
    pub event: EventId,
    /// The written value.
    pub value: serde_json::Value,
}

impl LwwRegister {
    /// Build a register from a write.
    #[must_use]
    pub const fn new(event: EventId, value: serde_json::Value) -> Self {
        Self { event, value }
    }

    /// `true` when an incoming write with `event` would win over this one.
    #[must_use]
    pub fn loses_to(&self, event: &EventId) -> bool {
        *event > self.event
    }

    /// Join two registers, returning the winner.
    #[must_use]
    pub fn join(a: Self, b: Self) -> Self {
        if b.event > a.event { b } else { a }
    }
}

impl Merge for LwwRegister {
    fn merge(&mut self, other: Self) {
        if other.event > self.event {
            *self = other;
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
