//! Patches: ordered batches of graph operations with a causal context.
//!
//! A patch carries a writer id, the writer's lamport value, the op list,
//! and a copy of the writer's version vector at build time. Patches are
//! content-addressed by the storage layer; the resulting sha pairs with
//! the patch as a [`SealedPatch`] when replaying, because synthetic event
//! ids embed the hosting patch's sha.
//!
//! # Forward compatibility
//!
//! Ops decode through a closed tagged union with an explicit
//! [`Op::Unknown`] variant. An op whose `type` tag is unrecognized is
//! preserved verbatim as a raw value: the reducer skips it, receipt mode
//! excludes it, and re-encoding emits the original payload unchanged.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::clock::VersionVector;
use crate::ident::Dot;

/// Schema version of the persisted patch body.
pub const PATCH_SCHEMA: u32 = 2;

// ---------------------------------------------------------------------------
// Ops
// ---------------------------------------------------------------------------

/// A single graph operation.
#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    /// Tag a node as alive under a fresh dot.
    NodeAdd {
        /// Node id.
        node: String,
        /// The dot minted for this add.
        dot: Dot,
    },
    /// Tombstone the observed dots of a node.
    NodeRemove {
        /// Node id (carried for receipts; removal is dot-driven).
        node: String,
        /// Dots the remover had observed for the node.
        observed: Vec<Dot>,
    },
    /// Tag an edge as alive under a fresh dot.
    EdgeAdd {
        /// Source node id.
        from: String,
        /// Target node id.
        to: String,
        /// Edge label.
        label: String,
        /// The dot minted for this add.
        dot: Dot,
    },
    /// Tombstone the observed dots of an edge.
    EdgeRemove {
        /// Source node id.
        from: String,
        /// Target node id.
        to: String,
        /// Edge label.
        label: String,
        /// Dots the remover had observed for the edge.
        observed: Vec<Dot>,
    },
    /// Write a node property (last-writer-wins).
    PropSet {
        /// Owning node id.
        node: String,
        /// Property name.
        key: String,
        /// Property value.
        value: serde_json::Value,
    },
    /// Write an edge property (last-writer-wins, scoped to the edge's
    /// current incarnation).
    EdgePropSet {
        /// Source node id.
        from: String,
        /// Target node id.
        to: String,
        /// Edge label.
        label: String,
        /// Property name.
        key: String,
        /// Property value.
        value: serde_json::Value,
    },
    /// An op of a kind this build does not know. Round-trips verbatim.
    Unknown(ciborium::Value),
}

impl Op {
    /// Short kind name for logs and receipts.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::NodeAdd { .. } => "NodeAdd",
            Self::NodeRemove { .. } => "NodeRemove",
            Self::EdgeAdd { .. } => "EdgeAdd",
            Self::EdgeRemove { .. } => "EdgeRemove",
            Self::PropSet { .. } => "PropSet",
            Self::EdgePropSet { .. } => "EdgePropSet",
            Self::Unknown(_) => "Unknown",
        }
    }
}

/// Serde mirror of the known op kinds. The `type` tag is the wire
/// discriminant; [`Op`]'s own serde impls route through this and fall back
/// to [`Op::Unknown`] for unrecognized tags.
#[derive(Serialize, Deserialize)]
#[serde(tag = "type")]
enum KnownOp {
    NodeAdd {
        node: String,
        dot: Dot,
    },
    NodeRemove {
        node: String,
        observed: Vec<Dot>,
    },
    EdgeAdd {
        from: String,
        to: String,
        label: String,
        dot: Dot,
    },
    EdgeRemove {
        from: String,
        to: String,
        label: String,
        observed: Vec<Dot>,
    },
    PropSet {
        node: String,
        key: String,
        value: serde_json::Value,
    },
    EdgePropSet {
        from: String,
        to: String,
        label: String,
        key: String,
        value: serde_json::Value,
    },
}

const KNOWN_TAGS: [&str; 6] = [
    "NodeAdd",
    "NodeRemove",
    "EdgeAdd",
    "EdgeRemove",
    "PropSet",
    "EdgePropSet",
];

impl From<KnownOp> for Op {
    fn from(op: KnownOp) -> Self {
        match op {
            KnownOp::NodeAdd { node, dot } => Self::NodeAdd { node, dot },
            KnownOp::NodeRemove { node, observed } => Self::NodeRemove { node, observed },
            KnownOp::EdgeAdd {
                from,
                to,
                label,
                dot,
            } => Self::EdgeAdd {
                from,
                to,
                label,
                dot,
            },
            KnownOp::EdgeRemove {
                from,
                to,
                label,
                observed,
            } => Self::EdgeRemove {
                from,
                to,
                label,
                observed,
            },
            KnownOp::PropSet { node, key, value } => Self::PropSet { node, key, value },
            KnownOp::EdgePropSet {
                from,
                to,
                label,
                key,
                value,
            } => Self::EdgePropSet {
                from,
                to,
                label,
                key,
                value,
            },
        }
    }
}

impl Op {
    fn to_known(&self) -> Option<KnownOp> {
        match self {
            Self::NodeAdd { node, dot } => Some(KnownOp::NodeAdd {
                node: node.clone(),
                dot: dot.clone(),
            }),
            Self::NodeRemove { node, observed } => Some(KnownOp::NodeRemove {
                node: node.clone(),
                observed: observed.clone(),
            }),
            Self::EdgeAdd {
                from,
                to,
                label,
                dot,
            } => Some(KnownOp::EdgeAdd {
                from: from.clone(),
                to: to.clone(),
                label: label.clone(),
                dot: dot.clone(),
            }),
            Self::EdgeRemove {
                from,
                to,
                label,
                observed,
            } => Some(KnownOp::EdgeRemove {
                from: from.clone(),
                to: to.clone(),
                label: label.clone(),
                observed: observed.clone(),
            }),
            Self::PropSet { node, key, value } => Some(KnownOp::PropSet {
                node: node.clone(),
                key: key.clone(),
                value: value.clone(),
            }),
            Self::EdgePropSet {
                from,
                to,
                label,
                key,
                value,
            } => Some(KnownOp::EdgePropSet {
                from: from.clone(),
                to: to.clone(),
                label: label.clone(),
                key: key.clone(),
                value: value.clone(),
            }),
            Self::Unknown(_) => None,
        }
    }
}

impl Serialize for Op {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.to_known() {
            Some(known) => known.serialize(serializer),
            None => match self {
                Self::Unknown(raw) => raw.serialize(serializer),
                // to_known covers every other variant.
                _ => unreachable!("non-unknown op without known mirror"),
            },
        }
    }
}

impl<'de> Deserialize<'de> for Op {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = ciborium::Value::deserialize(deserializer)?;
        let tag = match &raw {
            ciborium::Value::Map(entries) => entries.iter().find_map(|(key, value)| {
                match (key, value) {
                    (ciborium::Value::Text(key), ciborium::Value::Text(value))
                        if key == "type" =>
                    {
                        Some(value.clone())
                    }
                    _ => None,
                }
            }),
            _ => None,
        };
        match tag {
            Some(tag) if KNOWN_TAGS.contains(&tag.as_str()) => raw
                .deserialized::<KnownOp>()
                .map(Op::from)
                .map_err(D::Error::custom),
            // Unknown or missing tag: preserve the payload untouched.
            _ => Ok(Self::Unknown(raw)),
        }
    }
}

// ---------------------------------------------------------------------------
// Patch
// ---------------------------------------------------------------------------

/// An ordered batch of ops with a writer, lamport, and causal context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Patch {
    /// Persisted body schema version.
    pub schema: u32,
    /// The authoring writer id.
    pub writer: String,
    /// The writer's lamport value for this patch.
    pub lamport: u64,
    /// Ops, applied in declared order.
    pub ops: Vec<Op>,
    /// The writer's version vector at build time.
    pub context: VersionVector,
}

impl Patch {
    /// The patch's own dot `(writer, lamport)`, folded into the observed
    /// frontier when the patch is applied.
    ///
    /// # Errors
    ///
    /// Returns an identity error when the writer is empty or the lamport
    /// is zero.
    pub fn dot(&self) -> Result<Dot, crate::ident::IdentError> {
        Dot::new(self.writer.as_str(), self.lamport)
    }
}

/// A patch paired with the content sha the storage layer assigned it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SealedPatch {
    /// Storage sha of the encoded patch body.
    pub sha: String,
    /// The patch itself.
    pub patch: Patch,
}

impl SealedPatch {
    /// Pair a patch with its storage sha.
    #[must_use]
    pub const fn new(sha: String, patch: Patch) -> Self {
        Self { sha, patch }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
