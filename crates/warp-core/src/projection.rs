//! Canonical state serialization and hashing.
//!
//! Two encodings live here:
//!
//! - The **visible projection**: the subset of a state reported by the
//!   visibility predicates, rendered in a canonical shape (sorted nodes,
//!   edges sorted by `(from, to, label)`, props sorted by encoded key).
//!   Its canonical CBOR encoding, hashed with SHA-256, is the state hash
//!   used for identity and for boundary records.
//! - The **checkpoint**: the complete state including OR-Set internals,
//!   full registers, the observed frontier, and edge birth events, under
//!   the `"full-v5"` version tag. Any other tag is rejected on read;
//!   omitted fields deserialize to empty substructures.
//!
//! Struct fields are declared in canonical (sorted) key order so the
//! encoded maps are canonical without a reordering pass.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::clock::VersionVector;
use crate::codec::{self, CodecError};
use crate::crdt::{LwwRegister, OrSet};
use crate::crypto;
use crate::error::ErrorCode;
use crate::ident::EventId;
use crate::state::WarpState;

/// Version tag of the checkpoint encoding.
pub const CHECKPOINT_VERSION: &str = "full-v5";

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Serialization failures for projections and checkpoints.
#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    /// The canonical encoder failed.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// A checkpoint carried a version tag this build does not read.
    #[error("unsupported checkpoint version {found:?}, want {CHECKPOINT_VERSION:?}")]
    UnsupportedVersion {
        /// The tag found in the input.
        found: String,
    },
}

impl CheckpointError {
    /// Stable machine-readable code.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Codec(err) => err.code(),
            Self::UnsupportedVersion { .. } => ErrorCode::StateUnsupportedVersion,
        }
    }
}

// ---------------------------------------------------------------------------
// Visible projection
// ---------------------------------------------------------------------------

/// The canonical visible projection of a state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisibleProjection {
    /// Visible edges as `(from, to, label)` triples, sorted.
    pub edges: Vec<(String, String, String)>,
    /// Visible nodes, sorted.
    pub nodes: Vec<String>,
    /// Visible properties as `(encodedKey, value)` pairs, sorted by key.
    pub props: Vec<(String, serde_json::Value)>,
}

/// Project `state` onto its visible nodes, edges, and properties.
#[must_use]
pub fn visible_projection(state: &WarpState) -> VisibleProjection {
    let nodes: Vec<String> = state.node_alive().elements().cloned().collect();

    let mut edges: Vec<(String, String, String)> = state
        .edge_alive()
        .elements()
        .filter(|key| state.edge_visible_key(key.as_str()))
        .filter_map(|key| crate::keys::decode_edge_key(key).ok())
        .map(|edge| (edge.from, edge.to, edge.label))
        .collect();
    edges.sort();

    let props: Vec<(String, serde_json::Value)> = state
        .props()
        .iter()
        .filter(|(key, _)| state.prop_visible_key(key.as_str()))
        .map(|(key, register)| (key.clone(), register.value.clone()))
        .collect();

    VisibleProjection {
        edges,
        nodes,
        props,
    }
}

/// The SHA-256 hex of a state's canonical visible projection.
///
/// # Errors
///
/// Returns a codec error when the projection cannot be encoded.
pub fn state_hash(state: &WarpState) -> Result<String, CodecError> {
    let bytes = codec::encode(&visible_projection(state))?;
    Ok(crypto::sha256_hex(&bytes))
}

// ---------------------------------------------------------------------------
// Checkpoint
// ---------------------------------------------------------------------------

/// Wire shape of the full-state checkpoint. Field names follow the
/// persisted format; declaration order is canonical key order.
#[derive(Serialize, Deserialize)]
struct Checkpoint {
    #[serde(rename = "edgeAlive", default)]
    edge_alive: OrSet<String>,
    #[serde(rename = "edgeBirthEvent", default)]
    edge_birth: BTreeMap<String, EventId>,
    #[serde(rename = "nodeAlive", default)]
    node_alive: OrSet<String>,
    #[serde(rename = "observedFrontier", default)]
    observed_frontier: VersionVector,
    #[serde(default)]
    prop: BTreeMap<String, LwwRegister>,
    version: String,
}

/// Encode the complete state, internals included, as a checkpoint.
///
/// # Errors
///
/// Returns a codec error when encoding fails.
pub fn serialize_full(state: &WarpState) -> Result<Vec<u8>, CheckpointError> {
    let checkpoint = Checkpoint {
        edge_alive: state.edge_alive().clone(),
        edge_birth: state.edge_birth().clone(),
        node_alive: state.node_alive().clone(),
        observed_frontier: state.observed_frontier().clone(),
        prop: state.props().clone(),
        version: CHECKPOINT_VERSION.to_owned(),
    };
    Ok(codec::encode(&checkpoint)?)
}

/// Decode a checkpoint back into a state.
///
/// # Errors
///
/// Returns [`CheckpointError::UnsupportedVersion`] for any tag other than
/// [`CHECKPOINT_VERSION`], or a codec error on malformed input.
pub fn deserialize_full(bytes: &[u8]) -> Result<WarpState, CheckpointError> {
    let checkpoint: Checkpoint = codec::decode(bytes)?;
    if checkpoint.version != CHECKPOINT_VERSION {
        return Err(CheckpointError::UnsupportedVersion {
            found: checkpoint.version,
        });
    }
    let mut state = WarpState::new();
    state.node_alive = checkpoint.node_alive;
    state.edge_alive = checkpoint.edge_alive;
    state.props = checkpoint.prop;
    state.observed_frontier = checkpoint.observed_frontier;
    state.edge_birth = checkpoint.edge_birth;
    Ok(state)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
