//! Staging and committing patches.
//!
//! A [`PatchBuilder`] accumulates ops for one writer. Adds mint fresh
//! dots from the builder's copy of the writer's version vector; removes
//! resolve the dots currently observed in the builder's state reference
//! and never mint; property writes carry no dot at all.
//!
//! `commit` runs the write pipeline against the persistence port: read
//! the writer's ref tip, continue the lamport sequence from the tip's
//! envelope, encode the patch as canonical CBOR, write blob, tree, and
//! commit, then compare-and-swap the ref. A tip that moves between the
//! read and the swap fails the commit; the caller rebuilds and retries
//! rather than silently forking the writer's chain.

use tracing::{debug, instrument};

use crate::clock::VersionVector;
use crate::codec::{self, CodecError};
use crate::envelope::Envelope;
use crate::error::ErrorCode;
use crate::ident::IdentError;
use crate::keys::{self, KeyError};
use crate::patch::{Op, PATCH_SCHEMA, Patch};
use crate::ports::{Persistence, StoreError};
use crate::state::WarpState;

/// The ref a writer's patch chain lives under.
#[must_use]
pub fn writer_ref(graph: &str, writer: &str) -> String {
    format!("refs/warp/{graph}/writers/{writer}")
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Failures while staging or committing a patch.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    /// Commit was asked to persist a patch with no operations.
    #[error("patch has no operations")]
    EmptyPatch,

    /// The writer's ref tip diverged from what the builder expected.
    #[error("ref moved under the builder: {ref_name}")]
    CasConflict {
        /// The contended ref.
        ref_name: String,
    },

    /// A staged string contained a reserved separator byte.
    #[error(transparent)]
    Key(#[from] KeyError),

    /// Dot minting failed.
    #[error(transparent)]
    Ident(#[from] IdentError),

    /// The persistence port failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The patch body could not be encoded.
    #[error(transparent)]
    Codec(#[from] CodecError),
}

impl BuildError {
    /// Stable machine-readable code.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::EmptyPatch => ErrorCode::EmptyPatch,
            Self::CasConflict { .. } => ErrorCode::CasConflict,
            Self::Key(err) => err.code(),
            Self::Ident(err) => err.code(),
            Self::Store(err) => err.code(),
            Self::Codec(err) => err.code(),
        }
    }
}

// ---------------------------------------------------------------------------
// PatchBuilder
// ---------------------------------------------------------------------------

/// Stages ops for one writer against an optional current state.
#[derive(Debug)]
pub struct PatchBuilder<'a> {
    graph: String,
    writer: String,
    lamport: u64,
    vv: VersionVector,
    state: Option<&'a WarpState>,
    ops: Vec<Op>,
    expected_parent: Option<String>,
}

impl<'a> PatchBuilder<'a> {
    /// Start a builder for `writer` on `graph`.
    ///
    /// # Errors
    ///
    /// Returns a key error when the graph or writer contains a reserved
    /// byte, or an identity error when the writer is empty.
    pub fn new(graph: impl Into<String>, writer: impl Into<String>) -> Result<Self, BuildError> {
        let graph = graph.into();
        let writer = writer.into();
        keys::check_user_string("graph", &graph)?;
        keys::check_user_string("writer", &writer)?;
        if writer.is_empty() {
            return Err(BuildError::Ident(IdentError::InvalidDot(
                "writer must be non-empty".into(),
            )));
        }
        Ok(Self {
            graph,
            writer,
            lamport: 1,
            vv: VersionVector::new(),
            state: None,
            ops: Vec::new(),
            expected_parent: None,
        })
    }

    /// Resolve observed dots against `state` and start the version
    /// vector from a copy of its observed frontier.
    #[must_use]
    pub fn with_state(mut self, state: &'a WarpState) -> Self {
        self.vv = state.observed_frontier().clone();
        self.state = Some(state);
        self
    }

    /// Override the starting lamport value (normally continued from the
    /// chain tip at commit time).
    #[must_use]
    pub const fn at_lamport(mut self, lamport: u64) -> Self {
        self.lamport = lamport;
        self
    }

    /// Require the writer's ref tip to equal `sha` at commit time.
    #[must_use]
    pub fn expecting_parent(mut self, sha: impl Into<String>) -> Self {
        self.expected_parent = Some(sha.into());
        self
    }

    /// Number of staged ops.
    #[must_use]
    pub fn op_count(&self) -> usize {
        self.ops.len()
    }

    // -- staging ------------------------------------------------------------

    /// Stage a node add under a fresh dot.
    ///
    /// # Errors
    ///
    /// Returns a key error on reserved bytes.
    pub fn add_node(&mut self, node: &str) -> Result<(), BuildError> {
        keys::check_user_string("node", node)?;
        let dot = self.vv.increment(&self.writer)?;
        self.ops.push(Op::NodeAdd {
            node: node.to_owned(),
            dot,
        });
        Ok(())
    }

    /// Stage an edge add under a fresh dot.
    ///
    /// # Errors
    ///
    /// Returns a key error on reserved bytes.
    pub fn add_edge(&mut self, from: &str, to: &str, label: &str) -> Result<(), BuildError> {
        // Encoding validates all three fields.
        keys::edge_key(from, to, label)?;
        let dot = self.vv.increment(&self.writer)?;
        self.ops.push(Op::EdgeAdd {
            from: from.to_owned(),
            to: to.to_owned(),
            label: label.to_owned(),
            dot,
        });
        Ok(())
    }

    /// Stage a node remove over the dots currently observed for `node`.
    ///
    /// With no state reference the observed set is empty, which makes
    /// the remove a no-op against any concurrent add.
    ///
    /// # Errors
    ///
    /// Returns a key error on reserved bytes.
    pub fn remove_node(&mut self, node: &str) -> Result<(), BuildError> {
        keys::check_user_string("node", node)?;
        let observed = self
            .state
            .map(|state| {
                state
                    .node_alive()
                    .dots(&node.to_owned())
                    .into_iter()
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        self.ops.push(Op::NodeRemove {
            node: node.to_owned(),
            observed,
        });
        Ok(())
    }

    /// Stage an edge remove over the dots currently observed for the edge.
    ///
    /// # Errors
    ///
    /// Returns a key error on reserved bytes.
    pub fn remove_edge(&mut self, from: &str, to: &str, label: &str) -> Result<(), BuildError> {
        let key = keys::edge_key(from, to, label)?;
        let observed = self
            .state
            .map(|state| {
                state
                    .edge_alive()
                    .dots(&key)
                    .into_iter()
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        self.ops.push(Op::EdgeRemove {
            from: from.to_owned(),
            to: to.to_owned(),
            label: label.to_owned(),
            observed,
        });
        Ok(())
    }

    /// Stage a node property write. No dot is minted.
    ///
    /// # Errors
    ///
    /// Returns a key error on reserved bytes.
    pub fn set_property(
        &mut self,
        node: &str,
        key: &str,
        value: serde_json::Value,
    ) -> Result<(), BuildError> {
        keys::node_prop_key(node, key)?;
        self.ops.push(Op::PropSet {
            node: node.to_owned(),
            key: key.to_owned(),
            value,
        });
        Ok(())
    }

    /// Stage an edge property write. No dot is minted.
    ///
    /// # Errors
    ///
    /// Returns a key error on reserved bytes.
    pub fn set_edge_property(
        &mut self,
        from: &str,
        to: &str,
        label: &str,
        key: &str,
        value: serde_json::Value,
    ) -> Result<(), BuildError> {
        keys::edge_prop_key(from, to, label, key)?;
        self.ops.push(Op::EdgePropSet {
            from: from.to_owned(),
            to: to.to_owned(),
            label: label.to_owned(),
            key: key.to_owned(),
            value,
        });
        Ok(())
    }

    // -- building and committing --------------------------------------------

    /// Snapshot the staged ops as a patch.
    #[must_use]
    pub fn build(&self) -> Patch {
        Patch {
            schema: PATCH_SCHEMA,
            writer: self.writer.clone(),
            lamport: self.lamport,
            ops: self.ops.clone(),
            context: self.vv.clone(),
        }
    }

    /// Persist the staged patch and advance the writer's ref.
    ///
    /// Returns the new commit sha. The builder is consumed: a failed
    /// commit means re-staging against fresh state, not blind re-submission.
    ///
    /// # Errors
    ///
    /// [`BuildError::EmptyPatch`] with nothing staged;
    /// [`BuildError::CasConflict`] when the tip diverges from
    /// `expecting_parent` or moves during the final swap; port and codec
    /// failures propagate.
    #[instrument(skip(self, store), fields(graph = %self.graph, writer = %self.writer))]
    pub fn commit<S: Persistence + ?Sized>(mut self, store: &S) -> Result<String, BuildError> {
        if self.ops.is_empty() {
            return Err(BuildError::EmptyPatch);
        }
        let ref_name = writer_ref(&self.graph, &self.writer);
        let tip = store.read_ref(&ref_name)?;

        if let Some(expected) = &self.expected_parent {
            if tip.as_deref() != Some(expected.as_str()) {
                return Err(BuildError::CasConflict { ref_name });
            }
        }

        if let Some(tip_sha) = &tip {
            let message = store.commit_message(tip_sha)?;
            match Envelope::parse(&message) {
                Ok(envelope) => self.lamport = envelope.lamport() + 1,
                Err(err) => {
                    // A foreign tip message does not carry a lamport to
                    // continue from; keep the builder's own value.
                    debug!(%err, "tip message is not an envelope");
                }
            }
        }

        let patch = self.build();
        let bytes = codec::encode(&patch)?;
        let blob_oid = store.write_blob(&bytes)?;
        let tree_oid = store.write_tree(&[(PATCH_BLOB_NAME.to_owned(), blob_oid.clone())])?;
        let message = Envelope::Patch {
            graph: self.graph.clone(),
            writer: self.writer.clone(),
            lamport: patch.lamport,
            patch_oid: blob_oid,
        }
        .format();
        let parents: Vec<String> = tip.iter().cloned().collect();
        let commit = store.create_commit(&tree_oid, &parents, &message)?;
        store.compare_and_swap_ref(&ref_name, &commit, tip.as_deref())?;
        debug!(commit = commit.as_str(), lamport = patch.lamport, "committed patch");
        Ok(commit)
    }
}

// ---------------------------------------------------------------------------
// Chain reading
// ---------------------------------------------------------------------------

/// Tree entry name of the patch blob inside each writer-chain commit.
pub const PATCH_BLOB_NAME: &str = "patch.cbor";

/// Read a writer's patch chain oldest-first, pairing each patch with its
/// commit sha (the sha event ids embed on replay).
///
/// # Errors
///
/// Propagates port and decode failures.
pub fn read_writer_patches<S: Persistence + ?Sized>(
    store: &S,
    graph: &str,
    writer: &str,
) -> Result<Vec<crate::patch::SealedPatch>, BuildError> {
    let mut sealed = Vec::new();
    let mut cursor = store.read_ref(&writer_ref(graph, writer))?;
    while let Some(commit_sha) = cursor {
        let tree = store.commit_tree(&commit_sha)?;
        let entries = store.read_tree(&tree)?;
        let blob_oid = entries.get(PATCH_BLOB_NAME).ok_or_else(|| {
            BuildError::Store(StoreError::NotFound {
                oid: format!("{PATCH_BLOB_NAME} in commit {commit_sha}"),
            })
        })?;
        let bytes = store.read_blob(blob_oid)?;
        let patch: Patch = codec::decode(&bytes)?;
        let info = store.commit_info(&commit_sha)?;
        sealed.push(crate::patch::SealedPatch::new(commit_sha, patch));
        cursor = info.parents.first().cloned();
    }
    sealed.reverse();
    Ok(sealed)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
