#![forbid(unsafe_code)]
//! warp-core: an embedded, decentralized property-graph store.
//!
//! State is derived by replaying signed, content-addressed patches into
//! a CRDT: add-wins OR-Sets for node and edge liveness, last-writer-wins
//! registers for properties, a version-vector frontier, and per-edge
//! birth events. A canonical serializer hashes the visible projection; a
//! signed-record chain governs writer trust; boundary transition records
//! authenticate `(h_in, payload, h_out, t)` tuples under a shared
//! secret.
//!
//! Persistence, codec, and crypto are ports. The crate ships an
//! in-memory content-addressed store, a canonical CBOR codec, and a
//! SHA-256 / HMAC / Ed25519 crypto module as default realizations.
//!
//! # Conventions
//!
//! - **Errors**: module-local `thiserror` enums, each mapping onto the
//!   stable code table in [`error`].
//! - **Logging**: `tracing` macros; decision points log at `debug!`,
//!   accumulated-not-thrown problems at `warn!`.
//! - **Determinism**: every map that reaches a serializer is ordered;
//!   equal values encode byte-identically.

pub mod btr;
pub mod builder;
pub mod canon;
pub mod clock;
pub mod codec;
pub mod crdt;
pub mod crypto;
pub mod envelope;
pub mod error;
pub mod ident;
pub mod keys;
pub mod patch;
pub mod ports;
pub mod projection;
pub mod reducer;
pub mod state;
pub mod store;
pub mod trust;

pub use btr::{BoundaryRecord, BtrError};
pub use builder::{BuildError, PatchBuilder, read_writer_patches, writer_ref};
pub use clock::VersionVector;
pub use crdt::{LwwRegister, Merge, OrSet};
pub use error::ErrorCode;
pub use ident::{Dot, EventId, IdentError};
pub use patch::{Op, Patch, SealedPatch};
pub use ports::{CommitInfo, Persistence, StoreError};
pub use projection::{VisibleProjection, state_hash, visible_projection};
pub use reducer::{
    OpOutcome, OpReceipt, PatchReceipt, ReducerError, apply_op, apply_patch,
    apply_patch_with_receipt, reduce, reduce_with_receipts,
};
pub use state::{WarpState, join_states};
pub use store::MemoryStore;
pub use trust::{TrustError, TrustPolicy, TrustRecord, TrustState};
