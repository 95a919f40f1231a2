//! The persistence port.
//!
//! The engine stores patches and trust records through this trait and
//! assumes nothing about the backend beyond content addressing and
//! atomic compare-and-swap on refs. Object ids are opaque strings. A
//! Git-backed adapter satisfies the contract with blobs, trees, commits
//! and refs; [`crate::store::memory::MemoryStore`] satisfies it in
//! memory.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

use crate::error::ErrorCode;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Persistence failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// No object under the given id.
    #[error("object not found: {oid}")]
    NotFound {
        /// The missing object id.
        oid: String,
    },

    /// A ref update lost a compare-and-swap race.
    #[error("ref moved during compare-and-swap: {ref_name}")]
    CasConflict {
        /// The contended ref.
        ref_name: String,
    },

    /// The backend itself failed.
    #[error("store backend error: {0}")]
    Backend(String),
}

impl StoreError {
    /// Stable machine-readable code.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::NotFound { .. } => ErrorCode::StoreNotFound,
            Self::CasConflict { .. } => ErrorCode::CasConflict,
            Self::Backend(_) => ErrorCode::StoreBackend,
        }
    }
}

// ---------------------------------------------------------------------------
// Port
// ---------------------------------------------------------------------------

/// Commit metadata as reported by the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitInfo {
    /// Parent commit shas, in order.
    pub parents: Vec<String>,
    /// The commit message.
    pub message: String,
    /// Commit timestamp, when the backend records one.
    pub date: Option<DateTime<Utc>>,
}

/// Content-addressed storage with CAS-atomic refs.
pub trait Persistence {
    /// The oid a ref points at, if the ref exists.
    fn read_ref(&self, name: &str) -> Result<Option<String>, StoreError>;

    /// Atomically move `name` from `expected` to `new_oid`.
    ///
    /// `expected` of `None` asserts the ref does not exist yet. A
    /// mismatch between `expected` and the observed tip fails with
    /// [`StoreError::CasConflict`] and leaves the ref untouched.
    fn compare_and_swap_ref(
        &self,
        name: &str,
        new_oid: &str,
        expected: Option<&str>,
    ) -> Result<(), StoreError>;

    /// Store a blob, returning its content-addressed oid.
    fn write_blob(&self, bytes: &[u8]) -> Result<String, StoreError>;

    /// Read a blob by oid.
    fn read_blob(&self, oid: &str) -> Result<Vec<u8>, StoreError>;

    /// Store a tree of `(name, blob oid)` entries, returning its oid.
    fn write_tree(&self, entries: &[(String, String)]) -> Result<String, StoreError>;

    /// Read a tree's entries by oid.
    fn read_tree(&self, oid: &str) -> Result<BTreeMap<String, String>, StoreError>;

    /// Create a commit over `tree` with the given parents and message.
    fn create_commit(
        &self,
        tree: &str,
        parents: &[String],
        message: &str,
    ) -> Result<String, StoreError>;

    /// The tree oid a commit points at.
    fn commit_tree(&self, sha: &str) -> Result<String, StoreError>;

    /// Parents, message, and date of a commit.
    fn commit_info(&self, sha: &str) -> Result<CommitInfo, StoreError>;

    /// The message of a commit.
    fn commit_message(&self, sha: &str) -> Result<String, StoreError> {
        Ok(self.commit_info(sha)?.message)
    }
}
