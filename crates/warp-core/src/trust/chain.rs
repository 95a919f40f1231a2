//! Appending and walking the persisted record chain.
//!
//! Records live under one ref per graph. Each commit holds a tree with a
//! single `record.cbor` blob; commits parent-link in append order, so
//! the chain can be walked backwards from the ref tip and replayed
//! oldest-first. Appends are serialized through compare-and-swap on the
//! ref: a record whose `prev` does not name the current tip record is
//! rejected before anything is written.

use serde::Serialize;
use tracing::{debug, instrument};

use super::TrustError;
use super::record::{TrustRecord, compute_record_id, validate_record};
use crate::codec;
use crate::ports::Persistence;

/// The ref a graph's trust chain lives under.
#[must_use]
pub fn records_ref(graph: &str) -> String {
    format!("refs/warp/{graph}/trust/records")
}

/// Tree entry name of the record blob inside each chain commit.
pub const RECORD_BLOB_NAME: &str = "record.cbor";

// ---------------------------------------------------------------------------
// Chain store
// ---------------------------------------------------------------------------

/// Append and read trust records for one graph.
#[derive(Debug)]
pub struct TrustChainStore<'a, S: Persistence + ?Sized> {
    store: &'a S,
    graph: String,
}

impl<'a, S: Persistence + ?Sized> TrustChainStore<'a, S> {
    /// Bind a chain store to a graph and a persistence backend.
    pub fn new(store: &'a S, graph: impl Into<String>) -> Self {
        Self {
            store,
            graph: graph.into(),
        }
    }

    fn ref_name(&self) -> String {
        records_ref(&self.graph)
    }

    fn record_at(&self, commit_sha: &str) -> Result<TrustRecord, TrustError> {
        let tree = self.store.commit_tree(commit_sha)?;
        let entries = self.store.read_tree(&tree)?;
        let blob_oid = entries.get(RECORD_BLOB_NAME).ok_or_else(|| {
            TrustError::RecordInvalid(format!("chain commit {commit_sha} has no {RECORD_BLOB_NAME}"))
        })?;
        let bytes = self.store.read_blob(blob_oid)?;
        Ok(codec::decode(&bytes)?)
    }

    /// The record id at the chain tip, if a chain exists.
    ///
    /// # Errors
    ///
    /// Propagates port and decode failures.
    pub fn tip_record_id(&self) -> Result<Option<String>, TrustError> {
        match self.store.read_ref(&self.ref_name())? {
            None => Ok(None),
            Some(commit_sha) => Ok(Some(self.record_at(&commit_sha)?.record_id)),
        }
    }

    /// Validate `record` and append it to the chain.
    ///
    /// Returns the new chain commit sha. The record's `prev` must equal
    /// the current tip record id (`None` for genesis); the final ref
    /// update is compare-and-swap, so a concurrent appender loses and
    /// retries.
    ///
    /// # Errors
    ///
    /// Structural validation failures, [`TrustError::PrevMismatch`], and
    /// port failures (including the CAS conflict) propagate.
    #[instrument(skip(self, record), fields(graph = %self.graph, record_id = %record.record_id))]
    pub fn append(&self, record: &TrustRecord) -> Result<String, TrustError> {
        validate_record(record)?;

        let ref_name = self.ref_name();
        let tip_commit = self.store.read_ref(&ref_name)?;
        let tip_record_id = match &tip_commit {
            None => None,
            Some(sha) => Some(self.record_at(sha)?.record_id),
        };
        if record.prev != tip_record_id {
            return Err(TrustError::PrevMismatch {
                record_prev: record.prev.clone(),
                tip: tip_record_id,
            });
        }

        let bytes = codec::encode(record)?;
        let blob_oid = self.store.write_blob(&bytes)?;
        let tree_oid = self
            .store
            .write_tree(&[(RECORD_BLOB_NAME.to_owned(), blob_oid)])?;
        let parents: Vec<String> = tip_commit.iter().cloned().collect();
        let message = format!("trust-record: {}", record.record_id);
        let commit = self.store.create_commit(&tree_oid, &parents, &message)?;
        self.store
            .compare_and_swap_ref(&ref_name, &commit, tip_commit.as_deref())?;
        debug!(commit = commit.as_str(), "appended trust record");
        Ok(commit)
    }

    /// Read the whole chain, oldest first.
    ///
    /// # Errors
    ///
    /// Propagates port and decode failures.
    pub fn read_records(&self) -> Result<Vec<TrustRecord>, TrustError> {
        let mut records = Vec::new();
        let mut cursor = self.store.read_ref(&self.ref_name())?;
        while let Some(commit_sha) = cursor {
            records.push(self.record_at(&commit_sha)?);
            let info = self.store.commit_info(&commit_sha)?;
            cursor = info.parents.first().cloned();
        }
        records.reverse();
        Ok(records)
    }
}

// ---------------------------------------------------------------------------
// Chain verification
// ---------------------------------------------------------------------------

/// A problem found while verifying a chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChainIssue {
    /// Index of the offending record, oldest-first.
    pub index: usize,
    /// Stable code string of the issue.
    pub code: String,
    /// Human-oriented description.
    pub message: String,
}

/// The outcome of verifying a chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChainReport {
    /// `true` when no issue was found.
    pub valid: bool,
    /// Every issue found, oldest-first.
    pub errors: Vec<ChainIssue>,
}

/// Verify the structural integrity of an oldest-first record sequence:
/// genesis has no `prev`, prev-links form an unbroken chain, record ids
/// are unique, and every stored id matches its recomputed value.
#[must_use]
pub fn verify_chain(records: &[TrustRecord]) -> ChainReport {
    let mut errors = Vec::new();
    let mut seen_ids = std::collections::BTreeSet::new();
    let mut prev_id: Option<String> = None;

    for (index, record) in records.iter().enumerate() {
        match compute_record_id(record) {
            Ok(computed) if computed == record.record_id => {}
            Ok(computed) => errors.push(ChainIssue {
                index,
                code: crate::error::ErrorCode::TrustRecordIdMismatch.code().to_owned(),
                message: format!("stored id {} but computed {computed}", record.record_id),
            }),
            Err(err) => errors.push(ChainIssue {
                index,
                code: err.code().code().to_owned(),
                message: err.to_string(),
            }),
        }

        if !seen_ids.insert(record.record_id.clone()) {
            errors.push(ChainIssue {
                index,
                code: crate::error::ErrorCode::TrustRecordInvalid.code().to_owned(),
                message: format!("duplicate record id {}", record.record_id),
            });
        }

        if record.prev != prev_id {
            errors.push(ChainIssue {
                index,
                code: crate::error::ErrorCode::TrustPrevMismatch.code().to_owned(),
                message: if index == 0 {
                    "genesis record must have no prev".to_owned()
                } else {
                    format!("prev {:?} does not match {:?}", record.prev, prev_id)
                },
            });
        }
        prev_id = Some(record.record_id.clone());
    }

    ChainReport {
        valid: errors.is_empty(),
        errors,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
