//! The signed-record trust chain.
//!
//! Writer authorization lives in a parallel, append-only log of signed
//! records: key registrations, key revocations, and writer-to-key
//! bindings. Records are content-addressed over a domain-separated
//! canonical JSON payload and chained through `prev` links; the chain is
//! replayed into a [`TrustState`], and a pure evaluator turns that state
//! plus a policy into a verdict over a set of writer ids.
//!
//! Tampering is detectable (ids and signatures stop verifying); fork
//! resolution is out of scope. State building accumulates per-record
//! problems instead of aborting, so a broken chain can still be audited
//! offline.

pub mod chain;
pub mod evaluate;
pub mod record;
pub mod state;

pub use chain::{ChainIssue, ChainReport, TrustChainStore, records_ref, verify_chain};
pub use evaluate::{
    PolicyMode, TrustAssessment, TrustPolicy, TrustStatus, TrustVerdict, WriterAssessment,
    WriterReason, evaluate,
};
pub use record::{
    BindingRevocationReason, KeyRevocationReason, RecordType, SignatureEnvelope, Subject,
    TrustRecord, compute_record_id, sign_record, validate_record, verify_record_signature,
};
pub use state::{TrustState, TrustStateIssue, audit_signatures, binding_key, build_trust_state};

use crate::codec::CodecError;
use crate::crypto::CryptoError;
use crate::error::ErrorCode;
use crate::ports::StoreError;

/// Trust subsystem failures.
#[derive(Debug, thiserror::Error)]
pub enum TrustError {
    /// A record failed structural validation.
    #[error("invalid trust record: {0}")]
    RecordInvalid(String),

    /// A record's stored id does not match its recomputed id.
    #[error("record id mismatch: stored {stored}, computed {computed}")]
    RecordIdMismatch {
        /// The id carried by the record.
        stored: String,
        /// The id recomputed from the record body.
        computed: String,
    },

    /// A record carries no signature material.
    #[error("record signature missing")]
    SignatureMissing,

    /// A record names a signature algorithm other than ed25519.
    #[error("unsupported signature algorithm {alg:?}")]
    UnsupportedAlgorithm {
        /// The algorithm named by the record.
        alg: String,
    },

    /// A public key or key id is malformed.
    #[error("invalid key: {0}")]
    InvalidKey(String),

    /// A record's prev link does not match the chain tip.
    #[error("prev mismatch: record says {record_prev:?}, chain tip is {tip:?}")]
    PrevMismatch {
        /// The prev link carried by the record.
        record_prev: Option<String>,
        /// The chain's current tip record id.
        tip: Option<String>,
    },

    /// The persistence port failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A record body could not be encoded or decoded.
    #[error(transparent)]
    Codec(#[from] CodecError),
}

impl From<CryptoError> for TrustError {
    fn from(err: CryptoError) -> Self {
        Self::InvalidKey(err.to_string())
    }
}

impl TrustError {
    /// Stable machine-readable code.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::RecordInvalid(_) => ErrorCode::TrustRecordInvalid,
            Self::RecordIdMismatch { .. } => ErrorCode::TrustRecordIdMismatch,
            Self::SignatureMissing => ErrorCode::TrustSignatureMissing,
            Self::UnsupportedAlgorithm { .. } => ErrorCode::TrustUnsupportedAlgorithm,
            Self::InvalidKey(_) => ErrorCode::TrustInvalidKey,
            Self::PrevMismatch { .. } => ErrorCode::TrustPrevMismatch,
            Self::Store(err) => err.code(),
            Self::Codec(err) => err.code(),
        }
    }
}
