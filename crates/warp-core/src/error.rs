//! Stable machine-readable error codes for warp-core.
//!
//! Every fallible subsystem maps its module-local error enum onto one of
//! these codes via a `code()` method. The string forms are stable and part
//! of the public contract: callers and tooling match on them, so they are
//! never renamed or reused.
//!
//! # Code families
//!
//! | Prefix                | Subsystem                      |
//! |-----------------------|--------------------------------|
//! | `E_INVALID_*`         | Identity and key validation    |
//! | `E_UNSAFE_COMPACTION` | CRDT garbage collection        |
//! | `E_EMPTY_PATCH`, `E_CAS_CONFLICT` | Patch builder      |
//! | `E_STATE_*`           | Checkpoint serialization       |
//! | `E_TRUST_*`           | Trust record chain             |
//! | `E_BTR_*`             | Boundary transition records    |
//! | `E_STORE_*`, `E_CODEC` | Ports                         |
//!
//! `TRUST_POLICY_INVALID` is assessment-level: it is reported inside a
//! trust assessment, never raised as an error value.

use std::fmt;

/// Machine-readable error codes.
///
/// The `code()` string is the stable identity of each failure mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// A dot failed validation (empty writer or zero counter) or decoding.
    InvalidDot,
    /// A user-supplied string contained a reserved separator byte.
    InvalidKeyEncoding,
    /// An event id failed validation (empty writer or patch sha).
    InvalidEventId,
    /// Eviction was requested for a dot that is not tombstoned.
    UnsafeCompaction,
    /// A patch with no operations was committed.
    EmptyPatch,
    /// A ref moved underneath a compare-and-swap update.
    CasConflict,
    /// A checkpoint carried an unsupported version tag.
    StateUnsupportedVersion,
    /// A trust record failed structural validation.
    TrustRecordInvalid,
    /// A trust record's stored id does not match its recomputed id.
    TrustRecordIdMismatch,
    /// A trust record carries no signature material.
    TrustSignatureMissing,
    /// A trust record's signature failed Ed25519 verification.
    TrustSignatureInvalid,
    /// A trust record's prev link does not match the chain tip.
    TrustPrevMismatch,
    /// A trust record names a signature algorithm other than ed25519.
    TrustUnsupportedAlgorithm,
    /// A public key or key id is malformed.
    TrustInvalidKey,
    /// A boundary record is structurally malformed.
    BtrMalformed,
    /// A boundary record carries an unsupported version.
    BtrUnsupportedVersion,
    /// A boundary record's authentication tag does not verify.
    BtrTagMismatch,
    /// Replaying a boundary record's payload produced a different state.
    BtrReplayMismatch,
    /// A commit message is not a well-formed envelope.
    EnvelopeMalformed,
    /// A persistence object id was not found.
    StoreNotFound,
    /// The persistence backend failed.
    StoreBackend,
    /// Canonical encoding or decoding failed.
    Codec,
}

impl ErrorCode {
    /// Stable code string for machine parsing.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::InvalidDot => "E_INVALID_DOT",
            Self::InvalidKeyEncoding => "E_INVALID_KEY_ENCODING",
            Self::InvalidEventId => "E_INVALID_EVENTID",
            Self::UnsafeCompaction => "E_UNSAFE_COMPACTION",
            Self::EmptyPatch => "E_EMPTY_PATCH",
            Self::CasConflict => "E_CAS_CONFLICT",
            Self::StateUnsupportedVersion => "E_STATE_UNSUPPORTED_VERSION",
            Self::TrustRecordInvalid => "E_TRUST_RECORD_INVALID",
            Self::TrustRecordIdMismatch => "E_TRUST_RECORD_ID_MISMATCH",
            Self::TrustSignatureMissing => "E_TRUST_SIGNATURE_MISSING",
            Self::TrustSignatureInvalid => "E_TRUST_SIGNATURE_INVALID",
            Self::TrustPrevMismatch => "E_TRUST_PREV_MISMATCH",
            Self::TrustUnsupportedAlgorithm => "E_TRUST_UNSUPPORTED_ALGORITHM",
            Self::TrustInvalidKey => "E_TRUST_INVALID_KEY",
            Self::BtrMalformed => "E_BTR_MALFORMED",
            Self::BtrUnsupportedVersion => "E_BTR_UNSUPPORTED_VERSION",
            Self::BtrTagMismatch => "E_BTR_TAG_MISMATCH",
            Self::BtrReplayMismatch => "E_BTR_REPLAY_MISMATCH",
            Self::EnvelopeMalformed => "E_ENVELOPE_MALFORMED",
            Self::StoreNotFound => "E_STORE_NOT_FOUND",
            Self::StoreBackend => "E_STORE_BACKEND",
            Self::Codec => "E_CODEC",
        }
    }

    /// Short human-facing summary for logs and terminal output.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::InvalidDot => "Invalid dot",
            Self::InvalidKeyEncoding => "Reserved separator in user string",
            Self::InvalidEventId => "Invalid event id",
            Self::UnsafeCompaction => "Attempted eviction of a live dot",
            Self::EmptyPatch => "Patch has no operations",
            Self::CasConflict => "Ref moved during compare-and-swap",
            Self::StateUnsupportedVersion => "Unsupported checkpoint version",
            Self::TrustRecordInvalid => "Trust record failed validation",
            Self::TrustRecordIdMismatch => "Trust record id mismatch",
            Self::TrustSignatureMissing => "Trust record signature missing",
            Self::TrustSignatureInvalid => "Trust record signature invalid",
            Self::TrustPrevMismatch => "Trust record prev link mismatch",
            Self::TrustUnsupportedAlgorithm => "Unsupported signature algorithm",
            Self::TrustInvalidKey => "Malformed public key or key id",
            Self::BtrMalformed => "Boundary record malformed",
            Self::BtrUnsupportedVersion => "Unsupported boundary record version",
            Self::BtrTagMismatch => "Boundary record tag mismatch",
            Self::BtrReplayMismatch => "Boundary record replay mismatch",
            Self::EnvelopeMalformed => "Malformed commit envelope",
            Self::StoreNotFound => "Object not found",
            Self::StoreBackend => "Persistence backend failure",
            Self::Codec => "Canonical encoding failure",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code(), self.message())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
