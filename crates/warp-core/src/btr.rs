//! Boundary transition records.
//!
//! A boundary record binds an input state hash, an ordered patch
//! payload, the output state hash obtained by replaying that payload,
//! and a UTC timestamp under an HMAC-SHA256 tag keyed by a shared
//! secret. Anyone holding the secret can check that none of the four
//! components moved; the optional replay check re-runs the reducer as an
//! independent second line of defense (the tag already covers the output
//! hash).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::codec::{self, CodecError};
use crate::crypto::{self, CryptoError};
use crate::error::ErrorCode;
use crate::patch::SealedPatch;
use crate::projection;
use crate::reducer::{self, ReducerError};
use crate::state::WarpState;

/// Version of the record layout.
pub const BTR_VERSION: u32 = 1;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Boundary record failures.
#[derive(Debug, thiserror::Error)]
pub enum BtrError {
    /// A field is structurally unusable (bad hex, bad key material).
    #[error("malformed boundary record: {0}")]
    Malformed(String),

    /// The record's version is not supported.
    #[error("unsupported boundary record version {found}, want {BTR_VERSION}")]
    UnsupportedVersion {
        /// The version found in the record.
        found: u32,
    },

    /// The authentication tag does not verify.
    #[error("authentication tag mismatch")]
    TagMismatch,

    /// Replaying the payload did not reproduce the recorded hashes.
    #[error("replay mismatch: expected {expected}, got {found}")]
    ReplayMismatch {
        /// The hash the record claims.
        expected: String,
        /// The hash the replay produced.
        found: String,
    },

    /// Encoding the tag payload failed.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// Replaying the payload failed.
    #[error(transparent)]
    Reducer(#[from] ReducerError),
}

impl From<CryptoError> for BtrError {
    fn from(err: CryptoError) -> Self {
        Self::Malformed(err.to_string())
    }
}

impl BtrError {
    /// Stable machine-readable code.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Malformed(_) => ErrorCode::BtrMalformed,
            Self::UnsupportedVersion { .. } => ErrorCode::BtrUnsupportedVersion,
            Self::TagMismatch => ErrorCode::BtrTagMismatch,
            Self::ReplayMismatch { .. } => ErrorCode::BtrReplayMismatch,
            Self::Codec(err) => err.code(),
            Self::Reducer(err) => err.code(),
        }
    }
}

// ---------------------------------------------------------------------------
// Record
// ---------------------------------------------------------------------------

/// An authenticated `(h_in, payload, h_out, t)` tuple.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundaryRecord {
    /// Record layout version.
    pub version: u32,
    /// State hash before the payload.
    pub h_in: String,
    /// State hash after the payload.
    pub h_out: String,
    /// When the record was cut, UTC.
    pub t: DateTime<Utc>,
    /// The ordered patch payload, with storage shas.
    pub payload: Vec<SealedPatch>,
    /// HMAC-SHA256 tag over the other four components, lowercase hex.
    pub kappa: String,
}

/// The authenticated portion of a record, fields in canonical key order.
#[derive(Serialize)]
struct TagPayload<'a> {
    #[serde(rename = "P")]
    payload: &'a [SealedPatch],
    h_in: &'a str,
    h_out: &'a str,
    t: &'a DateTime<Utc>,
    version: u32,
}

fn tag_bytes(record: &BoundaryRecord) -> Result<Vec<u8>, BtrError> {
    Ok(codec::encode(&TagPayload {
        payload: &record.payload,
        h_in: &record.h_in,
        h_out: &record.h_out,
        t: &record.t,
        version: record.version,
    })?)
}

fn is_state_hash(value: &str) -> bool {
    value.len() == 64 && value.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase())
}

// ---------------------------------------------------------------------------
// Create / verify / replay
// ---------------------------------------------------------------------------

/// Cut a boundary record: hash `initial`, replay `payload` on a clone,
/// hash the result, and authenticate the tuple under `key`.
///
/// An empty payload yields `h_in == h_out`.
///
/// # Errors
///
/// Propagates replay and encoding failures; a rejected HMAC key
/// surfaces as [`BtrError::Malformed`].
pub fn create(
    initial: &WarpState,
    payload: Vec<SealedPatch>,
    key: &[u8],
    at: Option<DateTime<Utc>>,
) -> Result<BoundaryRecord, BtrError> {
    let h_in = projection::state_hash(initial)?;
    let final_state = reducer::reduce(&payload, Some(initial))?;
    let h_out = projection::state_hash(&final_state)?;
    let mut record = BoundaryRecord {
        version: BTR_VERSION,
        h_in,
        h_out,
        t: at.unwrap_or_else(Utc::now),
        payload,
        kappa: String::new(),
    };
    record.kappa = crypto::hmac_sha256_hex(key, &tag_bytes(&record)?)?;
    Ok(record)
}

/// Verify a record's structure and authentication tag under `key`.
///
/// # Errors
///
/// [`BtrError::Malformed`] for out-of-format hashes or tags,
/// [`BtrError::UnsupportedVersion`] for a foreign version, and
/// [`BtrError::TagMismatch`] when the tag does not verify.
pub fn verify(record: &BoundaryRecord, key: &[u8]) -> Result<(), BtrError> {
    if record.version != BTR_VERSION {
        return Err(BtrError::UnsupportedVersion {
            found: record.version,
        });
    }
    if !is_state_hash(&record.h_in) {
        return Err(BtrError::Malformed("h_in is not a 64-hex digest".into()));
    }
    if !is_state_hash(&record.h_out) {
        return Err(BtrError::Malformed("h_out is not a 64-hex digest".into()));
    }
    let tag = hex::decode(&record.kappa)
        .map_err(|_| BtrError::Malformed("kappa is not valid hex".into()))?;
    if crypto::hmac_sha256_verify(key, &tag_bytes(record)?, &tag)? {
        Ok(())
    } else {
        Err(BtrError::TagMismatch)
    }
}

/// Replay the record's payload on top of `initial`.
///
/// # Errors
///
/// Propagates replay failures.
pub fn replay(record: &BoundaryRecord, initial: &WarpState) -> Result<WarpState, BtrError> {
    Ok(reducer::reduce(&record.payload, Some(initial))?)
}

/// [`verify`], then independently re-run the reducer from `initial` and
/// compare both hashes. Defense in depth: the tag already covers
/// `h_out`, so this catches nothing the tag does not, unless the keyed
/// party itself misreplayed.
///
/// # Errors
///
/// Everything [`verify`] raises, plus [`BtrError::ReplayMismatch`] when
/// `initial` does not hash to `h_in` or the replay does not hash to
/// `h_out`.
pub fn verify_replay(
    record: &BoundaryRecord,
    initial: &WarpState,
    key: &[u8],
) -> Result<(), BtrError> {
    verify(record, key)?;
    let found_in = projection::state_hash(initial)?;
    if found_in != record.h_in {
        return Err(BtrError::ReplayMismatch {
            expected: record.h_in.clone(),
            found: found_in,
        });
    }
    let final_state = replay(record, initial)?;
    let found_out = projection::state_hash(&final_state)?;
    if found_out != record.h_out {
        return Err(BtrError::ReplayMismatch {
            expected: record.h_out.clone(),
            found: found_out,
        });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
