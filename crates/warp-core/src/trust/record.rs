//! Trust records: envelope, subjects, canonical hashing, signatures.
//!
//! A record's identity is the SHA-256 of a domain-separated canonical
//! JSON payload: the record with `recordId` and `signature` stripped.
//! The signature covers a second domain-separated payload with only
//! `signature` stripped, so the signature also binds the id. Canonical
//! JSON is a hashing input only; storage bodies are CBOR mirroring the
//! same field names.

use chrono::{DateTime, Utc};
use ed25519_dalek::SigningKey;
use serde::{Deserialize, Serialize};

use super::TrustError;
use crate::canon;
use crate::crypto;

/// Schema version of the record envelope.
pub const RECORD_SCHEMA_VERSION: u32 = 1;

/// Domain prefix for record-id hashing.
pub const RECORD_ID_DOMAIN: &[u8] = b"git-warp:trust-record:v1\x00";

/// Domain prefix for signature payloads.
pub const RECORD_SIGN_DOMAIN: &[u8] = b"git-warp:trust-sign:v1\x00";

/// The only signature algorithm records may carry.
pub const SIGNATURE_ALG: &str = "ed25519";

// ---------------------------------------------------------------------------
// Record model
// ---------------------------------------------------------------------------

/// The four record kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecordType {
    /// Register a public key.
    KeyAdd,
    /// Monotonically retire a key.
    KeyRevoke,
    /// Authorize a writer under a key.
    WriterBindAdd,
    /// Revoke a specific writer-to-key binding.
    WriterBindRevoke,
}

/// Why a key was revoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum KeyRevocationReason {
    /// The key material is suspected compromised.
    KeyCompromise,
    /// Routine rollover to a successor key.
    KeyRollover,
    /// An operator asked for the revocation.
    OperatorRequest,
}

/// Why a binding was revoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BindingRevocationReason {
    /// The writer lost access.
    AccessRemoved,
    /// The binding moved to another key.
    Rotation,
    /// The underlying key was revoked.
    KeyRevoked,
}

/// The per-kind subject of a record.
///
/// Wire form is a bare map; the enclosing record's `recordType` says
/// which shape to expect, and validation cross-checks the two.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Subject {
    /// `WRITER_BIND_REVOKE`: revoke a writer-to-key binding.
    BindingRevocation {
        /// The bound writer.
        #[serde(rename = "writerId")]
        writer_id: String,
        /// The bound key.
        #[serde(rename = "keyId")]
        key_id: String,
        /// Why the binding ends.
        #[serde(rename = "reasonCode")]
        reason_code: BindingRevocationReason,
    },
    /// `KEY_ADD`: register a public key.
    KeyRegistration {
        /// Derived key id of `public_key`.
        #[serde(rename = "keyId")]
        key_id: String,
        /// Base64 raw 32-byte public key.
        #[serde(rename = "publicKey")]
        public_key: String,
    },
    /// `KEY_REVOKE`: retire a key.
    KeyRevocation {
        /// The retiring key.
        #[serde(rename = "keyId")]
        key_id: String,
        /// Why the key is retired.
        #[serde(rename = "reasonCode")]
        reason_code: KeyRevocationReason,
    },
    /// `WRITER_BIND_ADD`: authorize a writer under a key.
    Binding {
        /// The writer being authorized.
        #[serde(rename = "writerId")]
        writer_id: String,
        /// The authorizing key.
        #[serde(rename = "keyId")]
        key_id: String,
    },
}

impl Subject {
    /// Build a `KEY_ADD` subject, deriving the key id from the key.
    ///
    /// # Errors
    ///
    /// Returns [`TrustError::InvalidKey`] when the key does not decode.
    pub fn key_registration(public_key: &str) -> Result<Self, TrustError> {
        Ok(Self::KeyRegistration {
            key_id: crypto::key_id_of_public_key(public_key)?,
            public_key: public_key.to_owned(),
        })
    }

    const fn matches(&self, record_type: RecordType) -> bool {
        matches!(
            (self, record_type),
            (Self::KeyRegistration { .. }, RecordType::KeyAdd)
                | (Self::KeyRevocation { .. }, RecordType::KeyRevoke)
                | (Self::Binding { .. }, RecordType::WriterBindAdd)
                | (Self::BindingRevocation { .. }, RecordType::WriterBindRevoke)
        )
    }
}

/// Signature material attached to a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureEnvelope {
    /// Signature algorithm; always `"ed25519"`.
    pub alg: String,
    /// Base64 signature bytes.
    pub sig: String,
}

/// A signed entry in the trust chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrustRecord {
    /// Envelope schema version.
    pub schema_version: u32,
    /// Record kind.
    pub record_type: RecordType,
    /// Content-derived record id.
    pub record_id: String,
    /// Key id of the issuing signer.
    pub issuer_key_id: String,
    /// Issue time, UTC.
    pub issued_at: DateTime<Utc>,
    /// Previous record's id; `None` only for genesis.
    pub prev: Option<String>,
    /// Per-kind subject.
    pub subject: Subject,
    /// Free-form annotations.
    #[serde(default)]
    pub meta: serde_json::Map<String, serde_json::Value>,
    /// Signature material.
    pub signature: SignatureEnvelope,
}

impl TrustRecord {
    /// Assemble an unsigned draft; `record_id` and `signature` are
    /// filled in by [`sign_record`].
    #[must_use]
    pub fn draft(
        record_type: RecordType,
        issuer_key_id: impl Into<String>,
        issued_at: DateTime<Utc>,
        prev: Option<String>,
        subject: Subject,
    ) -> Self {
        Self {
            schema_version: RECORD_SCHEMA_VERSION,
            record_type,
            record_id: String::new(),
            issuer_key_id: issuer_key_id.into(),
            issued_at,
            prev,
            subject,
            meta: serde_json::Map::new(),
            signature: SignatureEnvelope {
                alg: SIGNATURE_ALG.to_owned(),
                sig: String::new(),
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Canonical payloads
// ---------------------------------------------------------------------------

fn record_as_json(record: &TrustRecord) -> Result<serde_json::Value, TrustError> {
    serde_json::to_value(record)
        .map_err(|err| TrustError::RecordInvalid(format!("record is not JSON-mappable: {err}")))
}

/// The domain-prefixed payload whose SHA-256 is the record id.
///
/// # Errors
///
/// Returns [`TrustError::RecordInvalid`] when the record cannot be
/// rendered as JSON.
pub fn record_id_payload(record: &TrustRecord) -> Result<Vec<u8>, TrustError> {
    let mut value = record_as_json(record)?;
    if let Some(map) = value.as_object_mut() {
        map.remove("recordId");
        map.remove("signature");
    }
    let mut payload = RECORD_ID_DOMAIN.to_vec();
    payload.extend_from_slice(&canon::to_canonical_json_bytes(&value));
    Ok(payload)
}

/// Recompute a record's id from its body.
///
/// # Errors
///
/// Returns [`TrustError::RecordInvalid`] when the record cannot be
/// rendered as JSON.
pub fn compute_record_id(record: &TrustRecord) -> Result<String, TrustError> {
    Ok(crypto::sha256_hex(&record_id_payload(record)?))
}

/// The domain-prefixed payload the signature covers (`recordId`
/// retained, `signature` stripped).
///
/// # Errors
///
/// Returns [`TrustError::RecordInvalid`] when the record cannot be
/// rendered as JSON.
pub fn signing_payload(record: &TrustRecord) -> Result<Vec<u8>, TrustError> {
    let mut value = record_as_json(record)?;
    if let Some(map) = value.as_object_mut() {
        map.remove("signature");
    }
    let mut payload = RECORD_SIGN_DOMAIN.to_vec();
    payload.extend_from_slice(&canon::to_canonical_json_bytes(&value));
    Ok(payload)
}

// ---------------------------------------------------------------------------
// Signing and verification
// ---------------------------------------------------------------------------

/// Complete a draft: compute the record id, then sign.
///
/// # Errors
///
/// Returns [`TrustError::RecordInvalid`] when the record cannot be
/// rendered as JSON.
pub fn sign_record(record: &mut TrustRecord, key: &SigningKey) -> Result<(), TrustError> {
    record.record_id = compute_record_id(record)?;
    let payload = signing_payload(record)?;
    record.signature = SignatureEnvelope {
        alg: SIGNATURE_ALG.to_owned(),
        sig: crypto::sign_ed25519(key, &payload),
    };
    Ok(())
}

/// Verify a record's signature against a base64 public key.
///
/// # Errors
///
/// Returns [`TrustError::InvalidKey`] on malformed key material, or
/// [`TrustError::RecordInvalid`] when the record cannot be rendered as
/// JSON.
pub fn verify_record_signature(
    record: &TrustRecord,
    public_key: &str,
) -> Result<bool, TrustError> {
    let payload = signing_payload(record)?;
    Ok(crypto::verify_ed25519(
        public_key,
        &record.signature.sig,
        &payload,
    )?)
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn check_key_id_shape(key_id: &str) -> Result<(), TrustError> {
    let digest = key_id
        .strip_prefix(crypto::KEY_ID_PREFIX)
        .ok_or_else(|| TrustError::InvalidKey(format!("key id {key_id:?} lacks prefix")))?;
    if digest.len() != 64 || !digest.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase())
    {
        return Err(TrustError::InvalidKey(format!(
            "key id {key_id:?} digest is not 64-hex"
        )));
    }
    Ok(())
}

/// Structurally validate a record: schema, subject shape, signature
/// presence and algorithm, key id formats, and record id integrity.
///
/// Cryptographic signature verification needs a resolved key set and is
/// done separately (see [`super::state::audit_signatures`]).
///
/// # Errors
///
/// Returns the specific [`TrustError`] for the first failed check.
pub fn validate_record(record: &TrustRecord) -> Result<(), TrustError> {
    if record.schema_version != RECORD_SCHEMA_VERSION {
        return Err(TrustError::RecordInvalid(format!(
            "schema version {}, want {RECORD_SCHEMA_VERSION}",
            record.schema_version
        )));
    }
    if !record.subject.matches(record.record_type) {
        return Err(TrustError::RecordInvalid(
            "subject shape does not match record type".into(),
        ));
    }
    if record.signature.alg != SIGNATURE_ALG {
        return Err(TrustError::UnsupportedAlgorithm {
            alg: record.signature.alg.clone(),
        });
    }
    if record.signature.sig.is_empty() {
        return Err(TrustError::SignatureMissing);
    }
    check_key_id_shape(&record.issuer_key_id)?;
    match &record.subject {
        Subject::KeyRegistration { key_id, public_key } => {
            let derived = crypto::key_id_of_public_key(public_key)?;
            if *key_id != derived {
                return Err(TrustError::InvalidKey(format!(
                    "subject key id {key_id:?} does not match the public key"
                )));
            }
        }
        Subject::KeyRevocation { key_id, .. } | Subject::Binding { key_id, .. } => {
            check_key_id_shape(key_id)?;
        }
        Subject::BindingRevocation { key_id, .. } => {
            check_key_id_shape(key_id)?;
        }
    }
    let computed = compute_record_id(record)?;
    if record.record_id != computed {
        return Err(TrustError::RecordIdMismatch {
            stored: record.record_id.clone(),
            computed,
        });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
