//! Commit-message envelopes.
//!
//! Every commit written by the engine carries a strict trailer block:
//! one `key: value` line per field, keys sorted lexicographically, no
//! other content. Two kinds exist:
//!
//! - `kind: patch` (schema 2): `graph`, `lamport`, `patchOid`, `writer`.
//! - `kind: audit` (schema 1): `dataCommit` (40-hex), `graph`, `lamport`,
//!   `opsDigest` (64-hex), `writer`.
//!
//! Parsing is strict: unknown keys, missing keys, or out-of-range values
//! reject the message. The format exists so a tip commit alone is enough
//! to continue a writer's lamport sequence and to audit what a commit
//! binds.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use crate::error::ErrorCode;

/// Schema version of patch envelopes.
pub const PATCH_ENVELOPE_SCHEMA: u32 = 2;

/// Schema version of audit envelopes.
pub const AUDIT_ENVELOPE_SCHEMA: u32 = 1;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Envelope format failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EnvelopeError {
    /// The message is not a well-formed trailer block for its kind.
    #[error("malformed envelope: {0}")]
    Malformed(String),
}

impl EnvelopeError {
    /// Stable machine-readable code.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        ErrorCode::EnvelopeMalformed
    }
}

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// A parsed commit-message envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Envelope {
    /// Binds a patch blob into a writer's chain.
    Patch {
        /// Graph name.
        graph: String,
        /// Authoring writer id.
        writer: String,
        /// The writer's lamport value for the patch.
        lamport: u64,
        /// Oid of the `patch.cbor` blob.
        patch_oid: String,
    },
    /// Binds an ops digest to a data commit for audit trails.
    Audit {
        /// Graph name.
        graph: String,
        /// Authoring writer id.
        writer: String,
        /// The writer's lamport value.
        lamport: u64,
        /// The 40-hex data commit being audited.
        data_commit: String,
        /// The 64-hex digest of the applied ops.
        ops_digest: String,
    },
}

fn is_hex_of_len(value: &str, len: usize) -> bool {
    value.len() == len && value.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase())
}

impl Envelope {
    /// Render the envelope as its canonical trailer block.
    #[must_use]
    pub fn format(&self) -> String {
        let mut fields: BTreeMap<&str, String> = BTreeMap::new();
        match self {
            Self::Patch {
                graph,
                writer,
                lamport,
                patch_oid,
            } => {
                fields.insert("graph", graph.clone());
                fields.insert("kind", "patch".to_owned());
                fields.insert("lamport", lamport.to_string());
                fields.insert("patchOid", patch_oid.clone());
                fields.insert("schema", PATCH_ENVELOPE_SCHEMA.to_string());
                fields.insert("writer", writer.clone());
            }
            Self::Audit {
                graph,
                writer,
                lamport,
                data_commit,
                ops_digest,
            } => {
                fields.insert("dataCommit", data_commit.clone());
                fields.insert("graph", graph.clone());
                fields.insert("kind", "audit".to_owned());
                fields.insert("lamport", lamport.to_string());
                fields.insert("opsDigest", ops_digest.clone());
                fields.insert("schema", AUDIT_ENVELOPE_SCHEMA.to_string());
                fields.insert("writer", writer.clone());
            }
        }
        let mut out = String::new();
        for (key, value) in fields {
            let _ = writeln!(out, "{key}: {value}");
        }
        out
    }

    /// Parse a commit message back into an envelope.
    ///
    /// # Errors
    ///
    /// Returns [`EnvelopeError::Malformed`] on unknown kinds, missing or
    /// unknown keys, wrong schema numbers, or out-of-format digests.
    pub fn parse(message: &str) -> Result<Self, EnvelopeError> {
        let mut fields: BTreeMap<&str, &str> = BTreeMap::new();
        for line in message.lines() {
            if line.is_empty() {
                continue;
            }
            let (key, value) = line
                .split_once(": ")
                .ok_or_else(|| EnvelopeError::Malformed(format!("bad trailer line {line:?}")))?;
            if fields.insert(key, value).is_some() {
                return Err(EnvelopeError::Malformed(format!("duplicate key {key:?}")));
            }
        }
        let take = |fields: &mut BTreeMap<&str, &str>, key: &str| -> Result<String, EnvelopeError> {
            fields
                .remove(key)
                .map(str::to_owned)
                .ok_or_else(|| EnvelopeError::Malformed(format!("missing key {key:?}")))
        };

        let kind = take(&mut fields, "kind")?;
        let graph = take(&mut fields, "graph")?;
        let writer = take(&mut fields, "writer")?;
        let lamport: u64 = take(&mut fields, "lamport")?
            .parse()
            .map_err(|_| EnvelopeError::Malformed("lamport is not an integer".into()))?;
        let schema: u32 = take(&mut fields, "schema")?
            .parse()
            .map_err(|_| EnvelopeError::Malformed("schema is not an integer".into()))?;

        let envelope = match kind.as_str() {
            "patch" => {
                if schema != PATCH_ENVELOPE_SCHEMA {
                    return Err(EnvelopeError::Malformed(format!(
                        "patch envelope schema {schema}, want {PATCH_ENVELOPE_SCHEMA}"
                    )));
                }
                Self::Patch {
                    graph,
                    writer,
                    lamport,
                    patch_oid: take(&mut fields, "patchOid")?,
                }
            }
            "audit" => {
                if schema != AUDIT_ENVELOPE_SCHEMA {
                    return Err(EnvelopeError::Malformed(format!(
                        "audit envelope schema {schema}, want {AUDIT_ENVELOPE_SCHEMA}"
                    )));
                }
                let data_commit = take(&mut fields, "dataCommit")?;
                if !is_hex_of_len(&data_commit, 40) {
                    return Err(EnvelopeError::Malformed("dataCommit is not 40-hex".into()));
                }
                let ops_digest = take(&mut fields, "opsDigest")?;
                if !is_hex_of_len(&ops_digest, 64) {
                    return Err(EnvelopeError::Malformed("opsDigest is not 64-hex".into()));
                }
                Self::Audit {
                    graph,
                    writer,
                    lamport,
                    data_commit,
                    ops_digest,
                }
            }
            other => {
                return Err(EnvelopeError::Malformed(format!("unknown kind {other:?}")));
            }
        };

        if let Some((stray, _)) = fields.into_iter().next() {
            return Err(EnvelopeError::Malformed(format!("unknown key {stray:?}")));
        }
        Ok(envelope)
    }

    /// The lamport value carried by either kind.
    #[must_use]
    pub const fn lamport(&self) -> u64 {
        match self {
            Self::Patch { lamport, .. } | Self::Audit { lamport, .. } => *lamport,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
