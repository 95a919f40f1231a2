//! Replaying a record chain into a trust state.
//!
//! The walk goes oldest-first and never aborts: rule violations are
//! appended to the state's issue list and the walk continues, so a
//! damaged chain can still be inspected end to end. Revocation is
//! monotonic: once a key is revoked it can never be re-registered.

use serde::Serialize;
use std::collections::BTreeMap;
use tracing::warn;

use super::record::{
    BindingRevocationReason, KeyRevocationReason, RecordType, Subject, TrustRecord,
};
use super::record::verify_record_signature;
use crate::error::ErrorCode;

/// The binding-map key for a `(writer, key)` pair.
#[must_use]
pub fn binding_key(writer_id: &str, key_id: &str) -> String {
    format!("{writer_id}\x00{key_id}")
}

/// A problem found while replaying the chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrustStateIssue {
    /// The record that triggered the issue.
    pub record_id: String,
    /// Stable code string of the issue.
    pub code: String,
    /// Human-oriented description.
    pub message: String,
}

/// A writer-to-key binding as replayed from the chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Binding {
    /// The bound writer.
    pub writer_id: String,
    /// The bound key.
    pub key_id: String,
}

/// The replayed authorization state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TrustState {
    /// Registered, unrevoked keys: key id to base64 public key.
    pub active_keys: BTreeMap<String, String>,
    /// Revoked keys and why.
    pub revoked_keys: BTreeMap<String, KeyRevocationReason>,
    /// Active bindings, keyed by [`binding_key`].
    pub bindings: BTreeMap<String, Binding>,
    /// Revoked bindings and why, keyed by [`binding_key`].
    pub revoked_bindings: BTreeMap<String, BindingRevocationReason>,
    /// Problems found during the walk, in chain order.
    pub errors: Vec<TrustStateIssue>,
}

impl TrustState {
    fn issue(&mut self, record: &TrustRecord, code: ErrorCode, message: String) {
        warn!(
            record_id = record.record_id.as_str(),
            %code,
            detail = message.as_str(),
            "trust chain issue"
        );
        self.errors.push(TrustStateIssue {
            record_id: record.record_id.clone(),
            code: code.code().to_owned(),
            message,
        });
    }

    /// `true` when `writer_id` holds at least one active binding to an
    /// active key.
    #[must_use]
    pub fn writer_has_active_binding(&self, writer_id: &str) -> bool {
        self.bindings
            .values()
            .any(|binding| binding.writer_id == writer_id && self.active_keys.contains_key(&binding.key_id))
    }

    /// `true` when `writer_id` holds a binding, but only to inactive keys.
    #[must_use]
    pub fn writer_bound_to_inactive_key_only(&self, writer_id: &str) -> bool {
        let mut any = false;
        for binding in self.bindings.values() {
            if binding.writer_id == writer_id {
                if self.active_keys.contains_key(&binding.key_id) {
                    return false;
                }
                any = true;
            }
        }
        any
    }
}

/// Replay `records` (oldest first) into a [`TrustState`].
#[must_use]
pub fn build_trust_state(records: &[TrustRecord]) -> TrustState {
    let mut state = TrustState::default();
    for record in records {
        match (&record.record_type, &record.subject) {
            (RecordType::KeyAdd, Subject::KeyRegistration { key_id, public_key }) => {
                if state.revoked_keys.contains_key(key_id) {
                    state.issue(
                        record,
                        ErrorCode::TrustRecordInvalid,
                        format!("key {key_id} was revoked and cannot be re-registered"),
                    );
                } else {
                    state.active_keys.insert(key_id.clone(), public_key.clone());
                }
            }
            (RecordType::KeyRevoke, Subject::KeyRevocation { key_id, reason_code }) => {
                if state.revoked_keys.contains_key(key_id) {
                    state.issue(
                        record,
                        ErrorCode::TrustRecordInvalid,
                        format!("key {key_id} is already revoked"),
                    );
                } else if state.active_keys.remove(key_id).is_none() {
                    state.issue(
                        record,
                        ErrorCode::TrustRecordInvalid,
                        format!("key {key_id} is unknown"),
                    );
                } else {
                    state.revoked_keys.insert(key_id.clone(), *reason_code);
                }
            }
            (RecordType::WriterBindAdd, Subject::Binding { writer_id, key_id }) => {
                if state.active_keys.contains_key(key_id) {
                    let pair = binding_key(writer_id, key_id);
                    state.revoked_bindings.remove(&pair);
                    state.bindings.insert(
                        pair,
                        Binding {
                            writer_id: writer_id.clone(),
                            key_id: key_id.clone(),
                        },
                    );
                } else {
                    state.issue(
                        record,
                        ErrorCode::TrustRecordInvalid,
                        format!("binding references inactive key {key_id}"),
                    );
                }
            }
            (
                RecordType::WriterBindRevoke,
                Subject::BindingRevocation {
                    writer_id,
                    key_id,
                    reason_code,
                },
            ) => {
                let pair = binding_key(writer_id, key_id);
                if state.bindings.remove(&pair).is_some() {
                    state.revoked_bindings.insert(pair, *reason_code);
                } else {
                    state.issue(
                        record,
                        ErrorCode::TrustRecordInvalid,
                        format!("no active binding for writer {writer_id} under {key_id}"),
                    );
                }
            }
            _ => {
                state.issue(
                    record,
                    ErrorCode::TrustRecordInvalid,
                    "subject shape does not match record type".into(),
                );
            }
        }
    }
    state
}

/// Walk the chain verifying every record's signature against its issuer
/// key as registered at that point in the chain.
///
/// Key registrations become resolvable from their own record onward, so
/// a self-signed genesis key verifies. Failures are reported, never
/// thrown.
#[must_use]
pub fn audit_signatures(records: &[TrustRecord]) -> Vec<TrustStateIssue> {
    let mut known_keys: BTreeMap<String, String> = BTreeMap::new();
    let mut issues = Vec::new();
    for record in records {
        if let Subject::KeyRegistration { key_id, public_key } = &record.subject {
            known_keys
                .entry(key_id.clone())
                .or_insert_with(|| public_key.clone());
        }
        match known_keys.get(&record.issuer_key_id) {
            None => issues.push(TrustStateIssue {
                record_id: record.record_id.clone(),
                code: ErrorCode::TrustInvalidKey.code().to_owned(),
                message: format!("issuer key {} is unknown at this point", record.issuer_key_id),
            }),
            Some(public_key) => match verify_record_signature(record, public_key) {
                Ok(true) => {}
                Ok(false) => issues.push(TrustStateIssue {
                    record_id: record.record_id.clone(),
                    code: ErrorCode::TrustSignatureInvalid.code().to_owned(),
                    message: "signature does not verify under the issuer key".into(),
                }),
                Err(err) => issues.push(TrustStateIssue {
                    record_id: record.record_id.clone(),
                    code: err.code().code().to_owned(),
                    message: err.to_string(),
                }),
            },
        }
    }
    issues
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
