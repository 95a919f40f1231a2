//! The pure trust evaluator.
//!
//! Takes a set of writer ids, a replayed [`TrustState`] (or none, when
//! no chain is configured), and a policy; produces an immutable
//! assessment. The evaluator performs no I/O and no mutation, so it can
//! run anywhere a state and a policy are at hand, and its output is
//! deterministic: writers are assessed in sorted order regardless of
//! input order.

use serde::{Deserialize, Serialize};

use super::state::TrustState;

/// The only writer policy this engine understands.
pub const WRITER_POLICY_ALL_TRUSTED: &str = "all_writers_must_be_trusted";

/// Schema version of the policy document.
pub const POLICY_SCHEMA_VERSION: u32 = 1;

/// Assessment-level code for a policy that failed validation.
pub const TRUST_POLICY_INVALID: &str = "TRUST_POLICY_INVALID";

// ---------------------------------------------------------------------------
// Policy
// ---------------------------------------------------------------------------

/// How a failing verdict is meant to be acted on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicyMode {
    /// Report failures without blocking.
    Warn,
    /// Failures block.
    Enforce,
}

/// The trust policy document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrustPolicy {
    /// Policy schema version.
    pub schema_version: u32,
    /// Enforcement mode.
    pub mode: PolicyMode,
    /// Writer policy selector.
    pub writer_policy: String,
}

impl TrustPolicy {
    /// A valid policy in the given mode.
    #[must_use]
    pub fn new(mode: PolicyMode) -> Self {
        Self {
            schema_version: POLICY_SCHEMA_VERSION,
            mode,
            writer_policy: WRITER_POLICY_ALL_TRUSTED.to_owned(),
        }
    }

    fn validate(&self) -> Result<(), String> {
        if self.schema_version != POLICY_SCHEMA_VERSION {
            return Err(format!(
                "policy schema version {}, want {POLICY_SCHEMA_VERSION}",
                self.schema_version
            ));
        }
        if self.writer_policy != WRITER_POLICY_ALL_TRUSTED {
            return Err(format!("unknown writer policy {:?}", self.writer_policy));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Assessment
// ---------------------------------------------------------------------------

/// Overall state of the trust configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TrustStatus {
    /// No trust chain is configured.
    NotConfigured,
    /// The chain replayed cleanly.
    Ok,
    /// The chain replayed with errors, or the policy is invalid.
    Error,
}

/// The evaluator's verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TrustVerdict {
    /// Every assessed writer is trusted.
    Pass,
    /// Something is wrong: state errors, policy errors, or an untrusted
    /// writer.
    Fail,
    /// No chain to evaluate against.
    NotConfigured,
}

/// Why a writer was assessed the way it was.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WriterReason {
    /// An active binding points to an active key.
    WriterBoundToActiveKey,
    /// No binding at all.
    WriterHasNoActiveBinding,
    /// Bindings exist, but every bound key is inactive.
    WriterBindingKeyRevoked,
}

/// One writer's assessment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WriterAssessment {
    /// The assessed writer.
    pub writer_id: String,
    /// Whether the writer is trusted.
    pub trusted: bool,
    /// Why.
    pub reason: WriterReason,
}

/// The complete, immutable assessment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrustAssessment {
    /// Trust configuration status.
    pub status: TrustStatus,
    /// The verdict.
    pub verdict: TrustVerdict,
    /// The mode the policy asked for, echoed for enforcement layers.
    pub mode: PolicyMode,
    /// Per-writer assessments, sorted by writer id.
    pub writers: Vec<WriterAssessment>,
    /// Untrusted writer ids, sorted.
    pub untrusted_writers: Vec<String>,
    /// Assessment-level issues (policy validation, chain replay errors).
    pub issues: Vec<String>,
}

fn assess_writer(state: &TrustState, writer_id: &str) -> WriterAssessment {
    if state.writer_has_active_binding(writer_id) {
        return WriterAssessment {
            writer_id: writer_id.to_owned(),
            trusted: true,
            reason: WriterReason::WriterBoundToActiveKey,
        };
    }
    let reason = if state.writer_bound_to_inactive_key_only(writer_id) {
        WriterReason::WriterBindingKeyRevoked
    } else {
        WriterReason::WriterHasNoActiveBinding
    };
    WriterAssessment {
        writer_id: writer_id.to_owned(),
        trusted: false,
        reason,
    }
}

/// Evaluate `writer_ids` against a replayed trust state under `policy`.
///
/// `state` of `None` means no chain is configured; the verdict is then
/// `not_configured` regardless of the writers.
#[must_use]
pub fn evaluate(
    writer_ids: &[String],
    state: Option<&TrustState>,
    policy: &TrustPolicy,
) -> TrustAssessment {
    let mode = policy.mode;

    if let Err(message) = policy.validate() {
        return TrustAssessment {
            status: TrustStatus::Error,
            verdict: TrustVerdict::Fail,
            mode,
            writers: Vec::new(),
            untrusted_writers: Vec::new(),
            issues: vec![format!("{TRUST_POLICY_INVALID}: {message}")],
        };
    }

    let mut sorted: Vec<&String> = writer_ids.iter().collect();
    sorted.sort();
    sorted.dedup();

    let Some(state) = state else {
        let writers: Vec<WriterAssessment> = sorted
            .iter()
            .map(|writer_id| WriterAssessment {
                writer_id: (*writer_id).clone(),
                trusted: false,
                reason: WriterReason::WriterHasNoActiveBinding,
            })
            .collect();
        let untrusted_writers = sorted.into_iter().cloned().collect();
        return TrustAssessment {
            status: TrustStatus::NotConfigured,
            verdict: TrustVerdict::NotConfigured,
            mode,
            writers,
            untrusted_writers,
            issues: Vec::new(),
        };
    };

    let status = if state.errors.is_empty() {
        TrustStatus::Ok
    } else {
        TrustStatus::Error
    };

    let writers: Vec<WriterAssessment> = sorted
        .iter()
        .map(|writer_id| assess_writer(state, writer_id.as_str()))
        .collect();
    let untrusted_writers: Vec<String> = writers
        .iter()
        .filter(|assessment| !assessment.trusted)
        .map(|assessment| assessment.writer_id.clone())
        .collect();

    let verdict = if status == TrustStatus::Error || !untrusted_writers.is_empty() {
        TrustVerdict::Fail
    } else {
        TrustVerdict::Pass
    };

    let issues = state
        .errors
        .iter()
        .map(|issue| format!("{}: {}", issue.code, issue.message))
        .collect();

    TrustAssessment {
        status,
        verdict,
        mode,
        writers,
        untrusted_writers,
        issues,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
