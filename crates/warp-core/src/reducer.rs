//! The deterministic reducer: folding patches into state.
//!
//! Within a patch, ops apply in declared order under synthetic event ids
//! `(lamport, writer, patchSha, opIndex)`. After the ops, the patch's
//! causal context merges into the observed frontier, and the patch's own
//! dot `(writer, lamport)` folds in as well.
//!
//! Across patches, any application order converges to the same visible
//! projection; callers that need identical intermediate hashes across
//! replicas must agree on a total order (typically lamport, then writer,
//! then patch id).
//!
//! # Receipts
//!
//! Receipt mode computes, before each op applies, whether it will take
//! effect (`Applied`), changes nothing that is not already there
//! (`Redundant`), or loses to state that is already newer (`Superseded`).
//! Unknown ops are skipped entirely and produce no receipt entry.
//!
//! The reducer mutates the state it is given; a failure partway through
//! leaves a partial fold. Callers needing transactional behavior clone
//! first.

use serde::Serialize;
use tracing::debug;

use crate::crdt::LwwRegister;
use crate::error::ErrorCode;
use crate::ident::{EventId, IdentError};
use crate::keys::{self, KeyError};
use crate::patch::{Op, Patch, SealedPatch};
use crate::state::WarpState;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Failures while folding a patch.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReducerError {
    /// An op carried a string with a reserved separator byte.
    #[error(transparent)]
    Key(#[from] KeyError),

    /// A synthetic event id or the patch's own dot failed validation.
    #[error(transparent)]
    Ident(#[from] IdentError),
}

impl ReducerError {
    /// Stable machine-readable code.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Key(err) => err.code(),
            Self::Ident(err) => err.code(),
        }
    }
}

// ---------------------------------------------------------------------------
// Receipts
// ---------------------------------------------------------------------------

/// What an op did to the state it was applied to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OpOutcome {
    /// The op changed the state.
    Applied,
    /// The op's effect was already present.
    Redundant,
    /// The state already holds something newer.
    Superseded,
}

/// The pre-application outcome of a single op.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OpReceipt {
    /// Position of the op inside its patch.
    pub op_index: u32,
    /// Op kind name.
    pub kind: &'static str,
    /// What the op did.
    pub outcome: OpOutcome,
    /// Human-oriented identifier of the op's target.
    pub target: String,
    /// Optional explanation, e.g. which write won a register.
    pub reason: Option<String>,
}

/// Per-patch receipt: one entry per known op, in op order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PatchReceipt {
    /// Storage sha of the patch.
    pub patch_sha: String,
    /// Authoring writer.
    pub writer: String,
    /// The patch's lamport value.
    pub lamport: u64,
    /// Op outcomes. Unknown ops produce no entry.
    pub ops: Vec<OpReceipt>,
}

fn edge_target(from: &str, to: &str, label: &str) -> String {
    format!("{from}->{to}[{label}]")
}

// ---------------------------------------------------------------------------
// Single-op application
// ---------------------------------------------------------------------------

/// Apply one op to `state` under `event`.
///
/// Unknown ops are ignored: older builds must be able to replay logs
/// written by newer ones.
///
/// # Errors
///
/// Returns [`ReducerError::Key`] when an op string contains a reserved
/// byte.
pub fn apply_op(state: &mut WarpState, op: &Op, event: &EventId) -> Result<(), ReducerError> {
    match op {
        Op::NodeAdd { node, dot } => {
            keys::check_user_string("node", node)?;
            state.node_alive.add(node.clone(), dot.clone());
        }
        Op::NodeRemove { observed, .. } => {
            state.node_alive.remove(observed.iter().cloned());
        }
        Op::EdgeAdd {
            from,
            to,
            label,
            dot,
        } => {
            let key = keys::edge_key(from, to, label)?;
            state.edge_alive.add(key.clone(), dot.clone());
            let newer = state
                .edge_birth
                .get(&key)
                .is_none_or(|birth| event > birth);
            if newer {
                state.edge_birth.insert(key, event.clone());
            }
        }
        Op::EdgeRemove { observed, .. } => {
            state.edge_alive.remove(observed.iter().cloned());
        }
        Op::PropSet { node, key, value } => {
            let prop_key = keys::node_prop_key(node, key)?;
            write_register(state, prop_key, event, value);
        }
        Op::EdgePropSet {
            from,
            to,
            label,
            key,
            value,
        } => {
            let prop_key = keys::edge_prop_key(from, to, label, key)?;
            write_register(state, prop_key, event, value);
        }
        Op::Unknown(_) => {}
    }
    Ok(())
}

fn write_register(state: &mut WarpState, key: String, event: &EventId, value: &serde_json::Value) {
    match state.props.entry(key) {
        std::collections::btree_map::Entry::Occupied(mut entry) => {
            if entry.get().loses_to(event) {
                entry.insert(LwwRegister::new(event.clone(), value.clone()));
            }
        }
        std::collections::btree_map::Entry::Vacant(entry) => {
            entry.insert(LwwRegister::new(event.clone(), value.clone()));
        }
    }
}

// ---------------------------------------------------------------------------
// Receipt computation
// ---------------------------------------------------------------------------

fn register_outcome(
    state: &WarpState,
    key: &str,
    event: &EventId,
) -> (OpOutcome, Option<String>) {
    match state.props.get(key) {
        None => (OpOutcome::Applied, None),
        Some(current) => match event.cmp(&current.event) {
            std::cmp::Ordering::Greater => (OpOutcome::Applied, None),
            std::cmp::Ordering::Equal => (OpOutcome::Redundant, None),
            std::cmp::Ordering::Less => (
                OpOutcome::Superseded,
                Some(format!(
                    "LWW: writer {} at lamport {} wins",
                    current.event.writer(),
                    current.event.lamport()
                )),
            ),
        },
    }
}

/// Compute the receipt entry for `op` against the state as it stands,
/// before application. Returns `None` for unknown ops.
fn receipt_for(
    state: &WarpState,
    op: &Op,
    event: &EventId,
    op_index: u32,
) -> Result<Option<OpReceipt>, ReducerError> {
    let entry = match op {
        Op::NodeAdd { node, dot } => {
            let outcome = if state.node_alive().has_dot(node, dot) {
                OpOutcome::Redundant
            } else {
                OpOutcome::Applied
            };
            Some((outcome, node.clone(), None))
        }
        Op::NodeRemove { node, observed } => {
            let outcome = if observed.iter().any(|dot| state.node_alive().dot_is_live(dot)) {
                OpOutcome::Applied
            } else {
                OpOutcome::Redundant
            };
            Some((outcome, node.clone(), None))
        }
        Op::EdgeAdd {
            from,
            to,
            label,
            dot,
        } => {
            let key = keys::edge_key(from, to, label)?;
            let outcome = if state.edge_alive().has_dot(&key, dot) {
                OpOutcome::Redundant
            } else {
                OpOutcome::Applied
            };
            Some((outcome, edge_target(from, to, label), None))
        }
        Op::EdgeRemove {
            from,
            to,
            label,
            observed,
        } => {
            let outcome = if observed.iter().any(|dot| state.edge_alive().dot_is_live(dot)) {
                OpOutcome::Applied
            } else {
                OpOutcome::Redundant
            };
            Some((outcome, edge_target(from, to, label), None))
        }
        Op::PropSet { node, key, .. } => {
            let prop_key = keys::node_prop_key(node, key)?;
            let (outcome, reason) = register_outcome(state, &prop_key, event);
            Some((outcome, format!("{node}.{key}"), reason))
        }
        Op::EdgePropSet {
            from,
            to,
            label,
            key,
            ..
        } => {
            let prop_key = keys::edge_prop_key(from, to, label, key)?;
            let (mut outcome, mut reason) = register_outcome(state, &prop_key, event);
            // A write that predates the edge's current incarnation will
            // never be visible, even if it wins the register.
            if outcome == OpOutcome::Applied {
                let edge = keys::edge_key(from, to, label)?;
                if let Some(birth) = state.edge_birth().get(&edge) {
                    if event < birth {
                        outcome = OpOutcome::Superseded;
                        reason = Some(format!(
                            "edge incarnation at lamport {} hides this write",
                            birth.lamport()
                        ));
                    }
                }
            }
            Some((
                outcome,
                format!("{}.{key}", edge_target(from, to, label)),
                reason,
            ))
        }
        Op::Unknown(_) => None,
    };
    Ok(entry.map(|(outcome, target, reason)| OpReceipt {
        op_index,
        kind: op.kind(),
        outcome,
        target,
        reason,
    }))
}

// ---------------------------------------------------------------------------
// Patch application
// ---------------------------------------------------------------------------

fn fold_patch(
    state: &mut WarpState,
    patch: &Patch,
    patch_sha: &str,
    mut receipts: Option<&mut Vec<OpReceipt>>,
) -> Result<(), ReducerError> {
    let mut index: u32 = 0;
    for op in &patch.ops {
        let event = EventId::new(patch.lamport, patch.writer.as_str(), patch_sha, index)?;
        if let Some(out) = receipts.as_deref_mut() {
            if let Some(entry) = receipt_for(state, op, &event, index)? {
                out.push(entry);
            }
        }
        apply_op(state, op, &event)?;
        index += 1;
    }
    state.observed_frontier.merge(&patch.context);
    state.observed_frontier.observe(&patch.dot()?);
    debug!(
        writer = patch.writer.as_str(),
        lamport = patch.lamport,
        ops = patch.ops.len(),
        "applied patch"
    );
    Ok(())
}

/// Fold one patch into `state`.
///
/// # Errors
///
/// Propagates key and identity validation failures; the state may be
/// partially updated on error.
pub fn apply_patch(state: &mut WarpState, patch: &Patch, patch_sha: &str) -> Result<(), ReducerError> {
    fold_patch(state, patch, patch_sha, None)
}

/// Fold one patch into `state`, returning the per-op receipt.
///
/// # Errors
///
/// Propagates key and identity validation failures; the state may be
/// partially updated on error.
pub fn apply_patch_with_receipt(
    state: &mut WarpState,
    patch: &Patch,
    patch_sha: &str,
) -> Result<PatchReceipt, ReducerError> {
    let mut ops = Vec::new();
    fold_patch(state, patch, patch_sha, Some(&mut ops))?;
    Ok(PatchReceipt {
        patch_sha: patch_sha.to_owned(),
        writer: patch.writer.clone(),
        lamport: patch.lamport,
        ops,
    })
}

/// Replay a patch sequence, in the supplied order, on top of `initial`
/// (or an empty state).
///
/// # Errors
///
/// Propagates the first application failure.
pub fn reduce(
    patches: &[SealedPatch],
    initial: Option<&WarpState>,
) -> Result<WarpState, ReducerError> {
    let mut state = initial.cloned().unwrap_or_default();
    for sealed in patches {
        apply_patch(&mut state, &sealed.patch, &sealed.sha)?;
    }
    Ok(state)
}

/// Like [`reduce`], also returning one receipt per patch.
///
/// # Errors
///
/// Propagates the first application failure.
pub fn reduce_with_receipts(
    patches: &[SealedPatch],
    initial: Option<&WarpState>,
) -> Result<(WarpState, Vec<PatchReceipt>), ReducerError> {
    let mut state = initial.cloned().unwrap_or_default();
    let mut receipts = Vec::with_capacity(patches.len());
    for sealed in patches {
        receipts.push(apply_patch_with_receipt(&mut state, &sealed.patch, &sealed.sha)?);
    }
    Ok((state, receipts))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ident::Dot;
    use crate::patch::PATCH_SCHEMA;
    use serde_json::json;

    fn dot(writer: &str, counter: u64) -> Dot {
        Dot::new(writer, counter).expect("valid dot")
    }

    fn patch(writer: &str, lamport: u64, ops: Vec<Op>) -> Patch {
        Patch {
            schema: PATCH_SCHEMA,
            writer: writer.into(),
            lamport,
            ops,
            context: crate::clock::VersionVector::new(),
        }
    }

    fn sealed(sha: &str, patch: Patch) -> SealedPatch {
        SealedPatch::new(sha.into(), patch)
    }

    // === Basic application ===

    #[test]
    fn node_add_then_remove() {
        let patches = vec![
            sealed(
                "s1",
                patch(
                    "a",
                    1,
                    vec![Op::NodeAdd {
                        node: "x".into(),
                        dot: dot("a", 1),
                    }],
                ),
            ),
            sealed(
                "s2",
                patch(
                    "a",
                    2,
                    vec![Op::NodeRemove {
                        node: "x".into(),
                        observed: vec![dot("a", 1)],
                    }],
                ),
            ),
        ];
        let state = reduce(&patches, None).expect("reduces");
        assert!(!state.has_node("x"));
    }

    #[test]
    fn frontier_folds_context_and_patch_dot() {
        let mut p = patch(
            "a",
            4,
            vec![Op::NodeAdd {
                node: "x".into(),
                dot: dot("a", 1),
            }],
        );
        p.context = [("b".to_owned(), 7)].into_iter().collect();
        let state = reduce(&[sealed("s", p)], None).expect("reduces");
        assert_eq!(state.observed_frontier().get("b"), 7);
        assert_eq!(state.observed_frontier().get("a"), 4);
    }

    #[test]
    fn edge_add_tracks_birth_event() {
        let patches = vec![
            sealed(
                "s1",
                patch(
                    "a",
                    1,
                    vec![
                        Op::NodeAdd {
                            node: "x".into(),
                            dot: dot("a", 1),
                        },
                        Op::NodeAdd {
                            node: "y".into(),
                            dot: dot("a", 2),
                        },
                        Op::EdgeAdd {
                            from: "x".into(),
                            to: "y".into(),
                            label: "rel".into(),
                            dot: dot("a", 3),
                        },
                    ],
                ),
            ),
            sealed(
                "s2",
                patch(
                    "a",
                    2,
                    vec![Op::EdgeAdd {
                        from: "x".into(),
                        to: "y".into(),
                        label: "rel".into(),
                        dot: dot("a", 4),
                    }],
                ),
            ),
        ];
        let state = reduce(&patches, None).expect("reduces");
        let key = crate::keys::edge_key("x", "y", "rel").expect("encodes");
        let birth = &state.edge_birth()[&key];
        assert_eq!(birth.lamport(), 2);
        assert_eq!(birth.patch_sha(), "s2");
    }

    #[test]
    fn unknown_op_is_skipped() {
        let raw = ciborium::Value::Map(vec![(
            ciborium::Value::Text("type".into()),
            ciborium::Value::Text("FutureOp".into()),
        )]);
        let p = patch("a", 1, vec![Op::Unknown(raw)]);
        let (state, receipts) =
            reduce_with_receipts(&[sealed("s", p)], None).expect("reduces");
        assert!(state.nodes().is_empty());
        assert!(receipts[0].ops.is_empty());
    }

    #[test]
    fn reserved_byte_in_op_is_an_error() {
        let p = patch(
            "a",
            1,
            vec![Op::NodeAdd {
                node: "bad\x00node".into(),
                dot: dot("a", 1),
            }],
        );
        let err = reduce(&[sealed("s", p)], None).unwrap_err();
        assert_eq!(err.code().code(), "E_INVALID_KEY_ENCODING");
    }

    // === Receipts ===

    #[test]
    fn duplicate_add_is_redundant() {
        let op = Op::NodeAdd {
            node: "x".into(),
            dot: dot("a", 1),
        };
        let patches = vec![
            sealed("s1", patch("a", 1, vec![op.clone()])),
            sealed("s2", patch("a", 2, vec![op])),
        ];
        let (_, receipts) = reduce_with_receipts(&patches, None).expect("reduces");
        assert_eq!(receipts[0].ops[0].outcome, OpOutcome::Applied);
        assert_eq!(receipts[1].ops[0].outcome, OpOutcome::Redundant);
    }

    #[test]
    fn remove_with_no_live_observed_is_redundant() {
        let patches = vec![
            sealed(
                "s1",
                patch(
                    "a",
                    1,
                    vec![Op::NodeRemove {
                        node: "ghost".into(),
                        observed: vec![],
                    }],
                ),
            ),
            sealed(
                "s2",
                patch(
                    "b",
                    1,
                    vec![Op::NodeRemove {
                        node: "ghost".into(),
                        observed: vec![dot("z", 9)],
                    }],
                ),
            ),
        ];
        let (_, receipts) = reduce_with_receipts(&patches, None).expect("reduces");
        assert_eq!(receipts[0].ops[0].outcome, OpOutcome::Redundant);
        // Observed dot held by no entry: still redundant.
        assert_eq!(receipts[1].ops[0].outcome, OpOutcome::Redundant);
    }

    #[test]
    fn losing_prop_set_is_superseded_with_reason() {
        let patches = vec![
            sealed(
                "s1",
                patch(
                    "b",
                    5,
                    vec![Op::PropSet {
                        node: "n".into(),
                        key: "k".into(),
                        value: json!("winner"),
                    }],
                ),
            ),
            sealed(
                "s2",
                patch(
                    "a",
                    1,
                    vec![Op::PropSet {
                        node: "n".into(),
                        key: "k".into(),
                        value: json!("late"),
                    }],
                ),
            ),
        ];
        let (state, receipts) = reduce_with_receipts(&patches, None).expect("reduces");
        let entry = &receipts[1].ops[0];
        assert_eq!(entry.outcome, OpOutcome::Superseded);
        assert_eq!(
            entry.reason.as_deref(),
            Some("LWW: writer b at lamport 5 wins")
        );
        assert_eq!(entry.target, "n.k");
        // The losing write did not land.
        let key = crate::keys::node_prop_key("n", "k").expect("encodes");
        assert_eq!(state.props()[&key].value, json!("winner"));
    }

    #[test]
    fn equal_event_id_prop_set_is_redundant() {
        let op = Op::PropSet {
            node: "n".into(),
            key: "k".into(),
            value: json!(1),
        };
        let p = patch("a", 1, vec![op.clone()]);
        let mut state = WarpState::new();
        apply_patch(&mut state, &p, "s").expect("applies");
        // Same patch replayed: identical event ids.
        let receipt = apply_patch_with_receipt(&mut state, &p, "s").expect("applies");
        assert_eq!(receipt.ops[0].outcome, OpOutcome::Redundant);
    }
}
