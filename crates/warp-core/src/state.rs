//! The replicated graph state and its join.
//!
//! A [`WarpState`] is the fold of a patch sequence: node and edge
//! liveness as add-wins OR-Sets, properties as last-writer-wins registers
//! keyed by reserved-separator keys, the observed frontier as a version
//! vector, and the birth event of each edge's current incarnation.
//!
//! States are created empty, mutated only by the reducer (or by
//! [`Merge`]), and deep-cloned before branching. The join is component
//! wise and is itself a semilattice: OR-Set join for liveness, per-key
//! register max for properties, pointwise max for the frontier, per-key
//! event-id max for edge births.

use std::collections::BTreeMap;

use crate::clock::VersionVector;
use crate::crdt::{LwwRegister, Merge, OrSet};
use crate::ident::EventId;
use crate::keys::{self, EdgeRef, KeyError, PropKey};

/// The five-component replicated graph state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WarpState {
    pub(crate) node_alive: OrSet<String>,
    pub(crate) edge_alive: OrSet<String>,
    pub(crate) props: BTreeMap<String, LwwRegister>,
    pub(crate) observed_frontier: VersionVector,
    pub(crate) edge_birth: BTreeMap<String, EventId>,
}

impl WarpState {
    /// Returns an empty state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Node liveness set.
    #[must_use]
    pub const fn node_alive(&self) -> &OrSet<String> {
        &self.node_alive
    }

    /// Edge liveness set, keyed by encoded edge keys.
    #[must_use]
    pub const fn edge_alive(&self) -> &OrSet<String> {
        &self.edge_alive
    }

    /// Property registers, keyed by encoded property keys.
    #[must_use]
    pub const fn props(&self) -> &BTreeMap<String, LwwRegister> {
        &self.props
    }

    /// The version vector folding every patch this state has seen.
    #[must_use]
    pub const fn observed_frontier(&self) -> &VersionVector {
        &self.observed_frontier
    }

    /// The greatest event id at which each edge was most recently added.
    #[must_use]
    pub const fn edge_birth(&self) -> &BTreeMap<String, EventId> {
        &self.edge_birth
    }

    /// Compact both liveness sets against a stable frontier: the
    /// greatest version vector every known replica has observed.
    ///
    /// Returns the number of dots evicted. The dissemination
    /// precondition is the caller's: compacting against a frontier that
    /// some replica has not reached permits resurrection.
    pub fn compact(&mut self, stable: &VersionVector) -> usize {
        self.node_alive.compact(stable) + self.edge_alive.compact(stable)
    }

    // -- visibility ---------------------------------------------------------

    /// `true` when `node` is alive.
    #[must_use]
    pub fn node_visible(&self, node: &str) -> bool {
        self.node_alive.contains(&node.to_owned())
    }

    /// `true` when the edge under `key` is alive and both endpoints are
    /// visible nodes.
    #[must_use]
    pub fn edge_visible_key(&self, key: &str) -> bool {
        if !self.edge_alive.contains(&key.to_owned()) {
            return false;
        }
        decode_visible_endpoints(self, key)
    }

    /// `true` when the edge `(from, to, label)` is visible.
    ///
    /// # Errors
    ///
    /// Returns a key error when an input contains a reserved byte.
    pub fn edge_visible(&self, from: &str, to: &str, label: &str) -> Result<bool, KeyError> {
        Ok(self.edge_visible_key(&keys::edge_key(from, to, label)?))
    }

    /// `true` when the property under the encoded `key` is visible.
    ///
    /// Node properties are visible while their node is. Edge properties
    /// are visible while their edge is, and only when the register was
    /// written at or after the edge's current incarnation; registers from
    /// an earlier incarnation stay hidden.
    #[must_use]
    pub fn prop_visible_key(&self, key: &str) -> bool {
        let Some(register) = self.props.get(key) else {
            return false;
        };
        match keys::decode_prop_key(key) {
            Ok(PropKey::Node { node, .. }) => self.node_visible(&node),
            Ok(PropKey::Edge { edge, .. }) => {
                let Ok(edge_key) = keys::edge_key(&edge.from, &edge.to, &edge.label) else {
                    return false;
                };
                if !self.edge_visible_key(&edge_key) {
                    return false;
                }
                self.edge_birth
                    .get(&edge_key)
                    .is_none_or(|birth| register.event >= *birth)
            }
            Err(_) => false,
        }
    }

    // -- queries ------------------------------------------------------------

    /// `true` when `node` is visible.
    #[must_use]
    pub fn has_node(&self, node: &str) -> bool {
        self.node_visible(node)
    }

    /// `true` when the edge is visible.
    ///
    /// # Errors
    ///
    /// Returns a key error when an input contains a reserved byte.
    pub fn has_edge(&self, from: &str, to: &str, label: &str) -> Result<bool, KeyError> {
        self.edge_visible(from, to, label)
    }

    /// The visible value of a node property.
    ///
    /// # Errors
    ///
    /// Returns a key error when an input contains a reserved byte.
    pub fn node_prop(
        &self,
        node: &str,
        prop: &str,
    ) -> Result<Option<&serde_json::Value>, KeyError> {
        let key = keys::node_prop_key(node, prop)?;
        if !self.prop_visible_key(&key) {
            return Ok(None);
        }
        Ok(self.props.get(&key).map(|register| &register.value))
    }

    /// The visible value of an edge property.
    ///
    /// # Errors
    ///
    /// Returns a key error when an input contains a reserved byte.
    pub fn edge_prop(
        &self,
        from: &str,
        to: &str,
        label: &str,
        prop: &str,
    ) -> Result<Option<&serde_json::Value>, KeyError> {
        let key = keys::edge_prop_key(from, to, label, prop)?;
        if !self.prop_visible_key(&key) {
            return Ok(None);
        }
        Ok(self.props.get(&key).map(|register| &register.value))
    }

    /// Visible nodes, sorted.
    #[must_use]
    pub fn nodes(&self) -> Vec<&str> {
        self.node_alive.elements().map(String::as_str).collect()
    }

    /// Visible edges, sorted by `(from, to, label)`.
    #[must_use]
    pub fn edges(&self) -> Vec<EdgeRef> {
        self.edge_alive
            .elements()
            .filter(|key| decode_visible_endpoints(self, key.as_str()))
            .filter_map(|key| keys::decode_edge_key(key).ok())
            .collect()
    }

    /// Visible edges matching a simple pattern: `None` fields match
    /// anything.
    #[must_use]
    pub fn match_edges(
        &self,
        from: Option<&str>,
        to: Option<&str>,
        label: Option<&str>,
    ) -> Vec<EdgeRef> {
        self.edges()
            .into_iter()
            .filter(|edge| {
                from.is_none_or(|want| edge.from == want)
                    && to.is_none_or(|want| edge.to == want)
                    && label.is_none_or(|want| edge.label == want)
            })
            .collect()
    }

    /// Visible edges leaving `node`.
    #[must_use]
    pub fn neighbors_out(&self, node: &str) -> Vec<EdgeRef> {
        self.match_edges(Some(node), None, None)
    }

    /// Visible edges arriving at `node`.
    #[must_use]
    pub fn neighbors_in(&self, node: &str) -> Vec<EdgeRef> {
        self.match_edges(None, Some(node), None)
    }
}

fn decode_visible_endpoints(state: &WarpState, key: &str) -> bool {
    keys::decode_edge_key(key)
        .map(|edge| state.node_visible(&edge.from) && state.node_visible(&edge.to))
        .unwrap_or(false)
}

// ---------------------------------------------------------------------------
// Join
// ---------------------------------------------------------------------------

impl Merge for WarpState {
    fn merge(&mut self, other: Self) {
        self.node_alive.merge(other.node_alive);
        self.edge_alive.merge(other.edge_alive);
        for (key, register) in other.props {
            match self.props.entry(key) {
                std::collections::btree_map::Entry::Occupied(mut entry) => {
                    entry.get_mut().merge(register);
                }
                std::collections::btree_map::Entry::Vacant(entry) => {
                    entry.insert(register);
                }
            }
        }
        self.observed_frontier.merge(&other.observed_frontier);
        for (key, event) in other.edge_birth {
            match self.edge_birth.entry(key) {
                std::collections::btree_map::Entry::Occupied(mut entry) => {
                    if event > *entry.get() {
                        entry.insert(event);
                    }
                }
                std::collections::btree_map::Entry::Vacant(entry) => {
                    entry.insert(event);
                }
            }
        }
    }
}

/// Pure component-wise join of two states.
#[must_use]
pub fn join_states(a: &WarpState, b: &WarpState) -> WarpState {
    let mut joined = a.clone();
    joined.merge(b.clone());
    joined
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
