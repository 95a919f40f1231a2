//! OR-Set (Observed-Remove Set) with add-wins semantics.
//!
//! Each add is tagged by a [`Dot`], and removes tombstone only the dots the
//! remover had observed. A concurrent add introduces a dot the remove never
//! saw, so it survives the merge: add wins.
//!
//! # Global tombstones
//!
//! Tombstones are dot-granular and stored in a single set shared by all
//! elements of the enclosing set. The element an add belonged to is
//! irrelevant once the dot is dead; an element may be independently
//! re-added under a fresh dot, and compaction works off one central set.
//!
//! # Compaction
//!
//! Tombstones accumulate forever unless compacted. [`OrSet::compact`] takes
//! a *stable frontier*: a version vector every replica is known to have
//! observed. A tombstoned dot dominated by that frontier can never be
//! re-introduced (every replica has seen both the add and the remove), so
//! it is dropped from the tombstone set and stripped from entries. Evicting
//! a live dot would let a later join resurrect the element, which is why
//! the lower-level [`OrSet::evict`] refuses non-tombstoned dots.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use super::merge::Merge;
use crate::clock::VersionVector;
use crate::error::ErrorCode;
use crate::ident::Dot;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// CRDT invariant violations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CrdtError {
    /// Eviction was requested for a dot that is still live.
    #[error("unsafe compaction: dot {dot} is not tombstoned")]
    UnsafeCompaction {
        /// The offending dot.
        dot: Dot,
    },
}

impl CrdtError {
    /// Stable machine-readable code.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        ErrorCode::UnsafeCompaction
    }
}

// ---------------------------------------------------------------------------
// OrSet
// ---------------------------------------------------------------------------

/// An add-wins observed-remove set over elements of type `T`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrSet<T: Ord> {
    entries: BTreeMap<T, BTreeSet<Dot>>,
    tombstones: BTreeSet<Dot>,
}

impl<T: Ord> Default for OrSet<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Ord> OrSet<T> {
    /// Returns an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
            tombstones: BTreeSet::new(),
        }
    }

    /// Tag `element` with `dot`. Idempotent.
    pub fn add(&mut self, element: T, dot: Dot) {
        self.entries.entry(element).or_default().insert(dot);
    }

    /// Tombstone every dot in `observed`.
    ///
    /// The caller supplies the dots it has observed for whatever it is
    /// removing; this set does not enumerate dots on the remover's behalf.
    /// Tombstoning a dot this replica has never seen is fine: the add may
    /// arrive later through a join and will be dead on arrival.
    pub fn remove<I: IntoIterator<Item = Dot>>(&mut self, observed: I) {
        self.tombstones.extend(observed);
    }

    /// `true` when `element` has at least one live dot.
    #[must_use]
    pub fn contains(&self, element: &T) -> bool {
        self.entries
            .get(element)
            .is_some_and(|dots| dots.iter().any(|dot| !self.tombstones.contains(dot)))
    }

    /// Live elements, in element order.
    pub fn elements(&self) -> impl Iterator<Item = &T> {
        self.entries
            .iter()
            .filter(|(_, dots)| dots.iter().any(|dot| !self.tombstones.contains(dot)))
            .map(|(element, _)| element)
    }

    /// The live dots of `element`, in dot order.
    #[must_use]
    pub fn dots(&self, element: &T) -> Vec<&Dot> {
        self.entries
            .get(element)
            .map(|dots| {
                dots.iter()
                    .filter(|dot| !self.tombstones.contains(*dot))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// `true` when `element` already carries `dot`, tombstoned or not.
    #[must_use]
    pub fn has_dot(&self, element: &T, dot: &Dot) -> bool {
        self.entries
            .get(element)
            .is_some_and(|dots| dots.contains(dot))
    }

    /// `true` when `dot` is held by some entry and not tombstoned.
    #[must_use]
    pub fn dot_is_live(&self, dot: &Dot) -> bool {
        !self.tombstones.contains(dot)
            && self.entries.values().any(|dots| dots.contains(dot))
    }

    /// Number of live elements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.elements().count()
    }

    /// `true` when no element is live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.elements().next().is_none()
    }

    /// All entry pairs, live or not, in element order. Exposed for the
    /// checkpoint serializer.
    pub fn raw_entries(&self) -> impl Iterator<Item = (&T, &BTreeSet<Dot>)> {
        self.entries.iter().map(|(element, dots)| (element, dots))
    }

    /// The tombstone set.
    #[must_use]
    pub const fn tombstones(&self) -> &BTreeSet<Dot> {
        &self.tombstones
    }

    /// Remove a specific dot set from entries and tombstones.
    ///
    /// Refuses to touch anything unless *every* requested dot is currently
    /// tombstoned: evicting a live dot would allow spurious resurrection on
    /// a later join.
    ///
    /// # Errors
    ///
    /// Returns [`CrdtError::UnsafeCompaction`] naming the first live dot;
    /// the set is left unchanged.
    pub fn evict(&mut self, dots: &BTreeSet<Dot>) -> Result<(), CrdtError> {
        if let Some(live) = dots.iter().find(|dot| !self.tombstones.contains(*dot)) {
            return Err(CrdtError::UnsafeCompaction { dot: live.clone() });
        }
        for dots_of in self.entries.values_mut() {
            dots_of.retain(|dot| !dots.contains(dot));
        }
        self.entries.retain(|_, dots_of| !dots_of.is_empty());
        self.tombstones.retain(|dot| !dots.contains(dot));
        Ok(())
    }

    /// Drop every tombstoned dot dominated by `stable`, the greatest
    /// version vector all known replicas have observed.
    ///
    /// Returns the number of dots evicted. Never touches a live dot, even
    /// a dominated one. Calling this with a frontier that has not actually
    /// been disseminated permits resurrection; that precondition is the
    /// caller's to uphold.
    pub fn compact(&mut self, stable: &VersionVector) -> usize {
        let doomed: BTreeSet<Dot> = self
            .tombstones
            .iter()
            .filter(|dot| stable.contains(dot))
            .cloned()
            .collect();
        if doomed.is_empty() {
            return 0;
        }
        let count = doomed.len();
        for dots_of in self.entries.values_mut() {
            dots_of.retain(|dot| !doomed.contains(dot));
        }
        self.entries.retain(|_, dots_of| !dots_of.is_empty());
        self.tombstones.retain(|dot| !doomed.contains(dot));
        count
    }
}

// ---------------------------------------------------------------------------
// Merge (semilattice join)
// ---------------------------------------------------------------------------

/// Union of per-element dot sets and union of tombstones.
///
/// Set union is commutative, associative, and idempotent, so the join is a
/// semilattice. After merge, an element is live iff it has at least one dot
/// outside the merged tombstone set.
impl<T: Ord> Merge for OrSet<T> {
    fn merge(&mut self, other: Self) {
        for (element, dots) in other.entries {
            self.entries.entry(element).or_default().extend(dots);
        }
        self.tombstones.extend(other.tombstones);
    }
}

// ---------------------------------------------------------------------------
// Serde: deterministic entry/tombstone lists
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct OrSetSer<'a, T> {
    entries: Vec<(&'a T, Vec<&'a Dot>)>,
    tombstones: Vec<&'a Dot>,
}

#[derive(Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
struct OrSetDe<T> {
    #[serde(default)]
    entries: Vec<(T, Vec<Dot>)>,
    #[serde(default)]
    tombstones: Vec<Dot>,
}

impl<T: Ord + Serialize> Serialize for OrSet<T> {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        // BTree iteration gives sorted elements, sorted dot lists, and a
        // sorted tombstone list: equal sets serialize byte-identically.
        let repr = OrSetSer {
            entries: self
                .entries
                .iter()
                .map(|(element, dots)| (element, dots.iter().collect()))
                .collect(),
            tombstones: self.tombstones.iter().collect(),
        };
        repr.serialize(serializer)
    }
}

impl<'de, T: Ord + Deserialize<'de>> Deserialize<'de> for OrSet<T> {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let repr = OrSetDe::<T>::deserialize(deserializer)?;
        let mut set = Self::new();
        for (element, dots) in repr.entries {
            set.entries.entry(element).or_default().extend(dots);
        }
        set.tombstones.extend(repr.tombstones);
        Ok(set)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn dot(writer: &str, counter: u64) -> Dot {
        Dot::new(writer, counter).expect("valid dot")
    }

    // === Basic operations ===

    #[test]
    fn new_set_is_empty() {
        let set: OrSet<String> = OrSet::new();
        assert!(set.is_empty());
        assert_eq!(set.len(), 0);
    }

    #[test]
    fn add_makes_element_live() {
        let mut set = OrSet::new();
        set.add("x".to_owned(), dot("a", 1));
        assert!(set.contains(&"x".to_owned()));
        assert_eq!(set.dots(&"x".to_owned()), vec![&dot("a", 1)]);
    }

    #[test]
    fn add_is_idempotent() {
        let mut set = OrSet::new();
        set.add("x".to_owned(), dot("a", 1));
        let before = set.clone();
        set.add("x".to_owned(), dot("a", 1));
        assert_eq!(set, before);
    }

    #[test]
    fn remove_observed_dots_kills_element() {
        let mut set = OrSet::new();
        set.add("x".to_owned(), dot("a", 1));
        set.remove([dot("a", 1)]);
        assert!(!set.contains(&"x".to_owned()));
        assert!(set.is_empty());
    }

    #[test]
    fn remove_affects_only_observed_dots() {
        let mut set = OrSet::new();
        set.add("x".to_owned(), dot("a", 1));
        set.add("x".to_owned(), dot("b", 1));
        set.remove([dot("a", 1)]);
        // The unobserved dot keeps the element alive.
        assert!(set.contains(&"x".to_owned()));
        assert_eq!(set.dots(&"x".to_owned()), vec![&dot("b", 1)]);
    }

    #[test]
    fn remove_with_empty_observed_is_noop() {
        let mut set = OrSet::new();
        set.add("x".to_owned(), dot("a", 1));
        set.remove(std::iter::empty());
        assert!(set.contains(&"x".to_owned()));
    }

    #[test]
    fn readd_after_remove_under_fresh_dot() {
        let mut set = OrSet::new();
        set.add("x".to_owned(), dot("a", 1));
        set.remove([dot("a", 1)]);
        set.add("x".to_owned(), dot("a", 2));
        assert!(set.contains(&"x".to_owned()));
        assert_eq!(set.dots(&"x".to_owned()), vec![&dot("a", 2)]);
    }

    #[test]
    fn tombstone_may_precede_the_add() {
        // The remove travels faster than the add it kills.
        let mut set = OrSet::new();
        set.remove([dot("a", 1)]);
        set.add("x".to_owned(), dot("a", 1));
        assert!(!set.contains(&"x".to_owned()));
    }

    // === Merge ===

    #[test]
    fn concurrent_add_survives_remove() {
        let mut base = OrSet::new();
        base.add("x".to_owned(), dot("a", 1));

        let mut remover = base.clone();
        let observed: Vec<Dot> = remover
            .dots(&"x".to_owned())
            .into_iter()
            .cloned()
            .collect();
        remover.remove(observed);

        let mut adder = base.clone();
        adder.add("x".to_owned(), dot("b", 1));

        let mut merged = remover.clone();
        merged.merge(adder.clone());
        assert!(merged.contains(&"x".to_owned()));

        let mut merged_other_way = adder;
        merged_other_way.merge(remover);
        assert_eq!(merged, merged_other_way);
    }

    #[test]
    fn merge_unions_entries_and_tombstones() {
        let mut a = OrSet::new();
        a.add("x".to_owned(), dot("a", 1));
        a.remove([dot("b", 9)]);

        let mut b = OrSet::new();
        b.add("y".to_owned(), dot("b", 1));

        a.merge(b);
        assert!(a.contains(&"x".to_owned()));
        assert!(a.contains(&"y".to_owned()));
        assert!(a.tombstones().contains(&dot("b", 9)));
    }

    // === Compaction ===

    #[test]
    fn compact_drops_dominated_tombstones() {
        let mut set = OrSet::new();
        set.add("x".to_owned(), dot("a", 1));
        set.remove([dot("a", 1)]);

        let stable: VersionVector = [("a".to_owned(), 1)].into_iter().collect();
        assert_eq!(set.compact(&stable), 1);
        assert!(set.tombstones().is_empty());
        assert_eq!(set.raw_entries().count(), 0);
        assert!(!set.contains(&"x".to_owned()));
    }

    #[test]
    fn compact_spares_undominated_tombstones() {
        let mut set: OrSet<String> = OrSet::new();
        set.remove([dot("a", 5)]);
        let stable: VersionVector = [("a".to_owned(), 4)].into_iter().collect();
        assert_eq!(set.compact(&stable), 0);
        assert!(set.tombstones().contains(&dot("a", 5)));
    }

    #[test]
    fn compact_never_touches_live_dots() {
        let mut set = OrSet::new();
        set.add("x".to_owned(), dot("a", 1));
        // Dominated but live: must survive.
        let stable: VersionVector = [("a".to_owned(), 10)].into_iter().collect();
        assert_eq!(set.compact(&stable), 0);
        assert!(set.contains(&"x".to_owned()));
    }

    #[test]
    fn compacted_tombstone_does_not_resurrect() {
        // After compaction the entry dot is gone too, so a join with a
        // stale replica that still carries the add cannot revive it
        // unless that replica also failed to observe the remove, which
        // the stable-frontier precondition rules out.
        let mut set = OrSet::new();
        set.add("x".to_owned(), dot("a", 1));
        set.remove([dot("a", 1)]);
        let stable: VersionVector = [("a".to_owned(), 1)].into_iter().collect();
        set.compact(&stable);
        assert!(!set.contains(&"x".to_owned()));
    }

    #[test]
    fn evict_refuses_live_dots() {
        let mut set = OrSet::new();
        set.add("x".to_owned(), dot("a", 1));
        let before = set.clone();
        let doomed: BTreeSet<Dot> = [dot("a", 1)].into_iter().collect();
        let err = set.evict(&doomed).unwrap_err();
        assert_eq!(err.code().code(), "E_UNSAFE_COMPACTION");
        assert_eq!(set, before);
    }

    #[test]
    fn evict_removes_tombstoned_dots() {
        let mut set = OrSet::new();
        set.add("x".to_owned(), dot("a", 1));
        set.remove([dot("a", 1)]);
        let doomed: BTreeSet<Dot> = [dot("a", 1)].into_iter().collect();
        set.evict(&doomed).expect("dot is tombstoned");
        assert!(set.tombstones().is_empty());
        assert_eq!(set.raw_entries().count(), 0);
    }

    // === Serde ===

    #[test]
    fn serializes_deterministically() {
        let mut a = OrSet::new();
        a.add("x".to_owned(), dot("b", 1));
        a.add("x".to_owned(), dot("a", 1));
        a.add("y".to_owned(), dot("a", 2));
        a.remove([dot("a", 2)]);

        // Same contents built in a different order.
        let mut b = OrSet::new();
        b.remove([dot("a", 2)]);
        b.add("y".to_owned(), dot("a", 2));
        b.add("x".to_owned(), dot("a", 1));
        b.add("x".to_owned(), dot("b", 1));

        let ja = serde_json::to_string(&a).expect("serializes");
        let jb = serde_json::to_string(&b).expect("serializes");
        assert_eq!(ja, jb);

        let back: OrSet<String> = serde_json::from_str(&ja).expect("deserializes");
        assert_eq!(back, a);
    }

    #[test]
    fn deserializes_with_missing_fields() {
        let set: OrSet<String> = serde_json::from_str("{}").expect("defaults apply");
        assert!(set.is_empty());
        assert!(set.tombstones().is_empty());
    }
}
