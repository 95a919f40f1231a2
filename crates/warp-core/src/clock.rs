//! Version vectors: per-writer causal frontiers.
//!
//! A [`VersionVector`] maps each writer id to the highest counter observed
//! from that writer. Zero counters are never stored; an absent writer has an
//! implied count of 0. The map is a `BTreeMap`, so iteration and serde
//! output are always in lexicographic writer order.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::ident::{Dot, IdentError};

/// A mapping from writer id to the highest counter observed from it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VersionVector(BTreeMap<String, u64>);

impl VersionVector {
    /// Returns an empty vector.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The counter observed for `writer` (0 when absent).
    #[must_use]
    pub fn get(&self, writer: &str) -> u64 {
        self.0.get(writer).copied().unwrap_or_default()
    }

    /// Advance `writer`'s counter by one and return the freshly minted dot.
    ///
    /// # Errors
    ///
    /// Returns [`IdentError::InvalidDot`] when `writer` is empty.
    pub fn increment(&mut self, writer: &str) -> Result<Dot, IdentError> {
        let next = self.get(writer) + 1;
        let dot = Dot::new(writer, next)?;
        self.0.insert(writer.to_owned(), next);
        Ok(dot)
    }

    /// Record an observed dot: the writer's entry becomes the max of its
    /// current value and the dot's counter.
    pub fn observe(&mut self, dot: &Dot) {
        let entry = self.0.entry(dot.writer().to_owned()).or_default();
        *entry = (*entry).max(dot.counter());
    }

    /// Pointwise max with `other`, in place.
    pub fn merge(&mut self, other: &Self) {
        for (writer, counter) in &other.0 {
            let entry = self.0.entry(writer.clone()).or_default();
            *entry = (*entry).max(*counter);
        }
    }

    /// `true` when this vector descends from `other`: every entry of
    /// `other` is covered here.
    #[must_use]
    pub fn dominates(&self, other: &Self) -> bool {
        other
            .0
            .iter()
            .all(|(writer, counter)| self.get(writer) >= *counter)
    }

    /// `true` when this vector covers `dot`.
    #[must_use]
    pub fn contains(&self, dot: &Dot) -> bool {
        self.get(dot.writer()) >= dot.counter()
    }

    /// `true` when no writer has been observed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate `(writer, counter)` pairs in lexicographic writer order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> {
        self.0.iter().map(|(writer, counter)| (writer.as_str(), *counter))
    }
}

impl FromIterator<(String, u64)> for VersionVector {
    fn from_iter<T: IntoIterator<Item = (String, u64)>>(iter: T) -> Self {
        // Zero counters are dropped so the absent-means-zero invariant holds.
        Self(
            iter.into_iter()
                .filter(|(_, counter)| *counter > 0)
                .collect(),
        )
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

    #[test]
    fn increment_mints_sequential_dots() {
        let mut vv = VersionVector::new();
        let d1 = vv.increment("a").expect("valid writer");
        let d2 = vv.increment("a").expect("valid writer");
        assert_eq!(d1, dot("a", 1));
        assert_eq!(d2, dot("a", 2));
        assert_eq!(vv.get("a"), 2);
    }

    #[test]
    fn increment_rejects_empty_writer() {
        let mut vv = VersionVector::new();
        assert!(vv.increment("").is_err());
    }

    #[test]
    fn merge_is_pointwise_max() {
        let mut a: VersionVector = [("x".to_owned(), 3), ("y".to_owned(), 1)]
            .into_iter()
            .collect();
        let b: VersionVector = [("y".to_owned(), 5), ("z".to_owned(), 2)]
            .into_iter()
            .collect();
        a.merge(&b);
        assert_eq!(a.get("x"), 3);
        assert_eq!(a.get("y"), 5);
        assert_eq!(a.get("z"), 2);
    }

    #[test]
    fn domination_covers_every_entry() {
        let big: VersionVector = [("a".to_owned(), 2), ("b".to_owned(), 4)]
            .into_iter()
            .collect();
        let small: VersionVector = [("a".to_owned(), 2)].into_iter().collect();
        assert!(big.dominates(&small));
        assert!(!small.dominates(&big));
        // Every vector dominates the empty one.
        assert!(small.dominates(&VersionVector::new()));
    }

    #[test]
    fn contains_compares_counters() {
        let vv: VersionVector = [("w".to_owned(), 3)].into_iter().collect();
        assert!(vv.contains(&dot("w", 3)));
        assert!(vv.contains(&dot("w", 1)));
        assert!(!vv.contains(&dot("w", 4)));
        assert!(!vv.contains(&dot("other", 1)));
    }

    #[test]
    fn zero_counters_are_never_stored() {
        let vv: VersionVector = [("a".to_owned(), 0), ("b".to_owned(), 1)]
            .into_iter()
            .collect();
        let entries: Vec<_> = vv.iter().collect();
        assert_eq!(entries, vec![("b", 1)]);
    }

    #[test]
    fn serde_emits_sorted_map() {
        let vv: VersionVector = [("zeta".to_owned(), 1), ("alpha".to_owned(), 2)]
            .into_iter()
            .collect();
        let json = serde_json::to_string(&vv).expect("serializes");
        assert_eq!(json, r#"{"alpha":2,"zeta":1}"#);
    }
}
