//! The semilattice join trait.

use crate::clock::VersionVector;

/// A join-semilattice merge.
///
/// Implementations must be commutative, associative, and idempotent; the
/// property suites assert all three for every implementor.
pub trait Merge {
    /// Fold `other` into `self`.
    fn merge(&mut self, other: Self);
}

impl Merge for VersionVector {
    fn merge(&mut self, other: Self) {
        Self::merge(self, &other);
    }
}
