//! Property suites for the lattice laws and serializer determinism.
//!
//! Everything that claims to be a join-semilattice is checked for
//! commutativity, associativity, and idempotence; the OR-Set
//! additionally for join monotonicity, canonical-serialization
//! determinism, and compaction safety.

use proptest::prelude::*;
use proptest::test_runner::{Config, RngSeed};
use warp_core::crdt::Merge;
use warp_core::{OrSet, VersionVector, join_states, reduce};

use generators::*;

fn proptest_config(cases: u32) -> Config {
    let cases = std::env::var("PROPTEST_CASES")
        .ok()
        .and_then(|value| value.parse::<u32>().ok())
        .unwrap_or(cases);

    let mut config = Config::with_cases(cases);
    config.failure_persistence = None;

    if let Some(seed) = std::env::var("PROPTEST_SEED")
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
    {
        config.rng_seed = RngSeed::Fixed(seed);
    }

    config
}

fn joined(a: &OrSet<String>, b: &OrSet<String>) -> OrSet<String> {
    let mut out = a.clone();
    out.merge(b.clone());
    out
}

proptest! {
    #![proptest_config(proptest_config(2048))]

    // === OR-Set lattice laws ===

    #[test]
    fn orset_join_commutative(a in arb_orset(), b in arb_orset()) {
        prop_assert_eq!(joined(&a, &b), joined(&b, &a));
    }

    #[test]
    fn orset_join_associative(a in arb_orset(), b in arb_orset(), c in arb_orset()) {
        let left = joined(&joined(&a, &b), &c);
        let right = joined(&a, &joined(&b, &c));
        prop_assert_eq!(left, right);
    }

    #[test]
    fn orset_join_idempotent(a in arb_orset()) {
        prop_assert_eq!(joined(&a, &a), a);
    }

    #[test]
    fn orset_empty_is_identity(a in arb_orset()) {
        prop_assert_eq!(joined(&a, &OrSet::new()), a.clone());
        prop_assert_eq!(joined(&OrSet::new(), &a), a);
    }

    // === Join monotonicity ===

    #[test]
    fn orset_join_is_monotonic(a in arb_orset(), b in arb_orset()) {
        let merged = joined(&a, &b);
        for (element, dots) in a.raw_entries() {
            for dot in dots {
                prop_assert!(merged.has_dot(element, dot));
            }
        }
        for dot in a.tombstones() {
            prop_assert!(merged.tombstones().contains(dot));
        }
    }

    // === Canonical serialization ===

    #[test]
    fn orset_serialization_is_a_function_of_the_set(a in arb_orset(), b in arb_orset()) {
        let ab = warp_core::codec::encode(&joined(&a, &b)).expect("encodes");
        let ba = warp_core::codec::encode(&joined(&b, &a)).expect("encodes");
        prop_assert_eq!(ab, ba);
    }

    // === Compaction safety ===

    #[test]
    fn compact_only_evicts_dominated_tombstones(a in arb_orset(), vv in arb_vv()) {
        let before = a.clone();
        let mut after = a;
        after.compact(&vv);

        // Anything evicted from the tombstone set was dominated.
        for dot in before.tombstones() {
            if !after.tombstones().contains(dot) {
                prop_assert!(vv.contains(dot));
            }
        }
        // No live dot disappeared: every dot present and untombstoned
        // before is still present.
        for (element, dots) in before.raw_entries() {
            for dot in dots {
                if !before.tombstones().contains(dot) {
                    prop_assert!(after.has_dot(element, dot));
                }
            }
        }
        // Visibility is unchanged by compaction.
        let before_live: Vec<&String> = before.elements().collect();
        let after_live: Vec<&String> = after.elements().collect();
        prop_assert_eq!(before_live, after_live);
    }

    // === Version vector lattice laws ===

    #[test]
    fn vv_merge_commutative(a in arb_vv(), b in arb_vv()) {
        let mut ab = a.clone();
        ab.merge(&b);
        let mut ba = b.clone();
        ba.merge(&a);
        prop_assert_eq!(ab, ba);
    }

    #[test]
    fn vv_merge_idempotent_and_dominating(a in arb_vv(), b in arb_vv()) {
        let mut merged = a.clone();
        merged.merge(&b);
        prop_assert!(merged.dominates(&a));
        prop_assert!(merged.dominates(&b));
        let mut again = merged.clone();
        again.merge(&a);
        prop_assert_eq!(again, merged);
    }

    // === LWW register lattice laws ===

    #[test]
    fn lww_merge_commutative(a in arb_lww(), b in arb_lww()) {
        let mut ab = a.clone();
        ab.merge(b.clone());
        let mut ba = b.clone();
        ba.merge(a.clone());
        prop_assert_eq!(ab, ba);
    }

    #[test]
    fn lww_merge_associative(a in arb_lww(), b in arb_lww(), c in arb_lww()) {
        let mut left = a.clone();
        left.merge(b.clone());
        left.merge(c.clone());

        let mut bc = b.clone();
        bc.merge(c.clone());
        let mut right = a.clone();
        right.merge(bc);

        prop_assert_eq!(left, right);
    }

    #[test]
    fn lww_merge_idempotent(a in arb_lww()) {
        let mut merged = a.clone();
        merged.merge(a.clone());
        prop_assert_eq!(merged, a);
    }
}

proptest! {
    #![proptest_config(proptest_config(256))]

    // === State join lattice laws (via reduced states) ===

    #[test]
    fn state_join_commutative_and_idempotent(
        pa in arb_patches_prefixed("pa"),
        pb in arb_patches_prefixed("pb"),
    ) {
        let a = reduce(&pa, None).expect("reduces");
        let b = reduce(&pb, None).expect("reduces");
        prop_assert_eq!(join_states(&a, &b), join_states(&b, &a));
        prop_assert_eq!(join_states(&a, &a), a);
    }

    #[test]
    fn state_join_associative(
        pa in arb_patches_prefixed("pa"),
        pb in arb_patches_prefixed("pb"),
        pc in arb_patches_prefixed("pc"),
    ) {
        let a = reduce(&pa, None).expect("reduces");
        let b = reduce(&pb, None).expect("reduces");
        let c = reduce(&pc, None).expect("reduces");
        let left = join_states(&join_states(&a, &b), &c);
        let right = join_states(&a, &join_states(&b, &c));
        prop_assert_eq!(left, right);
    }
}

// Keep the identity element explicit: an empty version vector dominates
// nothing but is dominated by everything.
#[test]
fn empty_vv_is_identity() {
    let empty = VersionVector::new();
    let mut merged = empty.clone();
    merged.merge(&empty);
    assert_eq!(merged, empty);
    assert!(empty.dominates(&VersionVector::new()));
}
