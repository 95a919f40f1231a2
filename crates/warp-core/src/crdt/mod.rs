//! Conflict-free replicated data types.
//!
//! Everything here is a join-semilattice: merges are commutative,
//! associative, and idempotent, so replicas converge no matter the order
//! or multiplicity of exchange.

pub mod lww;
pub mod merge;
pub mod orset;

pub use lww::LwwRegister;
pub use merge::Merge;
pub use orset::{CrdtError, OrSet};
