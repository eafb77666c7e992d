//! Runtime support for Pulsar-generated simulators.
//!
//! Generated code is a thin sequential program; the stateful machinery that
//! gives it synchronous-hardware semantics lives here. FIFOs and register
//! arrays stage every mutation with an effective stamp and commit at the
//! tick boundary, so no module observes another module's same-cycle writes.
//! [`ValueCastTo`] provides the bit-width-exact conversions the expression
//! lowering relies on, and [`MemoryModel`] is the cycle-accurate
//! memory-timing collaborator behind the memory intrinsics.
//!
//! `num_bigint` and `rand` are re-exported so generated crates need only
//! one runtime dependency.

#![warn(missing_docs)]

pub mod array;
pub mod cast;
pub mod fifo;
pub mod hex;
pub mod memory;

pub use array::{RegArray, WriteRecord};
pub use cast::ValueCastTo;
pub use fifo::Fifo;
pub use hex::load_hex_file;
pub use memory::{MemResponse, MemoryModel};

pub use num_bigint;
pub use rand;

/// Returns the staged-commit stamp for the cycle containing `stamp`:
/// the enclosing cycle boundary plus the +50 sub-step.
pub fn commit_stamp(stamp: usize) -> usize {
    stamp - stamp % 100 + 50
}

/// Returns the activation stamp of the next cycle after `stamp`.
pub fn next_cycle_stamp(stamp: usize) -> usize {
    stamp - stamp % 100 + 100
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commit_stamp_lands_on_half_cycle() {
        assert_eq!(commit_stamp(300), 350);
        assert_eq!(commit_stamp(350), 350);
        assert_eq!(commit_stamp(399), 350);
    }

    #[test]
    fn next_cycle_stamp_lands_on_boundary() {
        assert_eq!(next_cycle_stamp(300), 400);
        assert_eq!(next_cycle_stamp(350), 400);
    }
}
