#![warn(missing_docs)]
//! Core primitives shared across the workspace.

pub mod geometry;

use rand::{rngs::StdRng, SeedableRng};
use serde::{Deserialize, Serialize};

pub use geometry::{BlockPos, BoundingBox, Direction, EntityBody, Rotation};

/// Network-visible entity identifier (encoded as a varint on the wire).
pub type EntityId = i32;

/// Fixed tick type (20 TPS => 50 ms per tick).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SimTick(pub u64);

impl SimTick {
    /// First tick in any deterministic timeline.
    pub const ZERO: Self = Self(0);

    /// Advance by `delta` ticks.
    pub fn advance(self, delta: u64) -> Self {
        Self(self.0 + delta)
    }
}

/// Reproducible RNG seeded by a session seed and the current tick.
pub fn scoped_rng(seed: u64, tick: SimTick) -> StdRng {
    StdRng::seed_from_u64(seed ^ tick.0.rotate_left(17))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    #[test]
    fn tick_advances() {
        assert_eq!(SimTick::ZERO.advance(3), SimTick(3));
    }

    #[test]
    fn scoped_rng_is_reproducible() {
        let a: u32 = scoped_rng(7, SimTick(5)).gen();
        let b: u32 = scoped_rng(7, SimTick(5)).gen();
        assert_eq!(a, b);
    }
}
