//! Explicit, split-on-use random state.
//!
//! Every stochastic operation takes an [`RngKey`] by value and the owner
//! keeps the other half of a split, so replaying the same calls from the same
//! root key reproduces every draw.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

const GOLDEN_GAMMA: u64 = 0x9e37_79b9_7f4a_7c15;

/// SplitMix64 finalizer.
fn mix(mut z: u64) -> u64 {
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}

/// Immutable random key. Consumed by stochastic operations, never mutated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RngKey(u64);

impl RngKey {
    pub fn new(seed: u64) -> Self {
        Self(mix(seed.wrapping_add(GOLDEN_GAMMA)))
    }

    /// Derive an independent key from `self` and `data`.
    pub fn fold_in(self, data: u64) -> Self {
        Self(mix(self.0 ^ mix(data.wrapping_add(1).wrapping_mul(GOLDEN_GAMMA))))
    }

    /// Split into two independent keys. By convention the first is kept by
    /// the caller and the second is consumed.
    pub fn split(self) -> (Self, Self) {
        (self.fold_in(0), self.fold_in(1))
    }

    pub fn split_n(self, n: usize) -> Vec<Self> {
        (0..n as u64).map(|i| self.fold_in(i)).collect()
    }

    /// Seeded generator for bulk draws within one operation.
    pub fn to_rng(self) -> ChaCha8Rng {
        ChaCha8Rng::seed_from_u64(self.0)
    }

    /// A single uniform draw in [0, 1).
    pub fn uniform(self) -> f64 {
        self.to_rng().random::<f64>()
    }
}
