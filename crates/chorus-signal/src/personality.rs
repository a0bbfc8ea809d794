//! Per-node style traits that bias how a node coins signals.

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Style of the local node, rolled once at start-up.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Personality {
    /// Tag stamped into every signal this node coins. Never 0 or 255.
    pub signature: u8,
    /// Upper bound on tokens for contexts without a fixed shape, `1..=8`.
    pub complexity: u8,
    /// Chance to mutate a good match instead of reusing it.
    pub innovation_rate: f32,
}

impl Personality {
    /// Roll a personality. Innovation stays low so nodes mostly reuse what
    /// already works.
    pub fn roll<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Self {
            signature: rng.gen_range(1..=254),
            complexity: rng.gen_range(1..=8),
            innovation_rate: rng.gen_range(0.10..=0.30),
        }
    }

    /// Signed intensity bias in `-10..=10` derived from the signature.
    pub fn intensity_bias(&self) -> i16 {
        i16::from(self.signature % 21) - 10
    }
}
