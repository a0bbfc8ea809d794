//! Engine configuration.

use chorus_wire::Millis;
use serde::{Deserialize, Serialize};

/// Tuning for the vocabulary engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VocabularyConfig {
    /// Maximum number of signal words kept.
    pub capacity: usize,
    /// Best match must score above this to be reused.
    pub match_threshold: f32,
    /// Chance to mutate a good match instead of reusing it. Rolled per node
    /// when `None`.
    pub innovation_rate: Option<f32>,
    /// EMA weight of a new outcome.
    pub learning_rate: f32,
    /// Utility under which a well-used signal is mutated.
    pub pressure_utility: f32,
    /// Uses required before evolutionary pressure applies.
    pub pressure_min_uses: u32,
    /// Disuse after which a weak signal is pruned.
    pub prune_window_ms: Millis,
    /// How often `update` runs a prune pass.
    pub prune_interval_ms: Millis,
    /// Received-signal memory size.
    pub memory_capacity: usize,
    /// How long we wait for an answer to a signal that asked for one.
    pub response_window_ms: Millis,
    /// Outstanding answer expectations tracked at once.
    pub max_pending_responses: usize,
}

impl Default for VocabularyConfig {
    fn default() -> Self {
        Self {
            capacity: 64,
            match_threshold: 0.3,
            innovation_rate: None,
            learning_rate: 0.1,
            pressure_utility: 0.2,
            pressure_min_uses: 5,
            prune_window_ms: 600_000,
            prune_interval_ms: 60_000,
            memory_capacity: 32,
            response_window_ms: 5_000,
            max_pending_responses: 8,
        }
    }
}

impl VocabularyConfig {
    #[must_use]
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Fix the innovation rate, clamped to `[0, 1]`.
    #[must_use]
    pub fn with_innovation_rate(mut self, rate: f32) -> Self {
        self.innovation_rate = Some(rate.clamp(0.0, 1.0));
        self
    }

    #[must_use]
    pub fn with_prune_window(mut self, window: Millis) -> Self {
        self.prune_window_ms = window;
        self
    }

    #[must_use]
    pub fn with_response_window(mut self, window: Millis) -> Self {
        self.response_window_ms = window;
        self
    }
}

/// Tuning for per-peer learning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PeerLearningConfig {
    pub max_peers: usize,
    pub signals_per_peer: usize,
    pub initial_trust: f32,
    /// Acoustic similarity needed to treat two signals as the same idiom.
    pub recognition_threshold: f32,
}

impl Default for PeerLearningConfig {
    fn default() -> Self {
        Self {
            max_peers: 8,
            signals_per_peer: 16,
            initial_trust: 0.5,
            recognition_threshold: 0.7,
        }
    }
}

impl PeerLearningConfig {
    #[must_use]
    pub fn with_max_peers(mut self, max_peers: usize) -> Self {
        self.max_peers = max_peers;
        self
    }

    #[must_use]
    pub fn with_signals_per_peer(mut self, n: usize) -> Self {
        self.signals_per_peer = n;
        self
    }
}
