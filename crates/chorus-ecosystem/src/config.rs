//! Ecosystem manager configuration.

use chorus_wire::Millis;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EcosystemConfig {
    pub max_profiles: usize,
    pub max_relationships: usize,
    pub verification_log_len: usize,
    pub reputation_interval_ms: Millis,
    pub analysis_interval_ms: Millis,
    /// Silence after which a node counts as unresponsive. The liveness sweep
    /// also runs at this cadence.
    pub liveness_timeout_ms: Millis,
    /// Default threshold for [`crate::EcosystemManager::should_trust`].
    pub min_trust: f32,
    /// Contradicted reports before a low-accuracy sender is blacklisted.
    pub blacklist_contradictions: u32,
    pub blacklist_accuracy: f32,
    /// EMA weight for link quality and mission outcomes.
    pub smoothing: f32,
}

impl Default for EcosystemConfig {
    fn default() -> Self {
        Self {
            max_profiles: 16,
            max_relationships: 64,
            verification_log_len: 100,
            reputation_interval_ms: 600_000,
            analysis_interval_ms: 3_600_000,
            liveness_timeout_ms: 30_000,
            min_trust: 0.3,
            blacklist_contradictions: 5,
            blacklist_accuracy: 0.5,
            smoothing: 0.1,
        }
    }
}

impl EcosystemConfig {
    #[must_use]
    pub fn with_max_profiles(mut self, n: usize) -> Self {
        self.max_profiles = n;
        self
    }

    #[must_use]
    pub fn with_max_relationships(mut self, n: usize) -> Self {
        self.max_relationships = n;
        self
    }

    #[must_use]
    pub fn with_liveness_timeout(mut self, timeout: Millis) -> Self {
        self.liveness_timeout_ms = timeout;
        self
    }

    #[must_use]
    pub fn with_reputation_interval(mut self, interval: Millis) -> Self {
        self.reputation_interval_ms = interval;
        self
    }

    #[must_use]
    pub fn with_analysis_interval(mut self, interval: Millis) -> Self {
        self.analysis_interval_ms = interval;
        self
    }
}
