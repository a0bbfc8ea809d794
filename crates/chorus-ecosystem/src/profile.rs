//! Per-node reliability profile and the reputation formula.

use chorus_wire::{Health, Millis, NodeId, NodeKind};
use serde::{Deserialize, Serialize};

/// Neutral reputation for new or rehabilitated nodes.
pub const NEUTRAL_REPUTATION: f32 = 50.0;
/// Reputation ceiling while blacklisted.
pub const BLACKLIST_CAP: f32 = 25.0;
/// Accuracy assumed before any report was checked.
pub const DEFAULT_ACCURACY: f32 = 0.8;

const ACCURACY_WEIGHT: f32 = 0.30;
const MISSION_WEIGHT: f32 = 0.25;
const COMMUNICATION_WEIGHT: f32 = 0.20;
const AVAILABILITY_WEIGHT: f32 = 0.15;
const HEALTH_WEIGHT: f32 = 0.10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BotProfile {
    pub id: NodeId,
    pub kind: NodeKind,
    pub activated_at: Millis,

    /// Self-reported evolution state.
    pub generation: u32,
    pub fitness: f32,
    pub total_missions: u32,

    pub data_accuracy: f32,
    pub mission_success_rate: f32,
    pub communication_reliability: f32,
    pub availability_score: f32,

    pub total_data_sent: u32,
    pub data_verified_good: u32,
    pub data_verified_bad: u32,

    /// Composite in `[0, 100]`.
    pub reputation_score: f32,
    pub last_reputation_update: Millis,

    pub health: Health,
    pub last_seen: Millis,
    pub consecutive_failures: u32,
    pub needs_inspection: bool,
    pub needs_upgrade: bool,
    pub is_blacklisted: bool,
    pub blacklist_reason: Option<String>,
}

impl BotProfile {
    pub fn new(id: NodeId, kind: NodeKind, now: Millis) -> Self {
        Self {
            id,
            kind,
            activated_at: now,
            generation: 0,
            fitness: 0.0,
            total_missions: 0,
            data_accuracy: DEFAULT_ACCURACY,
            mission_success_rate: 0.8,
            communication_reliability: 1.0,
            availability_score: 1.0,
            total_data_sent: 0,
            data_verified_good: 0,
            data_verified_bad: 0,
            reputation_score: NEUTRAL_REPUTATION,
            last_reputation_update: now,
            health: Health::Good,
            last_seen: now,
            consecutive_failures: 0,
            needs_inspection: false,
            needs_upgrade: false,
            is_blacklisted: false,
            blacklist_reason: None,
        }
    }

    /// Weighted reliability composite in `[0, 100]`, without storing it.
    ///
    /// More than 3 consecutive failures cost 20%, more than 10 a further
    /// 50%. A blacklisted node never exceeds 25.
    pub fn computed_reputation(&self) -> f32 {
        let mut reputation = self.data_accuracy * ACCURACY_WEIGHT
            + self.mission_success_rate * MISSION_WEIGHT
            + self.communication_reliability * COMMUNICATION_WEIGHT
            + self.availability_score * AVAILABILITY_WEIGHT
            + self.health.factor() * HEALTH_WEIGHT;
        if self.consecutive_failures > 3 {
            reputation *= 0.8;
        }
        if self.consecutive_failures > 10 {
            reputation *= 0.5;
        }
        let mut reputation = reputation * 100.0;
        if self.is_blacklisted {
            reputation = reputation.min(BLACKLIST_CAP);
        }
        if reputation.is_nan() {
            return 0.0;
        }
        reputation.clamp(0.0, 100.0)
    }

    /// Rank for task selection. Blacklisted and failing nodes are never
    /// candidates.
    pub fn suitability(&self) -> Option<f32> {
        if self.is_blacklisted || self.health <= Health::Failing {
            return None;
        }
        Some(
            self.reputation_score * 0.4
                + self.data_accuracy * 30.0
                + self.mission_success_rate * 20.0
                + f32::from(self.health.code()) * 2.0,
        )
    }

    /// Recompute accuracy from verification counters, smoothed.
    pub(crate) fn refresh_accuracy(&mut self) {
        if self.total_data_sent == 0 {
            self.data_accuracy = DEFAULT_ACCURACY;
            return;
        }
        let observed = self.data_verified_good as f32 / self.total_data_sent as f32;
        self.data_accuracy = (self.data_accuracy * 0.7 + observed * 0.3).clamp(0.0, 1.0);
    }

    /// Exclude until rehabilitated. Reputation drops to the cap at once.
    pub(crate) fn blacklist(&mut self, reason: &str) {
        self.is_blacklisted = true;
        self.needs_inspection = true;
        self.blacklist_reason = Some(reason.to_owned());
        self.reputation_score = self.reputation_score.min(BLACKLIST_CAP);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn profile() -> BotProfile {
        BotProfile::new(NodeId([1; 6]), NodeKind::Scout, 0)
    }

    #[test]
    fn fresh_profile_reputation() {
        // 0.8*0.3 + 0.8*0.25 + 0.2 + 0.15 + 0.8*0.1 = 0.87
        assert!((profile().computed_reputation() - 87.0).abs() < 1e-3);
    }

    #[test]
    fn chronic_failures_cost_at_least_forty_percent() {
        let healthy = profile();
        let mut failing = profile();
        failing.consecutive_failures = 15;
        let ratio = failing.computed_reputation() / healthy.computed_reputation();
        assert!((ratio - 0.4).abs() < 1e-4);

        failing.consecutive_failures = 4;
        let ratio = failing.computed_reputation() / healthy.computed_reputation();
        assert!((ratio - 0.8).abs() < 1e-4);
    }

    #[test]
    fn suitability_skips_failing_nodes() {
        let mut p = profile();
        assert!(p.suitability().is_some());
        p.health = Health::Failing;
        assert!(p.suitability().is_none());
        p.health = Health::Good;
        p.is_blacklisted = true;
        assert!(p.suitability().is_none());
    }

    #[test]
    fn accuracy_smooths_toward_observed() {
        let mut p = profile();
        p.refresh_accuracy();
        assert_eq!(p.data_accuracy, DEFAULT_ACCURACY);
        p.total_data_sent = 1;
        p.data_verified_bad = 1;
        p.refresh_accuracy();
        assert!((p.data_accuracy - 0.56).abs() < 1e-6);
    }

    proptest! {
        #[test]
        fn blacklisted_reputation_never_exceeds_cap(
            accuracy in 0.0f32..=1.0,
            mission in 0.0f32..=1.0,
            comm in 0.0f32..=1.0,
            avail in 0.0f32..=1.0,
            health in 1u8..=5,
            failures in 0u32..30,
        ) {
            let mut p = profile();
            p.data_accuracy = accuracy;
            p.mission_success_rate = mission;
            p.communication_reliability = comm;
            p.availability_score = avail;
            p.health = Health::from_code(health).unwrap();
            p.consecutive_failures = failures;
            p.is_blacklisted = true;
            prop_assert!(p.computed_reputation() <= BLACKLIST_CAP);
            p.is_blacklisted = false;
            prop_assert!((0.0..=100.0).contains(&p.computed_reputation()));
        }
    }
}
