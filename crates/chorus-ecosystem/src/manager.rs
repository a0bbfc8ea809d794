//! The reputation and ecosystem manager.

use chorus_wire::{elapsed, Health, Millis, NodeId, NodeKind, Outcome};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::analysis::{
    capability_gaps, recommendations, swarm_health, weaknesses, EcosystemReport, SwarmHealth,
    UpgradeAdvice, WeakNode,
};
use crate::config::EcosystemConfig;
use crate::error::{Error, Result};
use crate::profile::{BotProfile, NEUTRAL_REPUTATION};
use crate::relationship::{InteractionKind, RelationshipTable};
use crate::verification::{VerificationEntry, VerificationLog};

/// Persistable manager state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EcosystemSnapshot {
    pub profiles: Vec<BotProfile>,
    pub relationships: RelationshipTable,
}

/// What a periodic update did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EcosystemUpdate {
    pub reputations_refreshed: bool,
    pub report: Option<EcosystemReport>,
    /// Nodes found silent by the liveness sweep.
    pub silent: Vec<NodeId>,
}

#[derive(Debug, Clone)]
pub struct EcosystemManager {
    config: EcosystemConfig,
    profiles: Vec<BotProfile>,
    relationships: RelationshipTable,
    verifications: VerificationLog,
    last_reputation_update: Millis,
    last_analysis: Millis,
    last_liveness_sweep: Millis,
}

impl Default for EcosystemManager {
    fn default() -> Self {
        Self::new(EcosystemConfig::default())
    }
}

impl EcosystemManager {
    pub fn new(config: EcosystemConfig) -> Self {
        Self {
            profiles: Vec::with_capacity(config.max_profiles),
            relationships: RelationshipTable::new(config.max_relationships),
            verifications: VerificationLog::new(config.verification_log_len),
            config,
            last_reputation_update: 0,
            last_analysis: 0,
            last_liveness_sweep: 0,
        }
    }

    /// Rebuild from a snapshot. Profiles beyond capacity are dropped.
    pub fn restore(config: EcosystemConfig, mut snapshot: EcosystemSnapshot) -> Self {
        let mut manager = Self::new(config);
        snapshot.profiles.truncate(manager.config.max_profiles);
        manager.profiles = snapshot.profiles;
        manager.relationships = snapshot.relationships;
        manager
    }

    pub fn snapshot(&self) -> EcosystemSnapshot {
        EcosystemSnapshot {
            profiles: self.profiles.clone(),
            relationships: self.relationships.clone(),
        }
    }

    pub fn config(&self) -> &EcosystemConfig {
        &self.config
    }

    pub fn profile(&self, id: &NodeId) -> Option<&BotProfile> {
        self.profiles.iter().find(|p| p.id == *id)
    }

    fn profile_mut(&mut self, id: &NodeId) -> Result<&mut BotProfile> {
        self.profiles
            .iter_mut()
            .find(|p| p.id == *id)
            .ok_or(Error::UnknownNode(*id))
    }

    pub fn profiles(&self) -> impl Iterator<Item = &BotProfile> {
        self.profiles.iter()
    }

    pub fn relationships(&self) -> &RelationshipTable {
        &self.relationships
    }

    pub fn verifications(&self) -> &VerificationLog {
        &self.verifications
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }

    /// Register a node, or refresh its last-seen time if already known.
    /// New nodes are rejected once the registry is full.
    pub fn register_node(&mut self, id: NodeId, kind: NodeKind, now: Millis) -> Result<()> {
        if let Ok(profile) = self.profile_mut(&id) {
            profile.last_seen = now;
            if kind != NodeKind::Unknown {
                profile.kind = kind;
            }
            return Ok(());
        }
        if self.profiles.len() >= self.config.max_profiles {
            warn!(node = %id, capacity = self.config.max_profiles, "node registry full");
            return Err(Error::CapacityExceeded {
                what: "node registry",
                capacity: self.config.max_profiles,
            });
        }
        self.profiles.push(BotProfile::new(id, kind, now));
        info!(node = %id, ?kind, nodes = self.profiles.len(), "registered node");
        Ok(())
    }

    /// Self-reported evolution state. Hearing from a node clears its
    /// failure streak.
    pub fn update_status(&mut self, id: &NodeId, generation: u32, fitness: f32, now: Millis) -> Result<()> {
        let profile = self.profile_mut(id)?;
        profile.generation = generation;
        if fitness.is_finite() {
            profile.fitness = fitness;
        }
        profile.last_seen = now;
        profile.consecutive_failures = 0;
        Ok(())
    }

    pub fn update_health(&mut self, id: &NodeId, health: Health, now: Millis) -> Result<()> {
        let profile = self.profile_mut(id)?;
        profile.health = health;
        profile.last_seen = now;
        if health <= Health::Failing {
            profile.needs_inspection = true;
            warn!(node = %id, ?health, "node health poor, needs inspection");
        }
        Ok(())
    }

    /// Note that `id` was heard on the link.
    pub fn touch(&mut self, id: &NodeId, now: Millis) {
        if let Ok(profile) = self.profile_mut(id) {
            profile.last_seen = now;
        }
    }

    /// Remove a node and mark its relationships inactive.
    pub fn deactivate(&mut self, id: &NodeId) -> Option<BotProfile> {
        let index = self.profiles.iter().position(|p| p.id == *id)?;
        let inactive = self.relationships.deactivate(id);
        debug!(node = %id, relationships = inactive, "node deactivated");
        Some(self.profiles.remove(index))
    }

    pub fn record_interaction(
        &mut self,
        a: NodeId,
        b: NodeId,
        kind: InteractionKind,
        outcome: Outcome,
        now: Millis,
    ) -> Result<f32> {
        self.relationships.record(a, b, kind, outcome, now)
    }

    /// `verifier` checked a report from `sender`.
    ///
    /// Updates the sender's accuracy, records a data-share interaction and
    /// blacklists senders whose reports keep getting contradicted.
    pub fn record_data_verification(
        &mut self,
        sender: NodeId,
        verifier: NodeId,
        data_hash: u32,
        correct: bool,
        confidence: f32,
        now: Millis,
    ) {
        self.verifications.push(VerificationEntry {
            sender,
            verifier,
            data_hash,
            correct,
            confidence: if confidence.is_finite() { confidence.clamp(0.0, 1.0) } else { 0.0 },
            at: now,
        });

        let threshold_bad = self.config.blacklist_contradictions;
        let threshold_accuracy = self.config.blacklist_accuracy;
        if let Ok(profile) = self.profile_mut(&sender) {
            profile.total_data_sent = profile.total_data_sent.saturating_add(1);
            if correct {
                profile.data_verified_good = profile.data_verified_good.saturating_add(1);
            } else {
                profile.data_verified_bad = profile.data_verified_bad.saturating_add(1);
            }
            profile.refresh_accuracy();
            if !profile.is_blacklisted
                && profile.data_verified_bad >= threshold_bad
                && profile.data_accuracy < threshold_accuracy
            {
                profile.blacklist("repeatedly contradicted data");
                warn!(node = %sender, bad = profile.data_verified_bad, accuracy = profile.data_accuracy, "node blacklisted");
            }
        }

        let outcome = if correct { Outcome::Success } else { Outcome::Contradicted };
        if let Err(err) = self
            .relationships
            .record(sender, verifier, InteractionKind::DataShare, outcome, now)
        {
            debug!(error = %err, "verification not tracked as relationship");
        }
    }

    pub fn trust_score(&self, a: &NodeId, b: &NodeId) -> f32 {
        self.relationships.trust(a, b)
    }

    /// Whether `id` is reliable enough for `min_threshold` in `[0, 1]`.
    pub fn should_trust(&self, id: &NodeId, min_threshold: f32) -> bool {
        let Some(p) = self.profile(id) else {
            return false;
        };
        !p.is_blacklisted
            && p.reputation_score >= min_threshold * 100.0
            && p.data_accuracy >= min_threshold
            && p.health > Health::Failing
    }

    /// [`Self::should_trust`] at the configured threshold.
    pub fn is_trusted(&self, id: &NodeId) -> bool {
        self.should_trust(id, self.config.min_trust)
    }

    /// Recompute and store the reputation of `id`.
    pub fn calculate_reputation(&mut self, id: &NodeId, now: Millis) -> Option<f32> {
        let profile = self.profile_mut(id).ok()?;
        profile.reputation_score = profile.computed_reputation();
        profile.last_reputation_update = now;
        Some(profile.reputation_score)
    }

    pub fn update_all_reputations(&mut self, now: Millis) {
        for profile in &mut self.profiles {
            profile.reputation_score = profile.computed_reputation();
            profile.last_reputation_update = now;
        }
        self.last_reputation_update = now;
        debug!(nodes = self.profiles.len(), "reputations refreshed");
    }

    /// Best candidate by suitability. Unknown, blacklisted and failing nodes
    /// are skipped. Equal scores keep the earlier candidate.
    pub fn select_best_for_task(&self, candidates: &[NodeId]) -> Option<NodeId> {
        let mut best: Option<(NodeId, f32)> = None;
        for id in candidates {
            let Some(score) = self.profile(id).and_then(BotProfile::suitability) else {
                continue;
            };
            if best.map_or(true, |(_, s)| score > s) {
                best = Some((*id, score));
            }
        }
        best.map(|(id, _)| id)
    }

    pub fn should_exclude_from_critical_tasks(&self, id: &NodeId) -> bool {
        match self.profile(id) {
            None => true,
            Some(p) => {
                p.is_blacklisted
                    || p.reputation_score < 40.0
                    || p.health <= Health::Degraded
                    || p.consecutive_failures > 3
            }
        }
    }

    /// Exclude `id` locally. Reputation drops to the blacklist cap at once.
    pub fn blacklist(&mut self, id: &NodeId, reason: &str) -> Result<()> {
        self.profile_mut(id)?.blacklist(reason);
        warn!(node = %id, reason, "node blacklisted");
        Ok(())
    }

    /// Second chance: clears the blacklist and failure streak and resets
    /// reputation to neutral rather than restoring history.
    pub fn rehabilitate(&mut self, id: &NodeId) -> Result<()> {
        let profile = self.profile_mut(id)?;
        profile.is_blacklisted = false;
        profile.blacklist_reason = None;
        profile.needs_inspection = false;
        profile.consecutive_failures = 0;
        profile.reputation_score = NEUTRAL_REPUTATION;
        info!(node = %id, "node rehabilitated");
        Ok(())
    }

    /// Fold frames lost between two receptions into link reliability.
    pub fn record_link_quality(&mut self, id: &NodeId, missed: u8) {
        let alpha = self.config.smoothing;
        if let Ok(profile) = self.profile_mut(id) {
            let sample = 1.0 / (1.0 + f32::from(missed));
            profile.communication_reliability =
                ((1.0 - alpha) * profile.communication_reliability + alpha * sample).clamp(0.0, 1.0);
        }
    }

    /// Fold a finished task into the mission success rate.
    pub fn record_mission(&mut self, id: &NodeId, success: bool) {
        let alpha = self.config.smoothing;
        if let Ok(profile) = self.profile_mut(id) {
            let sample = if success { 1.0 } else { 0.0 };
            profile.mission_success_rate =
                ((1.0 - alpha) * profile.mission_success_rate + alpha * sample).clamp(0.0, 1.0);
            profile.total_missions = profile.total_missions.saturating_add(1);
        }
    }

    /// Weak nodes, capability gaps and upgrade advice. Weak nodes are
    /// flagged for inspection.
    pub fn analyze(&mut self, now: Millis) -> EcosystemReport {
        let mut report = EcosystemReport {
            at: now,
            ..EcosystemReport::default()
        };
        for profile in &mut self.profiles {
            let reasons = weaknesses(profile);
            if !reasons.is_empty() {
                profile.needs_inspection = true;
                warn!(node = %profile.id, ?reasons, "weak node");
                report.weak_nodes.push(WeakNode {
                    id: profile.id,
                    reasons,
                });
            }
            let recs = recommendations(profile);
            profile.needs_upgrade = !recs.is_empty();
            if !recs.is_empty() {
                report.upgrades.push(UpgradeAdvice {
                    id: profile.id,
                    recommendations: recs,
                });
            }
        }
        report.gaps = capability_gaps(self.profiles.iter());
        if !report.gaps.is_empty() {
            info!(gaps = ?report.gaps, "capability gaps");
        }
        self.last_analysis = now;
        report
    }

    pub fn swarm_health(&self) -> SwarmHealth {
        swarm_health(self.profiles.iter())
    }

    /// Periodic work: reputation refresh, ecosystem analysis and the
    /// liveness sweep, each on its own interval.
    pub fn update(&mut self, now: Millis) -> EcosystemUpdate {
        let mut out = EcosystemUpdate::default();
        if elapsed(now, self.last_reputation_update) >= self.config.reputation_interval_ms {
            self.update_all_reputations(now);
            out.reputations_refreshed = true;
        }
        if elapsed(now, self.last_analysis) >= self.config.analysis_interval_ms {
            out.report = Some(self.analyze(now));
        }
        let timeout = self.config.liveness_timeout_ms;
        if elapsed(now, self.last_liveness_sweep) >= timeout {
            self.last_liveness_sweep = now;
            for profile in &mut self.profiles {
                if elapsed(now, profile.last_seen) > timeout {
                    profile.consecutive_failures = profile.consecutive_failures.saturating_add(1);
                    profile.availability_score *= 0.9;
                    out.silent.push(profile.id);
                }
            }
            if !out.silent.is_empty() {
                debug!(silent = out.silent.len(), "liveness sweep");
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{CapabilityGap, Recommendation};

    fn id(n: u8) -> NodeId {
        NodeId([0x02, 0, 0, 0, 0, n])
    }

    fn manager_with(n: u8) -> EcosystemManager {
        let mut m = EcosystemManager::default();
        for i in 1..=n {
            m.register_node(id(i), NodeKind::Wheelie, 0).unwrap();
        }
        m
    }

    #[test]
    fn registration_is_idempotent_and_bounded() {
        let mut m = EcosystemManager::new(EcosystemConfig::default().with_max_profiles(2));
        m.register_node(id(1), NodeKind::Scout, 0).unwrap();
        m.register_node(id(1), NodeKind::Scout, 50).unwrap();
        m.register_node(id(2), NodeKind::Heavy, 0).unwrap();
        assert_eq!(m.len(), 2);
        assert_eq!(m.profile(&id(1)).unwrap().last_seen, 50);
        assert!(matches!(
            m.register_node(id(3), NodeKind::Scout, 0),
            Err(Error::CapacityExceeded { capacity: 2, .. })
        ));
        assert_eq!(m.update_status(&id(9), 1, 0.5, 0), Err(Error::UnknownNode(id(9))));
    }

    #[test]
    fn blacklist_caps_and_rehabilitate_resets() {
        let mut m = manager_with(1);
        m.calculate_reputation(&id(1), 0);
        m.blacklist(&id(1), "test").unwrap();
        let p = m.profile(&id(1)).unwrap();
        assert!(p.reputation_score <= 25.0);
        assert!(p.needs_inspection);
        assert_eq!(m.calculate_reputation(&id(1), 1), Some(25.0));
        assert!(!m.should_trust(&id(1), 0.1));

        m.rehabilitate(&id(1)).unwrap();
        let p = m.profile(&id(1)).unwrap();
        assert_eq!(p.reputation_score, 50.0);
        assert!(!p.is_blacklisted && !p.needs_inspection);
        assert!(m.should_trust(&id(1), 0.3));
    }

    #[test]
    fn should_trust_checks_every_gate() {
        let mut m = manager_with(1);
        assert!(m.should_trust(&id(1), 0.5));
        assert!(!m.should_trust(&id(1), 0.9));
        m.update_health(&id(1), Health::Failing, 0).unwrap();
        assert!(!m.should_trust(&id(1), 0.3));
        assert!(m.profile(&id(1)).unwrap().needs_inspection);
        assert!(!m.should_trust(&id(7), 0.0));
        assert!(!m.is_trusted(&id(1)));
    }

    #[test]
    fn contradicted_reports_lower_accuracy_and_trust() {
        let mut m = manager_with(2);
        m.record_data_verification(id(1), id(2), 0xAA, false, 0.9, 10);
        let p = m.profile(&id(1)).unwrap();
        assert_eq!((p.total_data_sent, p.data_verified_bad), (1, 1));
        assert!(p.data_accuracy < 0.8);
        assert!((m.trust_score(&id(1), &id(2)) - 0.4).abs() < 1e-6);
        assert_eq!(m.verifications().len(), 1);
        assert_eq!(m.verifications().for_hash(0xAA).count(), 1);
    }

    #[test]
    fn repeated_contradictions_blacklist_sender() {
        let mut m = manager_with(2);
        for i in 0..5 {
            assert!(!m.profile(&id(1)).unwrap().is_blacklisted, "blacklisted after {i}");
            m.record_data_verification(id(1), id(2), i, false, 1.0, i);
        }
        let p = m.profile(&id(1)).unwrap();
        assert!(p.is_blacklisted);
        assert!(p.needs_inspection);
        assert_eq!(p.blacklist_reason.as_deref(), Some("repeatedly contradicted data"));
        assert!(p.reputation_score <= 25.0);
    }

    #[test]
    fn best_candidate_by_suitability() {
        let mut m = manager_with(3);
        m.update_health(&id(1), Health::Failing, 0).unwrap();
        m.update_health(&id(3), Health::Excellent, 0).unwrap();
        assert_eq!(m.select_best_for_task(&[id(1), id(2), id(3), id(9)]), Some(id(3)));
        m.blacklist(&id(3), "test").unwrap();
        assert_eq!(m.select_best_for_task(&[id(1), id(3)]), None);
        assert_eq!(m.select_best_for_task(&[]), None);
    }

    #[test]
    fn critical_task_exclusion() {
        let mut m = manager_with(2);
        assert!(!m.should_exclude_from_critical_tasks(&id(1)));
        assert!(m.should_exclude_from_critical_tasks(&id(9)));
        m.update_health(&id(2), Health::Degraded, 0).unwrap();
        assert!(m.should_exclude_from_critical_tasks(&id(2)));
    }

    #[test]
    fn liveness_sweep_penalizes_silent_nodes() {
        let mut m = manager_with(2);
        m.touch(&id(2), 25_000);
        let out = m.update(31_000);
        assert_eq!(out.silent, vec![id(1)]);
        let p = m.profile(&id(1)).unwrap();
        assert_eq!(p.consecutive_failures, 1);
        assert!((p.availability_score - 0.9).abs() < 1e-6);
        // next sweep only after another timeout
        assert!(m.update(40_000).silent.is_empty());
        assert_eq!(m.update(61_000).silent, vec![id(1), id(2)]);
        m.update_status(&id(1), 3, 0.7, 62_000).unwrap();
        assert_eq!(m.profile(&id(1)).unwrap().consecutive_failures, 0);
    }

    #[test]
    fn periodic_reputation_and_analysis() {
        let mut m = EcosystemManager::new(
            EcosystemConfig::default()
                .with_reputation_interval(1_000)
                .with_analysis_interval(5_000)
                .with_liveness_timeout(1_000_000),
        );
        m.register_node(id(1), NodeKind::Wheelie, 0).unwrap();
        let out = m.update(1_000);
        assert!(out.reputations_refreshed);
        assert!(out.report.is_none());
        assert!((m.profile(&id(1)).unwrap().reputation_score - 87.0).abs() < 1e-3);
        let out = m.update(5_000);
        let report = out.report.unwrap();
        assert!(report.gaps.contains(&CapabilityGap::NoScout));
    }

    #[test]
    fn analysis_flags_weak_nodes_and_gaps() {
        let mut m = manager_with(5);
        m.update_health(&id(1), Health::Degraded, 0).unwrap();
        m.update_status(&id(2), 25, 0.3, 0).unwrap();
        let report = m.analyze(100);
        assert_eq!(report.weak_nodes.len(), 1);
        assert_eq!(report.weak_nodes[0].id, id(1));
        assert!(m.profile(&id(1)).unwrap().needs_inspection);
        assert_eq!(
            report.gaps,
            vec![CapabilityGap::NoScout, CapabilityGap::NoManipulator, CapabilityGap::NoHeavy]
        );
        let fresh = report.upgrades.iter().find(|u| u.id == id(2)).unwrap();
        assert_eq!(fresh.recommendations, vec![Recommendation::FreshStart]);
        assert!(m.profile(&id(2)).unwrap().needs_upgrade);
    }

    #[test]
    fn link_quality_and_missions_move_metrics() {
        let mut m = manager_with(1);
        m.record_link_quality(&id(1), 3);
        let p = m.profile(&id(1)).unwrap();
        assert!((p.communication_reliability - 0.925).abs() < 1e-6);
        m.record_mission(&id(1), false);
        let p = m.profile(&id(1)).unwrap();
        assert!((p.mission_success_rate - 0.72).abs() < 1e-6);
        assert_eq!(p.total_missions, 1);
    }

    #[test]
    fn deactivate_removes_and_marks_relationships() {
        let mut m = manager_with(2);
        m.record_interaction(id(1), id(2), InteractionKind::Localization, Outcome::Success, 0)
            .unwrap();
        assert!(m.deactivate(&id(1)).is_some());
        assert!(m.profile(&id(1)).is_none());
        assert!(!m.relationships().get(&id(1), &id(2)).unwrap().is_active);
        assert!(m.deactivate(&id(1)).is_none());
    }

    #[test]
    fn swarm_health_summary() {
        let mut m = manager_with(2);
        assert_eq!(EcosystemManager::default().swarm_health().overall_percent, 0.0);
        m.update_health(&id(1), Health::Excellent, 0).unwrap();
        m.update_health(&id(2), Health::Degraded, 0).unwrap();
        m.calculate_reputation(&id(1), 0);
        m.calculate_reputation(&id(2), 0);
        let h = m.swarm_health();
        assert!((h.overall_percent - 80.0).abs() < 1e-4);
        assert_eq!((h.healthy, h.degraded, h.total), (1, 1, 2));
        assert_eq!(h.most_trusted, Some(id(1)));
        assert_eq!(h.least_trusted, Some(id(2)));
    }

    #[test]
    fn snapshot_round_trips_through_json() {
        let mut m = manager_with(2);
        m.record_interaction(id(1), id(2), InteractionKind::ResourceShare, Outcome::Partial, 5)
            .unwrap();
        let json = serde_json::to_string(&m.snapshot()).unwrap();
        let restored = EcosystemManager::restore(
            EcosystemConfig::default(),
            serde_json::from_str(&json).unwrap(),
        );
        assert_eq!(restored.snapshot(), m.snapshot());
    }
}
