//! Ecosystem-wide findings produced by the periodic analysis.

use std::fmt;

use chorus_wire::{Health, Millis, NodeId, NodeKind};
use serde::{Deserialize, Serialize};

use crate::profile::BotProfile;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Weakness {
    LowReputation,
    PoorAccuracy,
    HealthIssues,
    CommunicationFailures,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeakNode {
    pub id: NodeId,
    pub reasons: Vec<Weakness>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CapabilityGap {
    /// No scout at all.
    NoScout,
    /// No manipulator in a swarm of more than two.
    NoManipulator,
    /// No heavy unit in a swarm of more than four.
    NoHeavy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Recommendation {
    Maintenance,
    SensorCalibration,
    FreshStart,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpgradeAdvice {
    pub id: NodeId,
    pub recommendations: Vec<Recommendation>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EcosystemReport {
    pub at: Millis,
    pub weak_nodes: Vec<WeakNode>,
    pub gaps: Vec<CapabilityGap>,
    pub upgrades: Vec<UpgradeAdvice>,
}

impl EcosystemReport {
    pub fn is_clean(&self) -> bool {
        self.weak_nodes.is_empty() && self.gaps.is_empty() && self.upgrades.is_empty()
    }
}

pub(crate) fn weaknesses(p: &BotProfile) -> Vec<Weakness> {
    let mut reasons = Vec::new();
    if p.reputation_score < 30.0 {
        reasons.push(Weakness::LowReputation);
    }
    if p.data_accuracy < 0.6 {
        reasons.push(Weakness::PoorAccuracy);
    }
    if p.health <= Health::Degraded {
        reasons.push(Weakness::HealthIssues);
    }
    if p.consecutive_failures > 5 {
        reasons.push(Weakness::CommunicationFailures);
    }
    reasons
}

pub(crate) fn capability_gaps<'a>(profiles: impl Iterator<Item = &'a BotProfile>) -> Vec<CapabilityGap> {
    let (mut total, mut scouts, mut manipulators, mut heavies) = (0usize, 0usize, 0usize, 0usize);
    for p in profiles {
        total += 1;
        match p.kind {
            NodeKind::Scout => scouts += 1,
            NodeKind::Manipulator => manipulators += 1,
            NodeKind::Heavy => heavies += 1,
            _ => {}
        }
    }
    let mut gaps = Vec::new();
    if scouts == 0 {
        gaps.push(CapabilityGap::NoScout);
    }
    if manipulators == 0 && total > 2 {
        gaps.push(CapabilityGap::NoManipulator);
    }
    if heavies == 0 && total > 4 {
        gaps.push(CapabilityGap::NoHeavy);
    }
    gaps
}

pub(crate) fn recommendations(p: &BotProfile) -> Vec<Recommendation> {
    let mut recs = Vec::new();
    if p.health <= Health::Degraded {
        recs.push(Recommendation::Maintenance);
    }
    if p.data_accuracy < 0.7 {
        recs.push(Recommendation::SensorCalibration);
    }
    if p.fitness < 0.5 && p.generation > 20 {
        recs.push(Recommendation::FreshStart);
    }
    recs
}

/// Swarm-wide health summary.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SwarmHealth {
    /// Mean health grade as a percentage, 0 for an empty swarm.
    pub overall_percent: f32,
    pub healthy: usize,
    pub degraded: usize,
    pub total: usize,
    pub most_trusted: Option<NodeId>,
    pub least_trusted: Option<NodeId>,
}

impl fmt::Display for SwarmHealth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Swarm health: {:.1}% ({} nodes, {} healthy, {} degraded)",
            self.overall_percent, self.total, self.healthy, self.degraded
        )
    }
}

pub(crate) fn swarm_health<'a>(profiles: impl Iterator<Item = &'a BotProfile> + Clone) -> SwarmHealth {
    let total = profiles.clone().count();
    let grade_sum: f32 = profiles.clone().map(|p| f32::from(p.health.code())).sum();
    let overall_percent = if total == 0 {
        0.0
    } else {
        grade_sum / (total as f32 * 5.0) * 100.0
    };
    SwarmHealth {
        overall_percent,
        healthy: profiles.clone().filter(|p| p.health >= Health::Good).count(),
        degraded: profiles.clone().filter(|p| p.health <= Health::Degraded).count(),
        total,
        most_trusted: profiles
            .clone()
            .max_by(|a, b| a.reputation_score.total_cmp(&b.reputation_score))
            .map(|p| p.id),
        least_trusted: profiles
            .min_by(|a, b| a.reputation_score.total_cmp(&b.reputation_score))
            .map(|p| p.id),
    }
}
