//! Coordination timing and pool sizes.

use chorus_wire::Millis;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinationConfig {
    /// How long bids are collected before a leader is picked.
    pub election_window_ms: Millis,
    pub max_candidates: usize,
    /// A leader silent this long is presumed lost.
    pub leader_timeout_ms: Millis,
    pub task_capacity: usize,
    pub default_task_deadline_ms: Millis,
    pub proposal_capacity: usize,
    pub voting_window_ms: Millis,
    pub max_votes: usize,
    /// Votes needed before any quorum rule is evaluated.
    pub min_participants: usize,
    pub emergency_scale: f32,
    /// Formation age after which the swarm counts as flocking.
    pub flocking_after_ms: Millis,
}

impl Default for CoordinationConfig {
    fn default() -> Self {
        Self {
            election_window_ms: 10_000,
            max_candidates: 8,
            leader_timeout_ms: 30_000,
            task_capacity: 32,
            default_task_deadline_ms: 30_000,
            proposal_capacity: 8,
            voting_window_ms: 15_000,
            max_votes: 8,
            min_participants: 2,
            emergency_scale: 2.0,
            flocking_after_ms: 30_000,
        }
    }
}

impl CoordinationConfig {
    #[must_use]
    pub fn with_election_window(mut self, window: Millis) -> Self {
        self.election_window_ms = window;
        self
    }

    #[must_use]
    pub fn with_leader_timeout(mut self, timeout: Millis) -> Self {
        self.leader_timeout_ms = timeout;
        self
    }

    #[must_use]
    pub fn with_task_capacity(mut self, capacity: usize) -> Self {
        self.task_capacity = capacity;
        self
    }

    #[must_use]
    pub fn with_voting_window(mut self, window: Millis) -> Self {
        self.voting_window_ms = window;
        self
    }

    #[must_use]
    pub fn with_proposal_capacity(mut self, capacity: usize) -> Self {
        self.proposal_capacity = capacity;
        self
    }
}
