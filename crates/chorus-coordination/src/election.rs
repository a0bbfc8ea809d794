//! Leader election.
//!
//! Bids are collected for a fixed window, then every node runs the same
//! comparison over the bids it heard. Nothing confirms the result across
//! nodes, so two nodes that heard different bids may both consider
//! themselves leader until the next round.

use std::cmp::Ordering;

use chorus_wire::{elapsed, LeaderBid, Millis, NodeId};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ElectionState {
    Idle,
    Collecting { started_at: Millis },
    Resolved { leader: NodeId, at: Millis },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub id: NodeId,
    pub bid: LeaderBid,
    pub received_at: Millis,
}

/// Total order over candidates: higher fitness, then higher generation,
/// then the lower identity.
pub fn rank(a: &Candidate, b: &Candidate) -> Ordering {
    a.bid
        .fitness
        .total_cmp(&b.bid.fitness)
        .then(a.bid.generation.cmp(&b.bid.generation))
        .then(b.id.cmp(&a.id))
}

#[derive(Debug, Clone)]
pub struct Election {
    local: NodeId,
    window: Millis,
    capacity: usize,
    state: ElectionState,
    candidates: Vec<Candidate>,
    leader: Option<NodeId>,
}

impl Election {
    pub fn new(local: NodeId, window: Millis, capacity: usize) -> Self {
        Self {
            local,
            window,
            capacity,
            state: ElectionState::Idle,
            candidates: Vec::with_capacity(capacity),
            leader: None,
        }
    }

    pub fn state(&self) -> ElectionState {
        self.state
    }

    pub fn leader(&self) -> Option<NodeId> {
        self.leader
    }

    pub fn is_leader(&self) -> bool {
        self.leader == Some(self.local)
    }

    pub fn candidates(&self) -> &[Candidate] {
        &self.candidates
    }

    pub fn is_collecting(&self) -> bool {
        matches!(self.state, ElectionState::Collecting { .. })
    }

    /// Open a fresh collection round. The current leader stays until the
    /// round resolves.
    pub fn start(&mut self, now: Millis) {
        self.candidates.clear();
        self.state = ElectionState::Collecting { started_at: now };
        debug!(window_ms = self.window, "election started");
    }

    /// Record a bid. A bid outside a round opens one; a repeated bid from the
    /// same node replaces its earlier one.
    pub fn submit(&mut self, id: NodeId, bid: LeaderBid, now: Millis) -> Result<()> {
        if !self.is_collecting() {
            self.start(now);
        }
        let candidate = Candidate {
            id,
            bid,
            received_at: now,
        };
        if let Some(existing) = self.candidates.iter_mut().find(|c| c.id == id) {
            *existing = candidate;
            return Ok(());
        }
        if self.candidates.len() >= self.capacity {
            return Err(Error::CapacityExceeded {
                what: "election candidates",
                capacity: self.capacity,
            });
        }
        self.candidates.push(candidate);
        debug!(candidate = %id, fitness = bid.fitness, generation = bid.generation, "bid received");
        Ok(())
    }

    /// Resolve once the window has passed. Returns the leader picked by this
    /// call, if any.
    pub fn update(&mut self, now: Millis) -> Option<NodeId> {
        let ElectionState::Collecting { started_at } = self.state else {
            return None;
        };
        if elapsed(now, started_at) < self.window {
            return None;
        }
        let Some(winner) = self.candidates.iter().max_by(|a, b| rank(a, b)).map(|c| c.id) else {
            self.state = ElectionState::Idle;
            debug!("election closed without bids");
            return None;
        };
        self.leader = Some(winner);
        self.state = ElectionState::Resolved { leader: winner, at: now };
        info!(leader = %winner, candidates = self.candidates.len(), local = winner == self.local, "leader elected");
        Some(winner)
    }

    /// Forget the current leader, e.g. after it went silent.
    pub fn leader_lost(&mut self) {
        if let Some(leader) = self.leader.take() {
            info!(leader = %leader, "leader lost");
        }
        self.state = ElectionState::Idle;
    }
}
