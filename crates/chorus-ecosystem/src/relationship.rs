//! Undirected pairwise trust between nodes.

use std::collections::VecDeque;

use chorus_wire::{Millis, NodeId, Outcome};
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::error::{Error, Result};

/// Interactions remembered per relationship.
pub const HISTORY_LEN: usize = 10;

/// Trust for pairs that never interacted.
pub const NEUTRAL_TRUST: f32 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InteractionKind {
    DataShare,
    TaskCollaboration,
    Emergency,
    Localization,
    ResourceShare,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interaction {
    pub kind: InteractionKind,
    pub outcome: Outcome,
    pub at: Millis,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BotRelationship {
    pub a: NodeId,
    pub b: NodeId,
    pub trust: f32,
    pub interactions: u32,
    pub successful: u32,
    pub failed: u32,
    /// Last [`HISTORY_LEN`] interactions, oldest first.
    pub history: VecDeque<Interaction>,
    pub data_shared: u32,
    pub data_verified: u32,
    pub data_contradicted: u32,
    pub last_interaction: Millis,
    pub is_active: bool,
}

impl BotRelationship {
    fn new(a: NodeId, b: NodeId, now: Millis) -> Self {
        Self {
            a,
            b,
            trust: NEUTRAL_TRUST,
            interactions: 0,
            successful: 0,
            failed: 0,
            history: VecDeque::with_capacity(HISTORY_LEN),
            data_shared: 0,
            data_verified: 0,
            data_contradicted: 0,
            last_interaction: now,
            is_active: true,
        }
    }

    /// True when the relationship links `x` and `y` in either order.
    pub fn links(&self, x: &NodeId, y: &NodeId) -> bool {
        (self.a == *x && self.b == *y) || (self.a == *y && self.b == *x)
    }

    pub fn involves(&self, id: &NodeId) -> bool {
        self.a == *id || self.b == *id
    }

    fn record(&mut self, kind: InteractionKind, outcome: Outcome, now: Millis) {
        if self.history.len() == HISTORY_LEN {
            self.history.pop_front();
        }
        self.history.push_back(Interaction { kind, outcome, at: now });
        self.interactions = self.interactions.saturating_add(1);
        if outcome.is_success() {
            self.successful = self.successful.saturating_add(1);
        } else {
            self.failed = self.failed.saturating_add(1);
        }
        if kind == InteractionKind::DataShare {
            self.data_shared = self.data_shared.saturating_add(1);
            match outcome {
                Outcome::Contradicted => self.data_contradicted = self.data_contradicted.saturating_add(1),
                o if o.is_success() => self.data_verified = self.data_verified.saturating_add(1),
                _ => {}
            }
        }
        self.trust = (self.trust + outcome.trust_delta()).clamp(0.0, 1.0);
        self.last_interaction = now;
        self.is_active = true;
    }
}

/// Bounded set of relationships, created lazily.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationshipTable {
    relationships: Vec<BotRelationship>,
    capacity: usize,
}

impl RelationshipTable {
    pub fn new(capacity: usize) -> Self {
        Self {
            relationships: Vec::with_capacity(capacity),
            capacity,
        }
    }

    pub fn get(&self, x: &NodeId, y: &NodeId) -> Option<&BotRelationship> {
        self.relationships.iter().find(|r| r.links(x, y))
    }

    /// Pair trust, neutral when the pair never interacted.
    pub fn trust(&self, x: &NodeId, y: &NodeId) -> f32 {
        self.get(x, y).map_or(NEUTRAL_TRUST, |r| r.trust)
    }

    /// Record one interaction and return the new pair trust.
    pub fn record(
        &mut self,
        x: NodeId,
        y: NodeId,
        kind: InteractionKind,
        outcome: Outcome,
        now: Millis,
    ) -> Result<f32> {
        let index = match self.relationships.iter().position(|r| r.links(&x, &y)) {
            Some(i) => i,
            None if self.relationships.len() < self.capacity => {
                self.relationships.push(BotRelationship::new(x, y, now));
                self.relationships.len() - 1
            }
            None => {
                return Err(Error::CapacityExceeded {
                    what: "relationship table",
                    capacity: self.capacity,
                })
            }
        };
        let rel = &mut self.relationships[index];
        rel.record(kind, outcome, now);
        trace!(a = %x, b = %y, ?kind, ?outcome, trust = rel.trust, "interaction recorded");
        Ok(rel.trust)
    }

    /// Mark every relationship of `id` inactive.
    pub fn deactivate(&mut self, id: &NodeId) -> usize {
        let mut n = 0;
        for rel in self.relationships.iter_mut().filter(|r| r.involves(id)) {
            rel.is_active = false;
            n += 1;
        }
        n
    }

    pub fn iter(&self) -> impl Iterator<Item = &BotRelationship> {
        self.relationships.iter()
    }

    pub fn len(&self) -> usize {
        self.relationships.len()
    }

    pub fn is_empty(&self) -> bool {
        self.relationships.is_empty()
    }
}
