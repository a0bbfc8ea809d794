//! In-memory swarm over a lossy broadcast medium.
//!
//! Every step ticks each node once at the shared simulated time, then
//! delivers what they sent to every other node, dropping each copy with
//! the configured probability. Runs are reproducible for a given seed.

use chorus_wire::{EmotionalState, EnvironmentalContext, Millis, NodeId};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

use crate::config::NodeConfig;
use crate::error::Result;
use crate::io::{Collaborators, Outbox, Situation};
use crate::node::Node;
use crate::snapshot::MemoryStore;

pub struct Member {
    pub node: Node,
    pub situation: Situation,
    pub store: MemoryStore,
    outbox: Outbox,
}

/// Medium counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MediumStats {
    pub sent: u64,
    pub delivered: u64,
    pub dropped: u64,
}

pub struct Swarm {
    members: Vec<Member>,
    rng: StdRng,
    loss: f64,
    now: Millis,
    step_ms: Millis,
    stats: MediumStats,
}

impl Swarm {
    /// `size` nodes cloned from `template` with seeds `seed, seed + 1, ...`.
    pub fn new(size: usize, template: NodeConfig, loss: f64, seed: u64) -> Result<Self> {
        let configs = (0..size as u64)
            .map(|i| template.clone().with_seed(seed.wrapping_add(i)))
            .collect();
        Self::with_configs(configs, loss, seed)
    }

    pub fn with_configs(configs: Vec<NodeConfig>, loss: f64, seed: u64) -> Result<Self> {
        let step_ms = configs.first().map_or(100, |c| c.tick_ms.max(1));
        let members = configs
            .into_iter()
            .map(|config| {
                let situation = Situation::new(EnvironmentalContext::Exploring, EmotionalState::Neutral);
                let outbox = Outbox::default();
                let store = MemoryStore::new();
                let io = Collaborators::manual(situation.clone(), outbox.clone(), Some(Box::new(store.clone())));
                Ok(Member {
                    node: Node::new(config, io)?,
                    situation,
                    store,
                    outbox,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            members,
            rng: StdRng::seed_from_u64(seed),
            loss: if loss.is_nan() { 0.0 } else { loss.clamp(0.0, 1.0) },
            now: 0,
            step_ms,
            stats: MediumStats::default(),
        })
    }

    pub fn now(&self) -> Millis {
        self.now
    }

    pub fn stats(&self) -> MediumStats {
        self.stats
    }

    pub fn members(&self) -> &[Member] {
        &self.members
    }

    pub fn member(&self, index: usize) -> Option<&Member> {
        self.members.get(index)
    }

    pub fn member_mut(&mut self, index: usize) -> Option<&mut Member> {
        self.members.get_mut(index)
    }

    pub fn ids(&self) -> Vec<NodeId> {
        self.members.iter().map(|m| m.node.id()).collect()
    }

    /// Who each node believes leads.
    pub fn leaders(&self) -> Vec<Option<NodeId>> {
        self.members
            .iter()
            .map(|m| m.node.coordination().leader())
            .collect()
    }

    /// One tick for everyone, then one round of delivery.
    pub fn step(&mut self) {
        for member in &mut self.members {
            member.node.tick(self.now);
        }
        for from in 0..self.members.len() {
            for frame in self.members[from].outbox.take() {
                self.stats.sent += 1;
                for to in 0..self.members.len() {
                    if to == from {
                        continue;
                    }
                    if self.rng.gen_bool(self.loss) {
                        self.stats.dropped += 1;
                        continue;
                    }
                    self.members[to].node.enqueue(frame.clone());
                    self.stats.delivered += 1;
                }
            }
        }
        self.now = self.now.wrapping_add(self.step_ms);
    }

    /// Step until `duration` of simulated time has passed.
    pub fn run_for(&mut self, duration: Millis) {
        let steps = duration / self.step_ms;
        for _ in 0..steps {
            self.step();
        }
        debug!(now = self.now, sent = self.stats.sent, dropped = self.stats.dropped, "simulation advanced");
    }

    /// Give every node a random situation.
    pub fn shuffle_situations(&mut self) {
        for member in &self.members {
            let context = EnvironmentalContext::ALL[self.rng.gen_range(0..EnvironmentalContext::ALL.len())];
            let emotion = EmotionalState::ALL[self.rng.gen_range(0..EmotionalState::ALL.len())];
            member.situation.set(context, emotion);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn perfect_medium_delivers_everything() {
        let mut swarm = Swarm::new(3, NodeConfig::default(), 0.0, 1).unwrap();
        swarm.step();
        let stats = swarm.stats();
        assert!(stats.sent > 0);
        assert_eq!(stats.delivered, stats.sent * 2);
        assert_eq!(stats.dropped, 0);
    }

    #[test]
    fn dead_medium_delivers_nothing() {
        let mut swarm = Swarm::new(2, NodeConfig::default(), 1.0, 1).unwrap();
        swarm.run_for(5_000);
        assert_eq!(swarm.stats().delivered, 0);
        assert!(swarm.members().iter().all(|m| m.node.peers().is_empty()));
    }
}
