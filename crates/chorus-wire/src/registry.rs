//! Bounded table of peers heard on the link.

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::{elapsed, Millis, NodeId};

/// Maximum number of swarm peers tracked at once.
pub const MAX_SWARM_PEERS: usize = 8;

/// Default silence after which a peer counts as gone.
pub const PEER_TIMEOUT_MS: Millis = 10_000;

/// How a sequence number relates to the last one seen from the same peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SeqObservation {
    /// First frame from this peer.
    First,
    InOrder,
    /// `n` frames were missed in between.
    Gap(u8),
    /// Same sequence number as last time.
    Duplicate,
    /// Older than the last frame, arrived late.
    Reordered,
}

impl SeqObservation {
    /// Frames lost according to this observation.
    pub const fn missed(self) -> u8 {
        match self {
            Self::Gap(n) => n,
            _ => 0,
        }
    }
}

/// Bookkeeping for one peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerEntry {
    pub id: NodeId,
    pub first_seen: Millis,
    pub last_seen: Millis,
    pub frames_received: u32,
    pub last_seq: u8,
}

impl PeerEntry {
    /// Alive when heard within `timeout`. Pure in `now`.
    pub fn is_alive(&self, now: Millis, timeout: Millis) -> bool {
        elapsed(now, self.last_seen) <= timeout
    }
}

/// Fixed-capacity peer table. New peers are rejected once full.
#[derive(Debug, Clone)]
pub struct PeerRegistry {
    entries: Vec<PeerEntry>,
    capacity: usize,
}

impl Default for PeerRegistry {
    fn default() -> Self {
        Self::new(MAX_SWARM_PEERS)
    }
}

impl PeerRegistry {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Record a frame from `id` carrying `seq`.
    pub fn touch(&mut self, id: NodeId, seq: u8, now: Millis) -> Result<SeqObservation> {
        if let Some(entry) = self.entries.iter_mut().find(|e| e.id == id) {
            entry.last_seen = now;
            entry.frames_received = entry.frames_received.saturating_add(1);
            let step = seq.wrapping_sub(entry.last_seq);
            let observed = match step {
                0 => SeqObservation::Duplicate,
                1 => SeqObservation::InOrder,
                2..=127 => SeqObservation::Gap(step - 1),
                _ => SeqObservation::Reordered,
            };
            if matches!(observed, SeqObservation::InOrder | SeqObservation::Gap(_)) {
                entry.last_seq = seq;
            }
            trace!(peer = %id, seq, ?observed, "peer touched");
            return Ok(observed);
        }

        if self.entries.len() >= self.capacity {
            debug!(peer = %id, capacity = self.capacity, "peer registry full, ignoring newcomer");
            return Err(Error::CapacityExceeded {
                what: "peer registry",
                capacity: self.capacity,
            });
        }
        self.entries.push(PeerEntry {
            id,
            first_seen: now,
            last_seen: now,
            frames_received: 1,
            last_seq: seq,
        });
        debug!(peer = %id, peers = self.entries.len(), "new peer");
        Ok(SeqObservation::First)
    }

    pub fn get(&self, id: &NodeId) -> Option<&PeerEntry> {
        self.entries.iter().find(|e| e.id == *id)
    }

    /// Unknown peers are never alive.
    pub fn is_alive(&self, id: &NodeId, now: Millis, timeout: Millis) -> bool {
        self.get(id).is_some_and(|e| e.is_alive(now, timeout))
    }

    /// Identities heard within `timeout`.
    pub fn alive_peers(&self, now: Millis, timeout: Millis) -> Vec<NodeId> {
        self.entries
            .iter()
            .filter(|e| e.is_alive(now, timeout))
            .map(|e| e.id)
            .collect()
    }

    /// Drop peers silent for longer than `max_age`. Returns how many went.
    pub fn expire(&mut self, now: Millis, max_age: Millis) -> usize {
        let before = self.entries.len();
        self.entries.retain(|e| e.is_alive(now, max_age));
        let removed = before - self.entries.len();
        if removed > 0 {
            debug!(removed, remaining = self.entries.len(), "expired silent peers");
        }
        removed
    }

    pub fn iter(&self) -> impl Iterator<Item = &PeerEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer(n: u8) -> NodeId {
        NodeId([n, 0, 0, 0, 0, 1])
    }

    #[test]
    fn classifies_sequence_numbers() {
        let mut reg = PeerRegistry::default();
        assert_eq!(reg.touch(peer(1), 10, 0).unwrap(), SeqObservation::First);
        assert_eq!(reg.touch(peer(1), 11, 5).unwrap(), SeqObservation::InOrder);
        assert_eq!(reg.touch(peer(1), 11, 6).unwrap(), SeqObservation::Duplicate);
        assert_eq!(reg.touch(peer(1), 15, 7).unwrap(), SeqObservation::Gap(3));
        assert_eq!(reg.touch(peer(1), 13, 8).unwrap(), SeqObservation::Reordered);
        assert_eq!(reg.get(&peer(1)).unwrap().last_seq, 15);
        assert_eq!(reg.get(&peer(1)).unwrap().frames_received, 5);
    }

    #[test]
    fn sequence_wraps() {
        let mut reg = PeerRegistry::default();
        reg.touch(peer(1), 255, 0).unwrap();
        assert_eq!(reg.touch(peer(1), 0, 1).unwrap(), SeqObservation::InOrder);
        assert_eq!(SeqObservation::Gap(4).missed(), 4);
        assert_eq!(SeqObservation::Duplicate.missed(), 0);
    }

    #[test]
    fn rejects_newcomers_when_full() {
        let mut reg = PeerRegistry::new(2);
        reg.touch(peer(1), 0, 0).unwrap();
        reg.touch(peer(2), 0, 0).unwrap();
        assert!(matches!(
            reg.touch(peer(3), 0, 0),
            Err(Error::CapacityExceeded { capacity: 2, .. })
        ));
        // known peers still update
        assert!(reg.touch(peer(1), 1, 10).is_ok());
        assert_eq!(reg.len(), 2);
    }

    #[test]
    fn liveness_is_a_function_of_elapsed_time() {
        let mut reg = PeerRegistry::default();
        reg.touch(peer(1), 0, 1_000).unwrap();
        reg.touch(peer(2), 0, 9_000).unwrap();
        assert!(reg.is_alive(&peer(1), 11_000, PEER_TIMEOUT_MS));
        assert!(!reg.is_alive(&peer(1), 11_001, PEER_TIMEOUT_MS));
        assert!(!reg.is_alive(&peer(9), 0, PEER_TIMEOUT_MS));
        assert_eq!(reg.alive_peers(12_000, PEER_TIMEOUT_MS), vec![peer(2)]);
        assert_eq!(reg.expire(12_000, PEER_TIMEOUT_MS), 1);
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn liveness_survives_clock_wrap() {
        let mut reg = PeerRegistry::default();
        reg.touch(peer(1), 0, u32::MAX - 500).unwrap();
        assert!(reg.is_alive(&peer(1), 1_000, PEER_TIMEOUT_MS));
    }
}
