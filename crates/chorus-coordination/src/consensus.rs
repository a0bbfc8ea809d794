//! Timed consensus voting over discrete decision topics.
//!
//! Quorum is measured against the number of voters the proposer expects,
//! never against the votes that happened to arrive:
//! - majority: more than half
//! - supermajority: more than two thirds
//! - unanimous: every expected voter, same choice
//! - weighted: confidence-weighted support above half the expected weight
//! - expert: the named node's vote
//!
//! No rule is evaluated before `min_participants` votes are in.

use std::cmp::Ordering;

use chorus_wire::{elapsed, ConsensusType, DecisionTopic, Millis, NodeId};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Error, Result};

/// Votes needed for a simple majority of `expected` voters.
pub const fn majority_threshold(expected: usize) -> usize {
    expected / 2 + 1
}

/// Votes needed for more than two thirds of `expected` voters.
pub const fn supermajority_threshold(expected: usize) -> usize {
    expected * 2 / 3 + 1
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProposalKey {
    pub proposer: NodeId,
    pub id: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Vote {
    pub voter: NodeId,
    pub choice: u8,
    pub confidence: f32,
    pub at: Millis,
}

/// Current front runner of a proposal.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Leading {
    pub choice: u8,
    pub votes: usize,
    /// Summed confidence of the votes for `choice`.
    pub support: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ProposalState {
    Open,
    Decided { choice: u8 },
    /// The window closed without a quorum.
    NoConsensus { leading: Option<u8> },
}

impl ProposalState {
    pub fn is_resolved(&self) -> bool {
        !matches!(self, Self::Open)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Proposal {
    pub key: ProposalKey,
    pub topic: DecisionTopic,
    pub consensus: ConsensusType,
    pub opened_at: Millis,
    pub window_ms: Millis,
    pub expected_voters: u8,
    pub votes: Vec<Vote>,
    pub leading: Option<Leading>,
    pub state: ProposalState,
}

impl Proposal {
    fn expected(&self) -> usize {
        usize::from(self.expected_voters).max(self.votes.len())
    }

    fn tally(&self) -> Option<Leading> {
        let mut best: Option<Leading> = None;
        for vote in &self.votes {
            let (votes, support) = self
                .votes
                .iter()
                .filter(|v| v.choice == vote.choice)
                .fold((0usize, 0.0f32), |(n, s), v| (n + 1, s + v.confidence));
            let candidate = Leading {
                choice: vote.choice,
                votes,
                support,
            };
            let better = best.map_or(true, |b| {
                votes
                    .cmp(&b.votes)
                    .then(support.total_cmp(&b.support))
                    .then(b.choice.cmp(&vote.choice))
                    == Ordering::Greater
            });
            if better {
                best = Some(candidate);
            }
        }
        best
    }

    fn decision(&self, min_participants: usize) -> Option<u8> {
        let leading = self.leading?;
        if self.votes.len() < min_participants {
            return None;
        }
        let expected = self.expected();
        let reached = match self.consensus {
            ConsensusType::Majority => leading.votes >= majority_threshold(expected),
            ConsensusType::Supermajority => leading.votes >= supermajority_threshold(expected),
            ConsensusType::Unanimous => leading.votes == expected,
            ConsensusType::Weighted => leading.support > expected as f32 / 2.0,
            ConsensusType::Expert(expert) => {
                return self.votes.iter().find(|v| v.voter == expert).map(|v| v.choice);
            }
        };
        reached.then_some(leading.choice)
    }
}

/// Bounded set of open and recently resolved proposals.
#[derive(Debug, Clone)]
pub struct ConsensusBook {
    proposals: Vec<Proposal>,
    capacity: usize,
    window: Millis,
    max_votes: usize,
    min_participants: usize,
    next_id: u16,
}

impl ConsensusBook {
    pub fn new(capacity: usize, window: Millis, max_votes: usize, min_participants: usize) -> Self {
        Self {
            proposals: Vec::with_capacity(capacity),
            capacity,
            window,
            max_votes,
            min_participants,
            next_id: 1,
        }
    }

    pub fn window(&self) -> Millis {
        self.window
    }

    pub fn get(&self, key: &ProposalKey) -> Option<&Proposal> {
        self.proposals.iter().find(|p| p.key == *key)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Proposal> {
        self.proposals.iter()
    }

    pub fn open(&self) -> impl Iterator<Item = &Proposal> {
        self.proposals.iter().filter(|p| !p.state.is_resolved())
    }

    fn reserve(&mut self) -> Result<()> {
        if self.proposals.len() < self.capacity {
            return Ok(());
        }
        match self.proposals.iter().position(|p| p.state.is_resolved()) {
            Some(index) => {
                self.proposals.remove(index);
                Ok(())
            }
            None => Err(Error::CapacityExceeded {
                what: "proposal pool",
                capacity: self.capacity,
            }),
        }
    }

    /// Open a proposal of our own.
    pub fn propose(
        &mut self,
        proposer: NodeId,
        topic: DecisionTopic,
        consensus: ConsensusType,
        expected_voters: u8,
        now: Millis,
    ) -> Result<ProposalKey> {
        self.reserve()?;
        let key = ProposalKey {
            proposer,
            id: self.next_id,
        };
        self.next_id = self.next_id.wrapping_add(1).max(1);
        let window = self.window;
        self.insert(key, topic, consensus, window, expected_voters, now);
        Ok(key)
    }

    /// Track a proposal heard from another node. Repeats are ignored.
    pub fn track_remote(
        &mut self,
        key: ProposalKey,
        topic: DecisionTopic,
        consensus: ConsensusType,
        window_ms: Millis,
        expected_voters: u8,
        now: Millis,
    ) -> Result<()> {
        if self.get(&key).is_some() {
            return Ok(());
        }
        self.reserve()?;
        self.insert(key, topic, consensus, window_ms, expected_voters, now);
        Ok(())
    }

    fn insert(
        &mut self,
        key: ProposalKey,
        topic: DecisionTopic,
        consensus: ConsensusType,
        window_ms: Millis,
        expected_voters: u8,
        now: Millis,
    ) {
        debug!(proposer = %key.proposer, id = key.id, ?topic, ?consensus, expected_voters, "proposal opened");
        self.proposals.push(Proposal {
            key,
            topic,
            consensus,
            opened_at: now,
            window_ms,
            expected_voters,
            votes: Vec::with_capacity(self.max_votes),
            leading: None,
            state: ProposalState::Open,
        });
    }

    /// Count a vote and return the proposal state afterwards. Late votes on
    /// a resolved proposal are ignored.
    pub fn vote(
        &mut self,
        key: &ProposalKey,
        voter: NodeId,
        choice: u8,
        confidence: f32,
        now: Millis,
    ) -> Result<ProposalState> {
        let max_votes = self.max_votes;
        let min_participants = self.min_participants;
        let proposal = self
            .proposals
            .iter_mut()
            .find(|p| p.key == *key)
            .ok_or(Error::UnknownProposal {
                proposer: key.proposer,
                id: key.id,
            })?;
        if proposal.state.is_resolved() {
            return Ok(proposal.state);
        }
        let vote = Vote {
            voter,
            choice,
            confidence: if confidence.is_finite() { confidence.clamp(0.0, 1.0) } else { 0.0 },
            at: now,
        };
        match proposal.votes.iter().position(|v| v.voter == voter) {
            Some(i) => proposal.votes[i] = vote,
            None if proposal.votes.len() < max_votes => proposal.votes.push(vote),
            None => {
                return Err(Error::CapacityExceeded {
                    what: "proposal votes",
                    capacity: max_votes,
                })
            }
        }
        proposal.leading = proposal.tally();
        if let Some(choice) = proposal.decision(min_participants) {
            proposal.state = ProposalState::Decided { choice };
            info!(proposer = %key.proposer, id = key.id, choice, votes = proposal.votes.len(), "consensus reached");
        }
        Ok(proposal.state)
    }

    /// Close proposals whose window has passed.
    pub fn update(&mut self, now: Millis) -> Vec<(ProposalKey, ProposalState)> {
        let mut closed = Vec::new();
        for proposal in self.proposals.iter_mut() {
            if proposal.state.is_resolved() || elapsed(now, proposal.opened_at) < proposal.window_ms {
                continue;
            }
            proposal.state = ProposalState::NoConsensus {
                leading: proposal.leading.map(|l| l.choice),
            };
            debug!(proposer = %proposal.key.proposer, id = proposal.key.id, votes = proposal.votes.len(), "proposal timed out");
            closed.push((proposal.key, proposal.state));
        }
        closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(n: u8) -> NodeId {
        NodeId([0x02, 0, 0, 0, 0, n])
    }

    fn book() -> ConsensusBook {
        ConsensusBook::new(8, 15_000, 8, 2)
    }

    fn open(book: &mut ConsensusBook, consensus: ConsensusType, expected: u8) -> ProposalKey {
        book.propose(id(1), DecisionTopic::FormationChange, consensus, expected, 0)
            .unwrap()
    }

    #[test]
    fn thresholds() {
        assert_eq!(majority_threshold(2), 2);
        assert_eq!(majority_threshold(3), 2);
        assert_eq!(majority_threshold(4), 3);
        assert_eq!(supermajority_threshold(3), 3);
        assert_eq!(supermajority_threshold(6), 5);
    }

    #[test]
    fn majority_decides_early() {
        let mut b = book();
        let key = open(&mut b, ConsensusType::Majority, 5);
        assert_eq!(b.vote(&key, id(1), 2, 1.0, 1).unwrap(), ProposalState::Open);
        assert_eq!(b.vote(&key, id(2), 2, 1.0, 2).unwrap(), ProposalState::Open);
        assert_eq!(b.vote(&key, id(3), 2, 1.0, 3).unwrap(), ProposalState::Decided { choice: 2 });
        // late votes do not reopen
        assert_eq!(b.vote(&key, id(4), 7, 1.0, 4).unwrap(), ProposalState::Decided { choice: 2 });
    }

    #[test]
    fn single_vote_never_reaches_quorum() {
        let mut b = book();
        let key = open(&mut b, ConsensusType::Majority, 1);
        assert_eq!(b.vote(&key, id(1), 1, 1.0, 0).unwrap(), ProposalState::Open);
    }

    #[test]
    fn revote_replaces() {
        let mut b = book();
        let key = open(&mut b, ConsensusType::Unanimous, 3);
        b.vote(&key, id(1), 1, 1.0, 0).unwrap();
        b.vote(&key, id(2), 2, 1.0, 0).unwrap();
        b.vote(&key, id(2), 1, 1.0, 0).unwrap();
        let p = b.get(&key).unwrap();
        assert_eq!(p.votes.len(), 2);
        assert_eq!(p.leading.map(|l| l.votes), Some(2));
        assert_eq!(b.vote(&key, id(3), 1, 1.0, 0).unwrap(), ProposalState::Decided { choice: 1 });
    }

    #[test]
    fn supermajority_needs_more_than_two_thirds() {
        let mut b = book();
        let key = open(&mut b, ConsensusType::Supermajority, 3);
        b.vote(&key, id(1), 4, 1.0, 0).unwrap();
        assert_eq!(b.vote(&key, id(2), 4, 1.0, 0).unwrap(), ProposalState::Open);
        assert_eq!(b.vote(&key, id(3), 4, 1.0, 0).unwrap(), ProposalState::Decided { choice: 4 });
    }

    #[test]
    fn weighted_uses_confidence() {
        let mut b = book();
        let key = open(&mut b, ConsensusType::Weighted, 4);
        b.vote(&key, id(1), 1, 0.9, 0).unwrap();
        // 1.8 of 4.0
        assert_eq!(b.vote(&key, id(2), 1, 0.9, 0).unwrap(), ProposalState::Open);
        assert_eq!(b.vote(&key, id(3), 2, 1.0, 0).unwrap(), ProposalState::Open);
        assert_eq!(b.vote(&key, id(4), 1, 0.3, 0).unwrap(), ProposalState::Decided { choice: 1 });
    }

    #[test]
    fn expert_vote_decides() {
        let mut b = book();
        let key = open(&mut b, ConsensusType::Expert(id(9)), 5);
        b.vote(&key, id(1), 1, 1.0, 0).unwrap();
        assert_eq!(b.vote(&key, id(2), 1, 1.0, 0).unwrap(), ProposalState::Open);
        assert_eq!(b.vote(&key, id(9), 3, 0.2, 0).unwrap(), ProposalState::Decided { choice: 3 });
    }

    #[test]
    fn timeout_reports_leading_choice() {
        let mut b = book();
        let key = open(&mut b, ConsensusType::Unanimous, 4);
        b.vote(&key, id(1), 6, 0.5, 0).unwrap();
        b.vote(&key, id(2), 5, 0.9, 0).unwrap();
        assert!(b.update(14_999).is_empty());
        let closed = b.update(15_000);
        // equal counts, higher support leads
        assert_eq!(closed, vec![(key, ProposalState::NoConsensus { leading: Some(5) })]);
        assert!(b.update(20_000).is_empty());
    }

    #[test]
    fn pool_recycles_resolved_and_rejects_when_all_open() {
        let mut b = ConsensusBook::new(1, 10, 8, 2);
        let first = open(&mut b, ConsensusType::Majority, 2);
        assert!(matches!(
            b.propose(id(1), DecisionTopic::TaskPriority, ConsensusType::Majority, 2, 0),
            Err(Error::CapacityExceeded { .. })
        ));
        b.update(10);
        let second = b
            .propose(id(1), DecisionTopic::TaskPriority, ConsensusType::Majority, 2, 10)
            .unwrap();
        assert!(b.get(&first).is_none());
        assert_ne!(first, second);
        assert!(matches!(
            b.vote(&first, id(2), 1, 1.0, 11),
            Err(Error::UnknownProposal { .. })
        ));
    }

    #[test]
    fn vote_table_is_bounded() {
        let mut b = ConsensusBook::new(1, 10, 2, 2);
        let key = open(&mut b, ConsensusType::Unanimous, 8);
        b.vote(&key, id(1), 1, 1.0, 0).unwrap();
        b.vote(&key, id(2), 2, 1.0, 0).unwrap();
        assert!(matches!(
            b.vote(&key, id(3), 1, 1.0, 0),
            Err(Error::CapacityExceeded { capacity: 2, .. })
        ));
    }

    #[test]
    fn full_vote_table_still_takes_revotes() {
        let mut b = ConsensusBook::new(1, 10, 2, 2);
        let key = open(&mut b, ConsensusType::Majority, 3);
        b.vote(&key, id(1), 1, 1.0, 0).unwrap();
        b.vote(&key, id(2), 2, 1.0, 0).unwrap();
        assert_eq!(b.vote(&key, id(2), 1, 0.6, 1).unwrap(), ProposalState::Decided { choice: 1 });
        let p = b.get(&key).unwrap();
        assert_eq!(p.votes.len(), 2);
        assert_eq!(p.votes[1].choice, 1);
        assert_eq!(p.votes[1].at, 1);
    }
}
