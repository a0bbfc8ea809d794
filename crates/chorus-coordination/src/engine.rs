//! The coordination engine: one owner for election, tasks, consensus and
//! formation state, fed by control frames and a periodic update.

use chorus_wire::{
    ConsensusType, ControlBody, DecisionTopic, FormationType, LeaderBid, Millis, NodeId, TaskCategory,
};
use tracing::{debug, warn};

use crate::behaviour::{self, EmergentBehaviour, HIGH_PRIORITY};
use crate::config::CoordinationConfig;
use crate::consensus::{ConsensusBook, ProposalKey, ProposalState};
use crate::election::Election;
use crate::error::{Error, Result};
use crate::formation::FormationControl;
use crate::tasks::{TaskKey, TaskPool, TaskStatus, MAX_PRIORITY};

/// Something other components may want to react to.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CoordinationEvent {
    LeaderElected(NodeId),
    TaskCompleted(TaskKey),
    TaskFailed(TaskKey),
    ProposalResolved { key: ProposalKey, state: ProposalState },
    FormationChanged(FormationType),
}

#[derive(Debug, Clone)]
pub struct CoordinationEngine {
    local: NodeId,
    config: CoordinationConfig,
    election: Election,
    tasks: TaskPool,
    consensus: ConsensusBook,
    formation: FormationControl,
}

impl CoordinationEngine {
    pub fn new(local: NodeId, config: CoordinationConfig) -> Self {
        Self {
            local,
            election: Election::new(local, config.election_window_ms, config.max_candidates),
            tasks: TaskPool::new(config.task_capacity, config.default_task_deadline_ms),
            consensus: ConsensusBook::new(
                config.proposal_capacity,
                config.voting_window_ms,
                config.max_votes,
                config.min_participants,
            ),
            formation: FormationControl::default(),
            config,
        }
    }

    pub fn local_id(&self) -> NodeId {
        self.local
    }

    pub fn config(&self) -> &CoordinationConfig {
        &self.config
    }

    pub fn election(&self) -> &Election {
        &self.election
    }

    pub fn tasks(&self) -> &TaskPool {
        &self.tasks
    }

    pub fn consensus(&self) -> &ConsensusBook {
        &self.consensus
    }

    pub fn formation(&self) -> &FormationControl {
        &self.formation
    }

    pub fn leader(&self) -> Option<NodeId> {
        self.election.leader()
    }

    pub fn is_leader(&self) -> bool {
        self.election.is_leader()
    }

    /// Enter our own bid and return the body to broadcast.
    pub fn bid(&mut self, bid: LeaderBid, now: Millis) -> Result<ControlBody> {
        self.election.submit(self.local, bid, now)?;
        Ok(ControlBody::LeaderBid(bid))
    }

    /// The leader went quiet: drop it and open a new round.
    pub fn leader_lost(&mut self, now: Millis) {
        self.election.leader_lost();
        self.election.start(now);
    }

    /// Create a task we request, optionally already assigned.
    pub fn create_task(
        &mut self,
        category: TaskCategory,
        priority: u8,
        assignee: Option<NodeId>,
        now: Millis,
    ) -> Result<(TaskKey, ControlBody)> {
        let key = self.tasks.create(self.local, category, priority, now)?;
        if let Some(assignee) = assignee {
            self.tasks.assign(&key, assignee)?;
        }
        Ok((key, self.assignment_body(&key)?))
    }

    /// The announcement for one of our tasks.
    pub fn assignment_body(&self, key: &TaskKey) -> Result<ControlBody> {
        let task = self.tasks.get(key).ok_or(Error::UnknownTask {
            requester: key.requester,
            id: key.id,
        })?;
        Ok(ControlBody::TaskAssignment {
            task_id: key.id,
            category: task.category,
            priority: task.priority,
            assignee: task.assignee.unwrap_or(NodeId::NONE),
            deadline: task.timeout_ms,
        })
    }

    pub fn start_task(&mut self, key: &TaskKey) -> Result<()> {
        self.tasks.start(key)
    }

    /// Report progress on a task and return the body to broadcast.
    pub fn report_progress(&mut self, key: &TaskKey, progress: u8) -> Result<(TaskStatus, ControlBody)> {
        let status = self.tasks.report_progress(key, progress)?;
        Ok((
            status,
            ControlBody::TaskProgress {
                requester: key.requester,
                task_id: key.id,
                progress: progress.min(100),
            },
        ))
    }

    pub fn cancel_task(&mut self, key: &TaskKey) -> Result<()> {
        self.tasks.cancel(key)
    }

    pub fn propose(
        &mut self,
        topic: DecisionTopic,
        consensus: ConsensusType,
        expected_voters: u8,
        now: Millis,
    ) -> Result<(ProposalKey, ControlBody)> {
        let key = self
            .consensus
            .propose(self.local, topic, consensus, expected_voters, now)?;
        Ok((
            key,
            ControlBody::Proposal {
                proposal_id: key.id,
                topic,
                consensus,
                deadline: self.consensus.window(),
                expected_voters,
            },
        ))
    }

    /// Vote on a proposal, ours or a peer's.
    pub fn cast_vote(
        &mut self,
        key: &ProposalKey,
        choice: u8,
        confidence: f32,
        now: Millis,
    ) -> Result<(ProposalState, ControlBody)> {
        let state = self.consensus.vote(key, self.local, choice, confidence, now)?;
        Ok((
            state,
            ControlBody::Vote {
                proposer: key.proposer,
                proposal_id: key.id,
                choice,
                confidence,
            },
        ))
    }

    /// Switch formation locally. Returns the body to broadcast when the
    /// formation actually changed.
    pub fn change_formation(
        &mut self,
        formation: FormationType,
        scale: f32,
        participants: &[NodeId],
        now: Millis,
    ) -> Option<ControlBody> {
        self.formation
            .change(formation, scale, participants, now)
            .then_some(ControlBody::Formation { formation, scale })
    }

    /// Danger: a top-priority emergency task plus a wide dispersed
    /// formation. Returns the bodies to broadcast.
    pub fn emergency_response(&mut self, participants: &[NodeId], now: Millis) -> Result<Vec<ControlBody>> {
        warn!(participants = participants.len(), "emergency response");
        let mut out = Vec::with_capacity(2);
        let (_, task) = self.create_task(TaskCategory::Emergency, MAX_PRIORITY, None, now)?;
        out.push(task);
        let scale = self.config.emergency_scale;
        if let Some(body) = self.change_formation(FormationType::Dispersed, scale, participants, now) {
            out.push(body);
        }
        Ok(out)
    }

    /// Apply a control body from `sender`. Status and verification bodies
    /// are not coordination traffic and are ignored here.
    pub fn handle_control(
        &mut self,
        sender: NodeId,
        body: &ControlBody,
        participants: &[NodeId],
        now: Millis,
    ) -> Result<Option<CoordinationEvent>> {
        match *body {
            ControlBody::LeaderBid(bid) => {
                self.election.submit(sender, bid, now)?;
                Ok(None)
            }
            ControlBody::TaskAssignment {
                task_id,
                category,
                priority,
                assignee,
                deadline,
            } => {
                let key = TaskKey {
                    requester: sender,
                    id: task_id,
                };
                self.tasks
                    .track_remote(key, category, priority, assignee, deadline, now)?;
                if assignee == self.local {
                    debug!(task = task_id, requester = %sender, "task assigned to us");
                }
                Ok(None)
            }
            ControlBody::TaskProgress {
                requester,
                task_id,
                progress,
            } => {
                let key = TaskKey {
                    requester,
                    id: task_id,
                };
                let before = self.tasks.get(&key).map(|t| t.status);
                let status = self.tasks.report_progress(&key, progress)?;
                Ok((status == TaskStatus::Completed && before != Some(TaskStatus::Completed))
                    .then_some(CoordinationEvent::TaskCompleted(key)))
            }
            ControlBody::Proposal {
                proposal_id,
                topic,
                consensus,
                deadline,
                expected_voters,
            } => {
                let key = ProposalKey {
                    proposer: sender,
                    id: proposal_id,
                };
                self.consensus
                    .track_remote(key, topic, consensus, deadline, expected_voters, now)?;
                Ok(None)
            }
            ControlBody::Vote {
                proposer,
                proposal_id,
                choice,
                confidence,
            } => {
                let key = ProposalKey {
                    proposer,
                    id: proposal_id,
                };
                let before = self.consensus.get(&key).map(|p| p.state);
                let state = self.consensus.vote(&key, sender, choice, confidence, now)?;
                Ok((state.is_resolved() && before == Some(ProposalState::Open))
                    .then_some(CoordinationEvent::ProposalResolved { key, state }))
            }
            ControlBody::Formation { formation, scale } => Ok(self
                .formation
                .change(formation, scale, participants, now)
                .then_some(CoordinationEvent::FormationChanged(formation))),
            ControlBody::Status(_) | ControlBody::Verification { .. } => Ok(None),
        }
    }

    /// Periodic work: resolve the election, fail overdue tasks and close
    /// expired proposals.
    pub fn update(&mut self, now: Millis) -> Vec<CoordinationEvent> {
        let mut events = Vec::new();
        if let Some(leader) = self.election.update(now) {
            events.push(CoordinationEvent::LeaderElected(leader));
        }
        events.extend(self.tasks.sweep(now).into_iter().map(CoordinationEvent::TaskFailed));
        events.extend(
            self.consensus
                .update(now)
                .into_iter()
                .map(|(key, state)| CoordinationEvent::ProposalResolved { key, state }),
        );
        events
    }

    pub fn behaviour(&self, now: Millis) -> EmergentBehaviour {
        let contested = self
            .tasks
            .live()
            .filter(|t| t.priority >= HIGH_PRIORITY)
            .count();
        behaviour::classify(self.formation.stable_for(now), self.config.flocking_after_ms, contested)
    }

    pub fn coherence(&self) -> f32 {
        let any_active = self.tasks.iter().any(|t| t.status == TaskStatus::Active);
        behaviour::coherence(self.formation.is_active(), any_active)
    }
}
