//! Control payloads: the coordination and reputation traffic that rides in
//! 32-byte bodies of version-3 frames.

use serde::{Deserialize, Serialize};

use crate::vocab::{ConsensusType, DecisionTopic, FormationType, Health, NodeKind, TaskCategory};
use crate::{Millis, NodeId};

/// A node offering itself as leader. The candidate is the frame sender.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LeaderBid {
    pub kind: NodeKind,
    pub generation: u16,
    pub fitness: f32,
    /// Battery level in percent.
    pub battery: u8,
    pub strategies_learned: u16,
}

/// Periodic self-report that feeds the reputation manager.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StatusReport {
    pub kind: NodeKind,
    pub generation: u16,
    pub fitness: f32,
    pub health: Health,
}

/// Typed body of a control frame. The kind byte follows the variant.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ControlBody {
    LeaderBid(LeaderBid),
    /// Sender asks `assignee` to run a task. `(sender, task_id)` names it.
    TaskAssignment {
        task_id: u16,
        category: TaskCategory,
        priority: u8,
        assignee: NodeId,
        /// Milliseconds the task may run, counted from reception. Nodes
        /// share no clock.
        deadline: Millis,
    },
    /// Progress on a task owned by `requester`.
    TaskProgress {
        requester: NodeId,
        task_id: u16,
        progress: u8,
    },
    Proposal {
        proposal_id: u16,
        topic: DecisionTopic,
        consensus: ConsensusType,
        /// Voting window in milliseconds from reception.
        deadline: Millis,
        expected_voters: u8,
    },
    Vote {
        proposer: NodeId,
        proposal_id: u16,
        choice: u8,
        confidence: f32,
    },
    Formation {
        formation: FormationType,
        scale: f32,
    },
    Status(StatusReport),
    /// Sender checked a data report made by `subject`.
    Verification {
        subject: NodeId,
        data_hash: u32,
        correct: bool,
        confidence: f32,
    },
}

impl ControlBody {
    /// One-byte kind code written after the version byte.
    pub const fn kind(&self) -> u8 {
        match self {
            Self::LeaderBid(_) => 0x01,
            Self::TaskAssignment { .. } => 0x02,
            Self::TaskProgress { .. } => 0x03,
            Self::Proposal { .. } => 0x04,
            Self::Vote { .. } => 0x05,
            Self::Formation { .. } => 0x06,
            Self::Status(_) => 0x07,
            Self::Verification { .. } => 0x08,
        }
    }

    /// Short name for logs.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::LeaderBid(_) => "leader-bid",
            Self::TaskAssignment { .. } => "task-assignment",
            Self::TaskProgress { .. } => "task-progress",
            Self::Proposal { .. } => "proposal",
            Self::Vote { .. } => "vote",
            Self::Formation { .. } => "formation",
            Self::Status(_) => "status",
            Self::Verification { .. } => "verification",
        }
    }
}
