//! # Chorus Coordination
//!
//! Lightweight swarm coordination over a lossy broadcast link.
//!
//! - [`election`]: bid collection and a deterministic leader pick
//! - [`tasks`]: bounded task pool with deadlines
//! - [`consensus`]: timed proposals with quorum rules
//! - [`formation`]: canned N-node layouts
//! - [`behaviour`]: flocking / competitive / cooperative classification
//!
//! Nothing here is acknowledged across nodes. Each node resolves from what
//! it heard, so views can briefly disagree after message loss.

pub mod behaviour;
pub mod config;
pub mod consensus;
pub mod election;
pub mod engine;
pub mod error;
pub mod formation;
pub mod tasks;

pub use behaviour::EmergentBehaviour;
pub use config::CoordinationConfig;
pub use consensus::{ConsensusBook, Leading, Proposal, ProposalKey, ProposalState, Vote};
pub use election::{Candidate, Election, ElectionState};
pub use engine::{CoordinationEngine, CoordinationEvent};
pub use error::{Error, Result};
pub use formation::{layout, ActiveFormation, FormationControl, FormationPosition};
pub use tasks::{SwarmTask, TaskKey, TaskPool, TaskStatus};
