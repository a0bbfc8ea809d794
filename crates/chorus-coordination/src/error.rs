//! Error types for chorus-coordination.

use chorus_wire::NodeId;
use thiserror::Error;

use crate::tasks::TaskStatus;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error("{what} is full ({capacity} entries)")]
    CapacityExceeded { what: &'static str, capacity: usize },

    #[error("no task {id} from {requester}")]
    UnknownTask { requester: NodeId, id: u16 },

    #[error("task {id} cannot move from {from:?} to {to:?}")]
    InvalidTransition {
        id: u16,
        from: TaskStatus,
        to: TaskStatus,
    },

    #[error("no proposal {id} from {proposer}")]
    UnknownProposal { proposer: NodeId, id: u16 },
}
