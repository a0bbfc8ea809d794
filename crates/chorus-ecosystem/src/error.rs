//! Error types for chorus-ecosystem.

use chorus_wire::NodeId;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error("node {0} is not registered")]
    UnknownNode(NodeId),

    /// Registries reject newcomers once full instead of replacing old
    /// entries.
    #[error("{what} is full ({capacity} entries)")]
    CapacityExceeded { what: &'static str, capacity: usize },
}
