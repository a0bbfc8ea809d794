//! Error types for chorus-node.

use thiserror::Error;

/// Result type for node operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Configuration could not be parsed
    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    /// Snapshot (de)serialization
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Wire(#[from] chorus_wire::Error),

    #[error(transparent)]
    Signal(#[from] chorus_signal::Error),

    #[error(transparent)]
    Ecosystem(#[from] chorus_ecosystem::Error),

    #[error(transparent)]
    Coordination(#[from] chorus_coordination::Error),

    /// The node task is gone
    #[error("Node stopped")]
    Stopped,
}
