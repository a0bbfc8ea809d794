//! Error types for chorus-signal.

use thiserror::Error;

use crate::vocabulary::SignalKey;

/// Result type for signal engine operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// The signal was evicted or pruned since the caller got its key.
    #[error("signal {0} is no longer in the vocabulary")]
    UnknownSignal(SignalKey),

    /// Outcome scores must be finite.
    #[error("outcome score is not a number")]
    InvalidOutcome,
}
