//! # Chorus Wire
//!
//! Broadcast-link plumbing for the chorus swarm.
//!
//! Nodes talk over an unreliable, broadcast-only radio with a small payload.
//! This crate holds everything both ends of that link must agree on:
//!
//! - [`vocab`]: closed enums (contexts, emotions, tone kinds, node kinds,
//!   task and consensus vocabulary) with stable one-byte codes
//! - [`signal`]: the evolved [`SignalWord`] and its tokens
//! - [`frame`]: the fixed-layout codec with a trailing XOR checksum
//! - [`registry`]: the bounded table of peers heard on the link
//! - [`transceiver`]: sequence numbering, echo suppression and peer tracking
//!
//! ## Time
//!
//! Every timestamp is a [`Millis`] value from a wrapping millisecond clock.
//! Durations are always computed with [`elapsed`], never plain subtraction.

pub mod control;
pub mod error;
pub mod frame;
pub mod id;
pub mod registry;
pub mod signal;
pub mod transceiver;
pub mod vocab;

pub use control::{ControlBody, LeaderBid, StatusReport};
pub use error::{CodecError, Error, Result};
pub use frame::{ControlMessage, EmergentMessage, Frame};
pub use id::{data_hash, NodeId};
pub use registry::{PeerEntry, PeerRegistry, SeqObservation, MAX_SWARM_PEERS, PEER_TIMEOUT_MS};
pub use signal::{Components, SignalWord, Tone, MAX_COMPONENTS};
pub use transceiver::{Reception, Transceiver};
pub use vocab::{
    ConsensusType, DecisionTopic, EmotionalState, EnvironmentalContext, FormationType, Health,
    NodeKind, Outcome, TaskCategory, ToneKind,
};

/// Milliseconds of a node-local monotonic clock that wraps at `u32::MAX`.
pub type Millis = u32;

/// Time from `since` to `now` on the wrapping clock.
#[inline]
pub const fn elapsed(now: Millis, since: Millis) -> Millis {
    now.wrapping_sub(since)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn elapsed_wraps() {
        assert_eq!(elapsed(10, 4), 6);
        assert_eq!(elapsed(5, u32::MAX - 4), 10);
    }
}
