//! Chorus swarm node
//!
//! Wires the wire codec, signal engine, ecosystem manager and coordination
//! engine together behind one inbound queue and a periodic tick.
//!
//! - [`node`]: dispatch and the periodic tick
//! - [`runtime`]: tokio driver with a channel-backed radio
//! - [`sim`]: deterministic in-memory swarm over a lossy medium
//! - [`snapshot`]: persistence of learned state across restarts

pub mod config;
pub mod error;
pub mod io;
pub mod node;
pub mod runtime;
pub mod sim;
pub mod snapshot;

pub use config::NodeConfig;
pub use error::{Error, Result};
pub use io::{
    Collaborators, ContextSource, EmotionSource, Outbox, Radio, SignalRenderer, Situation, SnapshotStore,
    TraceRenderer,
};
pub use node::{Node, NodeStats, TickReport};
pub use runtime::{bridge, spawn, ChannelRadio, NodeHandle};
pub use sim::{MediumStats, Member, Swarm};
pub use snapshot::{JsonFileStore, MemoryStore, Snapshot};
