//! Node configuration: engine settings plus timing, identity and storage.

use std::path::{Path, PathBuf};

use chorus_coordination::CoordinationConfig;
use chorus_ecosystem::EcosystemConfig;
use chorus_signal::{PeerLearningConfig, VocabularyConfig};
use chorus_wire::{Health, Millis, NodeId, NodeKind, MAX_SWARM_PEERS, PEER_TIMEOUT_MS};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Explicit identity. Derived from `seed` when absent.
    pub node_id: Option<NodeId>,
    /// Seeds the node's random source and, by default, its identity.
    pub seed: u64,
    pub kind: NodeKind,
    pub generation: u16,
    pub fitness: f32,
    pub health: Health,
    pub tick_ms: Millis,
    /// How often the node broadcasts a signal for its current situation.
    pub signal_interval_ms: Millis,
    pub status_interval_ms: Millis,
    pub snapshot_interval_ms: Millis,
    pub snapshot_path: Option<PathBuf>,
    /// Raw frames waiting for the next tick. Oldest dropped when full.
    pub inbound_queue: usize,
    pub max_peers: usize,
    pub peer_timeout_ms: Millis,
    pub vocabulary: VocabularyConfig,
    pub peers: PeerLearningConfig,
    pub ecosystem: EcosystemConfig,
    pub coordination: CoordinationConfig,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            node_id: None,
            seed: 0,
            kind: NodeKind::Wheelie,
            generation: 0,
            fitness: 0.5,
            health: Health::Good,
            tick_ms: 100,
            signal_interval_ms: 2_000,
            status_interval_ms: 5_000,
            snapshot_interval_ms: 300_000,
            snapshot_path: None,
            inbound_queue: 32,
            max_peers: MAX_SWARM_PEERS,
            peer_timeout_ms: PEER_TIMEOUT_MS,
            vocabulary: VocabularyConfig::default(),
            peers: PeerLearningConfig::default(),
            ecosystem: EcosystemConfig::default(),
            coordination: CoordinationConfig::default(),
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Result<Option<T>>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| Error::InvalidConfig(format!("{name}: {e}"))),
        Err(_) => Ok(None),
    }
}

impl NodeConfig {
    /// Defaults overridden by `CHORUS_NODE_ID` (hex MAC), `CHORUS_SEED`,
    /// `CHORUS_TICK_MS` and `CHORUS_SNAPSHOT` (path).
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        if let Ok(raw) = std::env::var("CHORUS_NODE_ID") {
            let id = NodeId::from_hex(raw.trim())
                .map_err(|e| Error::InvalidConfig(format!("CHORUS_NODE_ID: {e}")))?;
            config.node_id = Some(id);
        }
        if let Some(seed) = env_parse("CHORUS_SEED")? {
            config.seed = seed;
        }
        if let Some(tick) = env_parse("CHORUS_TICK_MS")? {
            config.tick_ms = tick;
        }
        if let Ok(path) = std::env::var("CHORUS_SNAPSHOT") {
            config.snapshot_path = Some(PathBuf::from(path));
        }
        Ok(config)
    }

    /// Load from a JSON file. Missing fields take their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub fn identity(&self) -> NodeId {
        self.node_id.unwrap_or_else(|| NodeId::from_seed(self.seed))
    }

    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    #[must_use]
    pub fn with_kind(mut self, kind: NodeKind) -> Self {
        self.kind = kind;
        self
    }

    #[must_use]
    pub fn with_fitness(mut self, fitness: f32) -> Self {
        self.fitness = fitness;
        self
    }

    #[must_use]
    pub fn with_tick(mut self, tick_ms: Millis) -> Self {
        self.tick_ms = tick_ms;
        self
    }

    #[must_use]
    pub fn with_snapshot_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.snapshot_path = Some(path.into());
        self
    }
}
