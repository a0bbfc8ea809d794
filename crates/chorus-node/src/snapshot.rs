//! Persisted node state and the stores that keep it.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chorus_ecosystem::EcosystemSnapshot;
use chorus_signal::{PeerModel, Personality, Vocabulary};
use chorus_wire::{Millis, NodeId};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::Result;
use crate::io::SnapshotStore;

/// Everything a node learned: its vocabulary, what it knows of its peers'
/// signals and the reputation tables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub node_id: NodeId,
    pub saved_at: Millis,
    pub personality: Personality,
    pub generation: u16,
    pub vocabulary: Vocabulary,
    pub peers: PeerModel,
    pub ecosystem: EcosystemSnapshot,
}

/// JSON file store. Writes go to a sibling temp file first and are renamed
/// into place.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SnapshotStore for JsonFileStore {
    fn persist(&mut self, snapshot: &Snapshot) -> Result<()> {
        let json = serde_json::to_vec_pretty(snapshot)?;
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &self.path)?;
        debug!(path = %self.path.display(), signals = snapshot.vocabulary.len(), "snapshot written");
        Ok(())
    }

    fn restore(&mut self) -> Result<Option<Snapshot>> {
        let raw = match std::fs::read(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %self.path.display(), "no snapshot, cold start");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };
        if raw.iter().all(u8::is_ascii_whitespace) {
            info!(path = %self.path.display(), "empty snapshot, cold start");
            return Ok(None);
        }
        Ok(Some(serde_json::from_slice(&raw)?))
    }
}

/// In-memory store. Clones share the slot.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    slot: Arc<Mutex<Option<Snapshot>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn latest(&self) -> Option<Snapshot> {
        self.slot.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl SnapshotStore for MemoryStore {
    fn persist(&mut self, snapshot: &Snapshot) -> Result<()> {
        *self.slot.lock().unwrap_or_else(|e| e.into_inner()) = Some(snapshot.clone());
        Ok(())
    }

    fn restore(&mut self) -> Result<Option<Snapshot>> {
        Ok(self.latest())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chorus_ecosystem::{EcosystemConfig, EcosystemManager};
    use chorus_signal::PeerLearningConfig;
    use chorus_wire::NodeKind;

    fn snapshot() -> Snapshot {
        let mut ecosystem = EcosystemManager::new(EcosystemConfig::default());
        ecosystem
            .register_node(NodeId::from_seed(2), NodeKind::Scout, 10)
            .unwrap();
        Snapshot {
            node_id: NodeId::from_seed(1),
            saved_at: 1_000,
            personality: Personality {
                signature: 42,
                complexity: 3,
                innovation_rate: 0.2,
            },
            generation: 4,
            vocabulary: Vocabulary::new(8),
            peers: PeerModel::new(PeerLearningConfig::default()),
            ecosystem: ecosystem.snapshot(),
        }
    }

    #[test]
    fn file_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = JsonFileStore::new(dir.path().join("node.json"));
        assert_eq!(store.restore().unwrap(), None);
        store.persist(&snapshot()).unwrap();
        assert_eq!(store.restore().unwrap(), Some(snapshot()));
        assert!(!dir.path().join("node.tmp").exists());
    }

    #[test]
    fn empty_file_is_cold_start() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("node.json");
        std::fs::write(&path, "  \n").unwrap();
        assert_eq!(JsonFileStore::new(path).restore().unwrap(), None);
    }

    #[test]
    fn corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("node.json");
        std::fs::write(&path, "{\"node_id\":").unwrap();
        assert!(JsonFileStore::new(path).restore().is_err());
    }

    #[test]
    fn memory_store_clones_share() {
        let store = MemoryStore::new();
        let mut writer = store.clone();
        writer.persist(&snapshot()).unwrap();
        assert_eq!(store.latest().map(|s| s.generation), Some(4));
    }
}
