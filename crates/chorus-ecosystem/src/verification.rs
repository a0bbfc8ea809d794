//! Log of data-report verifications.

use std::collections::VecDeque;

use chorus_wire::{Millis, NodeId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VerificationEntry {
    pub sender: NodeId,
    pub verifier: NodeId,
    pub data_hash: u32,
    /// `false` means the report was contradicted.
    pub correct: bool,
    pub confidence: f32,
    pub at: Millis,
}

/// Ring of the most recent verifications.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationLog {
    entries: VecDeque<VerificationEntry>,
    capacity: usize,
}

impl VerificationLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, entry: VerificationEntry) {
        if self.capacity == 0 {
            return;
        }
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    pub fn iter(&self) -> impl Iterator<Item = &VerificationEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Verifications of one report.
    pub fn for_hash(&self, data_hash: u32) -> impl Iterator<Item = &VerificationEntry> {
        self.entries.iter().filter(move |e| e.data_hash == data_hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(hash: u32, at: Millis) -> VerificationEntry {
        VerificationEntry {
            sender: NodeId::from_seed(1),
            verifier: NodeId::from_seed(2),
            data_hash: hash,
            correct: true,
            confidence: 1.0,
            at,
        }
    }

    #[test]
    fn keeps_most_recent() {
        let mut log = VerificationLog::new(3);
        for at in 0..5 {
            log.push(entry(at % 2, at));
        }
        assert_eq!(log.len(), 3);
        assert_eq!(log.iter().map(|e| e.at).collect::<Vec<_>>(), vec![2, 3, 4]);
        assert_eq!(log.for_hash(0).count(), 2);
    }
}
