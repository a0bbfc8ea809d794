//! Coarse classification of what the swarm is doing as a whole.

use chorus_wire::Millis;
use serde::{Deserialize, Serialize};

/// Tasks at or above this priority count as contested.
pub const HIGH_PRIORITY: u8 = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EmergentBehaviour {
    /// A formation has held for a while.
    Flocking,
    /// Several high-priority tasks are live at once.
    Competitive,
    Cooperative,
}

pub fn classify(formation_age: Option<Millis>, flocking_after: Millis, high_priority_live: usize) -> EmergentBehaviour {
    if formation_age.is_some_and(|age| age > flocking_after) {
        EmergentBehaviour::Flocking
    } else if high_priority_live > 1 {
        EmergentBehaviour::Competitive
    } else {
        EmergentBehaviour::Cooperative
    }
}

/// 0.5 baseline, +0.3 with a formation, +0.2 with an active task.
pub fn coherence(formation_active: bool, any_active_task: bool) -> f32 {
    let mut score = 0.5;
    if formation_active {
        score += 0.3;
    }
    if any_active_task {
        score += 0.2;
    }
    f32::min(score, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification_order() {
        assert_eq!(classify(Some(30_001), 30_000, 5), EmergentBehaviour::Flocking);
        assert_eq!(classify(Some(30_000), 30_000, 2), EmergentBehaviour::Competitive);
        assert_eq!(classify(None, 30_000, 1), EmergentBehaviour::Cooperative);
    }

    #[test]
    fn coherence_is_capped() {
        assert_eq!(coherence(false, false), 0.5);
        assert!((coherence(true, true) - 1.0).abs() < 1e-6);
        assert!(coherence(true, true) <= 1.0);
    }
}
