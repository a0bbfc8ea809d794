//! Per-peer signal memory and trust.

use chorus_wire::{EnvironmentalContext, Millis, NodeId, Outcome, SignalWord};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::config::PeerLearningConfig;
use crate::ring::Ring;
use crate::similarity::acoustic_similarity;

/// What we know about one peer's way of signalling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeerSignalProfile {
    pub peer: NodeId,
    /// Recently observed signals, oldest overwritten first.
    pub signals: Ring<SignalWord>,
    pub trust: f32,
    pub personality_signature: u8,
    /// Situation we were in when this peer last spoke.
    pub last_context: EnvironmentalContext,
    pub last_interaction: Millis,
    pub interactions: u32,
}

/// A stored peer signal that sounds like a newly heard one.
#[derive(Debug, Clone, PartialEq)]
pub struct Recognition<'a> {
    pub signal: &'a SignalWord,
    pub similarity: f32,
}

/// Bounded table of peer profiles. Newcomers are ignored once full.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeerModel {
    config: PeerLearningConfig,
    profiles: Vec<PeerSignalProfile>,
}

impl Default for PeerModel {
    fn default() -> Self {
        Self::new(PeerLearningConfig::default())
    }
}

impl PeerModel {
    pub fn new(config: PeerLearningConfig) -> Self {
        Self {
            profiles: Vec::with_capacity(config.max_peers),
            config,
        }
    }

    pub fn config(&self) -> &PeerLearningConfig {
        &self.config
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }

    pub fn profile(&self, peer: &NodeId) -> Option<&PeerSignalProfile> {
        self.profiles.iter().find(|p| p.peer == *peer)
    }

    pub fn profiles(&self) -> impl Iterator<Item = &PeerSignalProfile> {
        self.profiles.iter()
    }

    /// Neutral trust for peers we hold no profile for.
    pub fn trust(&self, peer: &NodeId) -> f32 {
        self.profile(peer).map_or(self.config.initial_trust, |p| p.trust)
    }

    /// Record a signal heard from `peer` while in `context`. Returns false
    /// when the peer is new and the table is already full.
    pub fn learn_from_peer(
        &mut self,
        peer: NodeId,
        signal: &SignalWord,
        context: EnvironmentalContext,
        now: Millis,
    ) -> bool {
        let index = match self.profiles.iter().position(|p| p.peer == peer) {
            Some(i) => i,
            None if self.profiles.len() < self.config.max_peers => {
                self.profiles.push(PeerSignalProfile {
                    peer,
                    signals: Ring::new(self.config.signals_per_peer),
                    trust: self.config.initial_trust.clamp(0.0, 1.0),
                    personality_signature: signal.personality_signature,
                    last_context: context,
                    last_interaction: now,
                    interactions: 0,
                });
                debug!(%peer, peers = self.profiles.len(), "new peer profile");
                self.profiles.len() - 1
            }
            None => {
                trace!(%peer, "peer table full, not learning");
                return false;
            }
        };
        let profile = &mut self.profiles[index];
        profile.signals.push(signal.clone());
        profile.personality_signature = signal.personality_signature;
        profile.last_context = context;
        profile.last_interaction = now;
        profile.interactions = profile.interactions.saturating_add(1);
        trace!(%peer, known = profile.signals.len(), "learned peer signal");
        true
    }

    /// Apply the trust delta for `outcome`. Returns the new trust, or `None`
    /// for unknown peers.
    pub fn update_trust(&mut self, peer: &NodeId, outcome: Outcome) -> Option<f32> {
        self.adjust_trust(peer, outcome.trust_delta())
    }

    /// Shift trust by an arbitrary delta, clamped to `[0, 1]`. NaN deltas are
    /// ignored.
    pub fn adjust_trust(&mut self, peer: &NodeId, delta: f32) -> Option<f32> {
        let profile = self.profiles.iter_mut().find(|p| p.peer == *peer)?;
        if !delta.is_nan() {
            profile.trust = (profile.trust + delta).clamp(0.0, 1.0);
        }
        trace!(%peer, delta, trust = profile.trust, "peer trust updated");
        Some(profile.trust)
    }

    /// Best stored signal of `peer` that sounds like `signal`.
    pub fn recognize(&self, peer: &NodeId, signal: &SignalWord) -> Option<Recognition<'_>> {
        let profile = self.profile(peer)?;
        profile
            .signals
            .iter()
            .map(|known| Recognition {
                signal: known,
                similarity: acoustic_similarity(known, signal),
            })
            .filter(|r| r.similarity >= self.config.recognition_threshold)
            .max_by(|a, b| a.similarity.total_cmp(&b.similarity))
    }

    /// Most trusted known peer.
    pub fn most_trusted(&self) -> Option<&PeerSignalProfile> {
        self.profiles.iter().max_by(|a, b| a.trust.total_cmp(&b.trust))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chorus_wire::{Components, EmotionalState, EnvironmentalContext, Tone, ToneKind};
    use proptest::prelude::*;

    fn peer(n: u8) -> NodeId {
        NodeId([0x02, 0, 0, 0, 0, n])
    }

    fn signal(kind: ToneKind, duration: u16) -> SignalWord {
        let components: Components = std::iter::once(Tone::new(kind, duration, 180)).collect();
        SignalWord::new(EnvironmentalContext::PeerDetected, EmotionalState::Neutral, components, 0).unwrap()
    }

    #[test]
    fn unknown_peer_gets_profile_until_full() {
        let mut model = PeerModel::new(PeerLearningConfig::default().with_max_peers(2));
        let s = signal(ToneKind::ToneHigh, 100);
        assert!(model.learn_from_peer(peer(1), &s, EnvironmentalContext::PeerDetected, 0));
        assert!(model.learn_from_peer(peer(2), &s, EnvironmentalContext::PeerDetected, 0));
        assert!(!model.learn_from_peer(peer(3), &s, EnvironmentalContext::PeerDetected, 0));
        assert!(model.learn_from_peer(peer(1), &s, EnvironmentalContext::Exploring, 10));
        assert_eq!(model.len(), 2);
        let known = model.profile(&peer(1)).unwrap();
        assert_eq!(known.interactions, 2);
        assert_eq!(known.last_context, EnvironmentalContext::Exploring);
        assert_eq!(model.trust(&peer(3)), 0.5);
    }

    #[test]
    fn per_peer_signals_overwrite_oldest() {
        let mut model = PeerModel::new(PeerLearningConfig::default().with_signals_per_peer(2));
        for d in [100, 200, 300] {
            model.learn_from_peer(peer(1), &signal(ToneKind::ToneMid, d), EnvironmentalContext::PeerDetected, 0);
        }
        let durations: Vec<u16> = model
            .profile(&peer(1))
            .unwrap()
            .signals
            .iter()
            .map(|s| s.components[0].duration_ms)
            .collect();
        assert_eq!(durations, vec![200, 300]);
    }

    #[test]
    fn trust_deltas_are_asymmetric() {
        let mut model = PeerModel::default();
        model.learn_from_peer(peer(1), &signal(ToneKind::ToneMid, 100), EnvironmentalContext::PeerDetected, 0);
        let t = model.update_trust(&peer(1), Outcome::Success).unwrap();
        assert!((t - 0.55).abs() < 1e-6);
        let t = model.update_trust(&peer(1), Outcome::Contradicted).unwrap();
        assert!((t - 0.45).abs() < 1e-6);
        assert_eq!(model.update_trust(&peer(9), Outcome::Success), None);
    }

    #[test]
    fn recognizes_recurring_idiom() {
        let mut model = PeerModel::default();
        model.learn_from_peer(peer(1), &signal(ToneKind::SweepUp, 300), EnvironmentalContext::PeerDetected, 0);
        model.learn_from_peer(peer(1), &signal(ToneKind::ToneLow, 900), EnvironmentalContext::PeerDetected, 0);
        let heard = signal(ToneKind::SweepUp, 280);
        let hit = model.recognize(&peer(1), &heard).unwrap();
        assert_eq!(hit.signal.components[0].kind, ToneKind::SweepUp);
        assert!(hit.similarity >= 0.7);
        assert!(model.recognize(&peer(1), &signal(ToneKind::Silence, 50)).is_none());
        assert!(model.recognize(&peer(2), &heard).is_none());
    }

    proptest! {
        #[test]
        fn trust_stays_clamped(deltas in prop::collection::vec(-1000.0f32..1000.0, 1..50)) {
            let mut model = PeerModel::default();
            model.learn_from_peer(peer(1), &signal(ToneKind::ToneMid, 100), EnvironmentalContext::PeerDetected, 0);
            for d in deltas {
                let t = model.adjust_trust(&peer(1), d).unwrap();
                prop_assert!((0.0..=1.0).contains(&t));
            }
        }

        #[test]
        fn outcome_sequences_keep_trust_in_range(outcomes in prop::collection::vec(0u8..4, 1..200)) {
            let mut model = PeerModel::default();
            model.learn_from_peer(peer(1), &signal(ToneKind::ToneMid, 100), EnvironmentalContext::PeerDetected, 0);
            for o in outcomes {
                let outcome = [Outcome::Success, Outcome::Partial, Outcome::Failure, Outcome::Contradicted][usize::from(o)];
                let t = model.update_trust(&peer(1), outcome).unwrap();
                prop_assert!((0.0..=1.0).contains(&t));
            }
        }
    }
}
