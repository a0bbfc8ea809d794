//! The signal vocabulary engine: picks, coins and evolves the words a node
//! uses to describe its situation.

use chorus_wire::{elapsed, EmergentMessage, EmotionalState, EnvironmentalContext, Millis, NodeId, SignalWord};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::config::VocabularyConfig;
use crate::error::{Error, Result};
use crate::mutation::{mutate, Mutation};
use crate::personality::Personality;
use crate::ring::Ring;
use crate::synthesis::synthesize;
use crate::vocabulary::{SignalKey, Vocabulary, VocabularyStats};

/// Outcome score credited when a peer answers a signal.
pub const ANSWERED_SCORE: f32 = 1.0;
/// Outcome score charged when an expected answer never comes.
pub const UNANSWERED_SCORE: f32 = -0.5;

/// Where a generated word came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Origin {
    Reused,
    Mutated,
    Synthesized,
}

/// A word picked for broadcast.
#[derive(Debug, Clone, PartialEq)]
pub struct Generated {
    pub key: SignalKey,
    pub word: SignalWord,
    pub origin: Origin,
}

/// A signal heard from a peer, kept for later outcome attribution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalMemory {
    pub sender: NodeId,
    pub signal: SignalWord,
    pub context: EnvironmentalContext,
    pub received_at: Millis,
    pub outcome: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PendingResponse {
    seq: u8,
    key: SignalKey,
    sent_at: Millis,
}

/// What a maintenance pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Maintenance {
    pub unanswered: Vec<SignalKey>,
    pub pruned: Vec<SignalKey>,
}

pub struct SignalEngine<R> {
    config: VocabularyConfig,
    personality: Personality,
    vocabulary: Vocabulary,
    memory: Ring<SignalMemory>,
    pending: Vec<PendingResponse>,
    generation: u16,
    last_prune: Millis,
    rng: R,
}

impl<R: Rng> SignalEngine<R> {
    /// Cold start with an empty vocabulary and a freshly rolled personality.
    pub fn new(config: VocabularyConfig, mut rng: R) -> Self {
        let personality = Personality::roll(&mut rng);
        Self::with_personality(config, personality, rng)
    }

    pub fn with_personality(config: VocabularyConfig, mut personality: Personality, rng: R) -> Self {
        if let Some(rate) = config.innovation_rate {
            personality.innovation_rate = rate;
        }
        debug!(
            signature = personality.signature,
            complexity = personality.complexity,
            innovation = personality.innovation_rate,
            "signal engine initialised"
        );
        Self {
            vocabulary: Vocabulary::new(config.capacity),
            memory: Ring::new(config.memory_capacity),
            pending: Vec::with_capacity(config.max_pending_responses),
            config,
            personality,
            generation: 0,
            last_prune: 0,
            rng,
        }
    }

    /// Warm start from a persisted vocabulary.
    pub fn restore(
        config: VocabularyConfig,
        personality: Personality,
        vocabulary: Vocabulary,
        rng: R,
    ) -> Self {
        let mut engine = Self::with_personality(config, personality, rng);
        debug!(signals = vocabulary.len(), "vocabulary restored");
        engine.vocabulary = vocabulary;
        engine
    }

    pub fn personality(&self) -> &Personality {
        &self.personality
    }

    pub fn vocabulary(&self) -> &Vocabulary {
        &self.vocabulary
    }

    pub fn config(&self) -> &VocabularyConfig {
        &self.config
    }

    pub fn generation(&self) -> u16 {
        self.generation
    }

    /// Epoch stamped into words coined or evolved from now on.
    pub fn set_generation(&mut self, generation: u16) {
        self.generation = generation;
    }

    pub fn memory(&self) -> impl Iterator<Item = &SignalMemory> {
        self.memory.iter()
    }

    pub fn stats(&self) -> VocabularyStats {
        self.vocabulary.stats()
    }

    /// Pick a word for the current situation.
    ///
    /// A good enough match is reused unless the innovation roll asks for a
    /// mutated variant. No match (or an empty vocabulary) coins a new word.
    pub fn generate_for_context(
        &mut self,
        context: EnvironmentalContext,
        emotion: EmotionalState,
        now: Millis,
    ) -> Generated {
        let best = self
            .vocabulary
            .best_match(context, emotion, now)
            .filter(|(_, score)| *score > self.config.match_threshold);

        if let Some((key, score)) = best {
            let innovate = self.rng.gen::<f32>() < self.personality.innovation_rate;
            if !innovate {
                if let Some(word) = self.vocabulary.get_mut(key) {
                    word.times_used = word.times_used.saturating_add(1);
                    word.last_used = now;
                    trace!(%key, score, utility = word.utility, "reusing signal");
                    return Generated {
                        key,
                        word: word.clone(),
                        origin: Origin::Reused,
                    };
                }
            } else if let Some(parent) = self.vocabulary.get(key).cloned() {
                let mut child = parent;
                let mutation = mutate(&mut child, &mut self.rng);
                child.utility = SignalWord::INITIAL_UTILITY;
                child.times_used = 1;
                child.times_understood = 0;
                child.created_at = now;
                child.last_used = now;
                child.generation = self.generation;
                let (child_key, _) = self.vocabulary.insert(child.clone(), now);
                debug!(parent = %key, child = %child_key, ?mutation, "innovated on existing signal");
                return Generated {
                    key: child_key,
                    word: child,
                    origin: Origin::Mutated,
                };
            }
        }

        let word = synthesize(context, emotion, &self.personality, self.generation, now, &mut self.rng);
        let (key, _) = self.vocabulary.insert(word.clone(), now);
        debug!(
            %key,
            ?context,
            ?emotion,
            components = word.components.len(),
            "coined new signal"
        );
        Generated {
            key,
            word,
            origin: Origin::Synthesized,
        }
    }

    /// Fold an outcome score in `[-1, 1]` into a word's utility. Words that
    /// keep failing are mutated in place. Returns the new utility.
    pub fn record_outcome(&mut self, key: SignalKey, score: f32) -> Result<f32> {
        if score.is_nan() {
            return Err(Error::InvalidOutcome);
        }
        let score = score.clamp(-1.0, 1.0);
        let alpha = self.config.learning_rate.clamp(0.0, 1.0);
        let generation = self.generation;
        let word = self.vocabulary.get_mut(key).ok_or(Error::UnknownSignal(key))?;

        let normalized = (score + 1.0) / 2.0;
        word.set_utility((1.0 - alpha) * word.utility + alpha * normalized);
        if score > 0.5 {
            word.times_understood = word.times_understood.saturating_add(1);
        }
        let utility = word.utility;
        trace!(%key, score, utility, "signal outcome recorded");

        if utility < self.config.pressure_utility && word.times_used >= self.config.pressure_min_uses {
            let mutation = mutate(word, &mut self.rng);
            word.generation = generation;
            debug!(%key, utility, ?mutation, "evolutionary pressure on weak signal");
        }
        Ok(utility)
    }

    /// Mutate a stored word in place.
    pub fn mutate(&mut self, key: SignalKey) -> Result<Mutation> {
        let word = self.vocabulary.get_mut(key).ok_or(Error::UnknownSignal(key))?;
        Ok(mutate(word, &mut self.rng))
    }

    /// Remove the weakest word.
    pub fn evict(&mut self, now: Millis) -> Option<SignalKey> {
        self.vocabulary.evict(now).map(|e| e.key)
    }

    /// Drop long-unused weak words.
    pub fn prune(&mut self, now: Millis) -> Vec<SignalKey> {
        let removed = self.vocabulary.prune(
            now,
            self.config.prune_window_ms,
            self.config.pressure_min_uses,
        );
        self.last_prune = now;
        if !removed.is_empty() {
            debug!(removed = removed.len(), remaining = self.vocabulary.len(), "vocabulary pruned");
        }
        removed
    }

    /// Keep a peer's signal for later outcome attribution.
    pub fn remember(&mut self, sender: NodeId, signal: SignalWord, context: EnvironmentalContext, now: Millis) {
        self.memory.push(SignalMemory {
            sender,
            signal,
            context,
            received_at: now,
            outcome: 0.0,
        });
    }

    /// Attach an outcome to the latest remembered signal from `sender`.
    pub fn record_memory_outcome(&mut self, sender: NodeId, score: f32) -> bool {
        match self.memory.latest_mut(|m| m.sender == sender) {
            Some(entry) => {
                entry.outcome = score.clamp(-1.0, 1.0);
                true
            }
            None => false,
        }
    }

    /// Pick a reply when `message` asks for one.
    pub fn respond_to(
        &mut self,
        message: &EmergentMessage,
        context: EnvironmentalContext,
        emotion: EmotionalState,
        now: Millis,
    ) -> Option<Generated> {
        if !message.expects_response {
            return None;
        }
        trace!(peer = %message.sender, seq = message.seq, "peer asked for a response");
        Some(self.generate_for_context(context, emotion, now))
    }

    /// Wait for an answer to the frame numbered `seq` that carried `key`.
    pub fn expect_response(&mut self, seq: u8, key: SignalKey, now: Millis) {
        self.pending.retain(|p| p.seq != seq);
        if self.pending.len() >= self.config.max_pending_responses && !self.pending.is_empty() {
            self.pending.remove(0);
        }
        if self.config.max_pending_responses > 0 {
            self.pending.push(PendingResponse { seq, key, sent_at: now });
        }
    }

    /// A peer answered our frame `seq`. Credits the word that was sent.
    pub fn acknowledge(&mut self, seq: u8) -> Option<SignalKey> {
        let index = self.pending.iter().position(|p| p.seq == seq)?;
        let pending = self.pending.remove(index);
        match self.record_outcome(pending.key, ANSWERED_SCORE) {
            Ok(utility) => debug!(key = %pending.key, utility, "signal was answered"),
            Err(err) => debug!(key = %pending.key, error = %err, "answered signal already gone"),
        }
        Some(pending.key)
    }

    /// Charge unanswered signals and prune on schedule.
    pub fn update(&mut self, now: Millis) -> Maintenance {
        let window = self.config.response_window_ms;
        let (expired, waiting): (Vec<_>, Vec<_>) = self
            .pending
            .drain(..)
            .partition(|p| elapsed(now, p.sent_at) > window);
        self.pending = waiting;

        let mut report = Maintenance::default();
        for pending in expired {
            if self.record_outcome(pending.key, UNANSWERED_SCORE).is_ok() {
                report.unanswered.push(pending.key);
            }
        }
        if elapsed(now, self.last_prune) >= self.config.prune_interval_ms {
            report.pruned = self.prune(now);
        }
        report
    }
}
