//! Bounded store of the node's own signal words.

use std::fmt;

use chorus_wire::{elapsed, EmotionalState, EnvironmentalContext, Millis, SignalWord};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Stable handle to a word in the vocabulary. Never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SignalKey(pub u32);

impl fmt::Display for SignalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sig#{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VocabularyEntry {
    pub key: SignalKey,
    pub word: SignalWord,
}

/// How well `word` fits a context and emotion, weighted by its utility.
pub fn match_score(word: &SignalWord, context: EnvironmentalContext, emotion: EmotionalState) -> f32 {
    let context_match = if word.context == context { 1.0 } else { 0.0 };
    let emotion_gap = (i16::from(word.valence.valence()) - i16::from(emotion.valence())).abs();
    let emotion_match = if emotion_gap <= 1 { 1.0 } else { 0.0 };
    (0.6 * context_match + 0.4 * emotion_match) * word.utility
}

/// Fixed-capacity word store. Full inserts overwrite the weakest word.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vocabulary {
    entries: Vec<VocabularyEntry>,
    capacity: usize,
    next_key: u32,
}

impl Vocabulary {
    /// A vocabulary always holds at least one word.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: Vec::with_capacity(capacity),
            capacity,
            next_key: 1,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_full(&self) -> bool {
        self.entries.len() >= self.capacity
    }

    pub fn get(&self, key: SignalKey) -> Option<&SignalWord> {
        self.entries.iter().find(|e| e.key == key).map(|e| &e.word)
    }

    pub fn get_mut(&mut self, key: SignalKey) -> Option<&mut SignalWord> {
        self.entries.iter_mut().find(|e| e.key == key).map(|e| &mut e.word)
    }

    pub fn iter(&self) -> impl Iterator<Item = (SignalKey, &SignalWord)> {
        self.entries.iter().map(|e| (e.key, &e.word))
    }

    /// Best-scoring word for `context`/`emotion`. Equal scores prefer higher
    /// utility, then the older word.
    pub fn best_match(
        &self,
        context: EnvironmentalContext,
        emotion: EmotionalState,
        now: Millis,
    ) -> Option<(SignalKey, f32)> {
        self.entries
            .iter()
            .map(|e| (e, match_score(&e.word, context, emotion)))
            .max_by(|(a, sa), (b, sb)| {
                sa.total_cmp(sb)
                    .then(a.word.utility.total_cmp(&b.word.utility))
                    .then(elapsed(now, a.word.created_at).cmp(&elapsed(now, b.word.created_at)))
                    .then(b.key.cmp(&a.key))
            })
            .map(|(e, score)| (e.key, score))
    }

    /// The word an insert into a full vocabulary would overwrite: strictly
    /// lowest utility, ties broken by earliest creation.
    pub fn eviction_candidate(&self, now: Millis) -> Option<SignalKey> {
        self.entries
            .iter()
            .min_by(|a, b| {
                a.word
                    .utility
                    .total_cmp(&b.word.utility)
                    .then(elapsed(now, b.word.created_at).cmp(&elapsed(now, a.word.created_at)))
                    .then(a.key.cmp(&b.key))
            })
            .map(|e| e.key)
    }

    /// Remove the eviction candidate.
    pub fn evict(&mut self, now: Millis) -> Option<VocabularyEntry> {
        let key = self.eviction_candidate(now)?;
        self.remove(key)
    }

    /// Store `word`, evicting the weakest word first when full.
    pub fn insert(&mut self, word: SignalWord, now: Millis) -> (SignalKey, Option<VocabularyEntry>) {
        let evicted = if self.is_full() { self.evict(now) } else { None };
        if let Some(old) = &evicted {
            debug!(key = %old.key, utility = old.word.utility, "vocabulary full, evicted weakest signal");
        }
        let key = SignalKey(self.next_key);
        self.next_key = self.next_key.wrapping_add(1).max(1);
        self.entries.push(VocabularyEntry { key, word });
        (key, evicted)
    }

    pub fn remove(&mut self, key: SignalKey) -> Option<VocabularyEntry> {
        let index = self.entries.iter().position(|e| e.key == key)?;
        Some(self.entries.remove(index))
    }

    /// Drop words unused for longer than `window` whose utility is below 0.5,
    /// unless they were used at least `keep_uses` times.
    pub fn prune(&mut self, now: Millis, window: Millis, keep_uses: u32) -> Vec<SignalKey> {
        let mut removed = Vec::new();
        self.entries.retain(|e| {
            let stale = elapsed(now, e.word.last_used) > window
                && e.word.utility < 0.5
                && e.word.times_used < keep_uses;
            if stale {
                removed.push(e.key);
            }
            !stale
        });
        removed
    }

    pub fn stats(&self) -> VocabularyStats {
        let size = self.entries.len();
        let average_utility = if size == 0 {
            0.0
        } else {
            self.entries.iter().map(|e| e.word.utility).sum::<f32>() / size as f32
        };
        let most_used = self
            .entries
            .iter()
            .max_by(|a, b| a.word.times_used.cmp(&b.word.times_used).then(b.key.cmp(&a.key)))
            .map(|e| (e.key, e.word.times_used));
        VocabularyStats {
            size,
            capacity: self.capacity,
            average_utility,
            most_used,
        }
    }
}

/// Summary of the vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VocabularyStats {
    pub size: usize,
    pub capacity: usize,
    pub average_utility: f32,
    /// Most used word and its use count.
    pub most_used: Option<(SignalKey, u32)>,
}

impl fmt::Display for VocabularyStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Vocabulary: {}/{} signals, avg utility {:.2}",
            self.size, self.capacity, self.average_utility
        )?;
        if let Some((key, uses)) = self.most_used {
            write!(f, ", most used {key} ({uses} uses)")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chorus_wire::{Components, Tone, ToneKind};

    fn word(context: EnvironmentalContext, utility: f32, created_at: Millis) -> SignalWord {
        let components: Components = std::iter::once(Tone::new(ToneKind::ToneMid, 100, 100)).collect();
        let mut w = SignalWord::new(context, EmotionalState::Neutral, components, created_at).unwrap();
        w.utility = utility;
        w
    }

    #[test]
    fn insert_beyond_capacity_evicts_lowest_utility() {
        let mut v = Vocabulary::new(3);
        let (a, _) = v.insert(word(EnvironmentalContext::OpenSpace, 0.9, 0), 0);
        let (b, _) = v.insert(word(EnvironmentalContext::OpenSpace, 0.1, 0), 0);
        let (c, _) = v.insert(word(EnvironmentalContext::OpenSpace, 0.5, 0), 0);
        let (_, evicted) = v.insert(word(EnvironmentalContext::Waiting, 0.05, 10), 10);
        assert_eq!(evicted.map(|e| e.key), Some(b));
        assert_eq!(v.len(), 3);
        assert!(v.get(a).is_some() && v.get(c).is_some());
    }

    #[test]
    fn eviction_tie_goes_to_oldest() {
        let mut v = Vocabulary::new(8);
        let (_newer, _) = v.insert(word(EnvironmentalContext::OpenSpace, 0.3, 500), 500);
        let (older, _) = v.insert(word(EnvironmentalContext::OpenSpace, 0.3, 100), 500);
        v.insert(word(EnvironmentalContext::OpenSpace, 0.8, 0), 500);
        assert_eq!(v.eviction_candidate(1_000), Some(older));
    }

    #[test]
    fn best_match_weights_by_utility() {
        let mut v = Vocabulary::new(8);
        let (weak, _) = v.insert(word(EnvironmentalContext::DangerSensed, 0.2, 0), 0);
        let (strong, _) = v.insert(word(EnvironmentalContext::DangerSensed, 0.9, 0), 0);
        let (key, score) = v
            .best_match(EnvironmentalContext::DangerSensed, EmotionalState::Neutral, 0)
            .unwrap();
        assert_eq!(key, strong);
        assert!((score - 0.9).abs() < 1e-6);
        assert_ne!(key, weak);
    }

    #[test]
    fn emotion_within_one_step_matches() {
        let w = word(EnvironmentalContext::OpenSpace, 1.0, 0);
        assert!((match_score(&w, EnvironmentalContext::OpenSpace, EmotionalState::Positive) - 1.0).abs() < 1e-6);
        assert!((match_score(&w, EnvironmentalContext::OpenSpace, EmotionalState::VeryPositive) - 0.6).abs() < 1e-6);
        assert!((match_score(&w, EnvironmentalContext::Waiting, EmotionalState::Negative) - 0.4).abs() < 1e-6);
    }

    #[test]
    fn prune_keeps_recent_useful_or_popular_words() {
        let mut v = Vocabulary::new(8);
        let (stale, _) = v.insert(word(EnvironmentalContext::OpenSpace, 0.2, 0), 0);
        let (useful, _) = v.insert(word(EnvironmentalContext::OpenSpace, 0.7, 0), 0);
        let mut popular_word = word(EnvironmentalContext::OpenSpace, 0.2, 0);
        popular_word.times_used = 5;
        let (popular, _) = v.insert(popular_word, 0);
        let mut recent_word = word(EnvironmentalContext::OpenSpace, 0.2, 0);
        recent_word.last_used = 650_000;
        let (recent, _) = v.insert(recent_word, 0);

        let removed = v.prune(700_000, 600_000, 5);
        assert_eq!(removed, vec![stale]);
        for key in [useful, popular, recent] {
            assert!(v.get(key).is_some());
        }
    }

    #[test]
    fn stats_report_most_used() {
        let mut v = Vocabulary::new(4);
        assert_eq!(v.stats().average_utility, 0.0);
        let mut busy = word(EnvironmentalContext::OpenSpace, 0.6, 0);
        busy.times_used = 9;
        let (busy_key, _) = v.insert(busy, 0);
        v.insert(word(EnvironmentalContext::OpenSpace, 0.2, 0), 0);
        let stats = v.stats();
        assert_eq!(stats.size, 2);
        assert!((stats.average_utility - 0.4).abs() < 1e-6);
        assert_eq!(stats.most_used, Some((busy_key, 9)));
        assert!(stats.to_string().contains("2/4 signals"));
    }
}
