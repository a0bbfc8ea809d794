//! The evolved signal word and its primitive tokens.

use arrayvec::ArrayVec;
use serde::{Deserialize, Serialize};

use crate::vocab::{EmotionalState, EnvironmentalContext, ToneKind};
use crate::Millis;

/// Maximum number of tokens in one signal word.
pub const MAX_COMPONENTS: usize = 8;

/// Token sequence of a signal word, bounded at [`MAX_COMPONENTS`].
pub type Components = ArrayVec<Tone, MAX_COMPONENTS>;

/// One primitive acoustic/visual token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Tone {
    pub kind: ToneKind,
    pub duration_ms: u16,
    pub intensity: u8,
}

impl Tone {
    pub const fn new(kind: ToneKind, duration_ms: u16, intensity: u8) -> Self {
        Self {
            kind,
            duration_ms,
            intensity,
        }
    }
}

/// An evolved communicative unit tied to the context it was coined in.
///
/// Invariants kept by every producer in this workspace:
/// `1 <= components.len() <= 8` and `0.0 <= utility <= 1.0`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalWord {
    /// Situation the word was coined under.
    pub context: EnvironmentalContext,
    /// Emotional charge at creation.
    pub valence: EmotionalState,
    /// Creation epoch of the emitter.
    pub generation: u16,
    pub components: Components,
    /// Running usefulness estimate.
    pub utility: f32,
    pub times_used: u32,
    pub times_understood: u32,
    pub last_used: Millis,
    pub created_at: Millis,
    /// Style tag of the node that coined the word.
    pub personality_signature: u8,
    pub complexity_preference: u8,
}

impl SignalWord {
    /// Neutral utility of a freshly coined word.
    pub const INITIAL_UTILITY: f32 = 0.5;

    /// Start a word from a non-empty token sequence.
    ///
    /// Returns `None` when `components` is empty.
    pub fn new(
        context: EnvironmentalContext,
        valence: EmotionalState,
        components: Components,
        now: Millis,
    ) -> Option<Self> {
        if components.is_empty() {
            return None;
        }
        Some(Self {
            context,
            valence,
            generation: 0,
            components,
            utility: Self::INITIAL_UTILITY,
            times_used: 0,
            times_understood: 0,
            last_used: now,
            created_at: now,
            personality_signature: 0,
            complexity_preference: 1,
        })
    }

    /// True when the bounds every word must respect hold.
    pub fn is_well_formed(&self) -> bool {
        !self.components.is_empty()
            && self.components.len() <= MAX_COMPONENTS
            && (0.0..=1.0).contains(&self.utility)
    }

    /// Set utility, clamped to `[0, 1]`. NaN becomes 0.
    pub fn set_utility(&mut self, utility: f32) {
        self.utility = if utility.is_nan() {
            0.0
        } else {
            utility.clamp(0.0, 1.0)
        };
    }

    /// Total rendered length of the word.
    pub fn duration_ms(&self) -> u32 {
        self.components.iter().map(|t| u32::from(t.duration_ms)).sum()
    }

    /// Fraction of uses that got an answer, 0 before first use.
    pub fn understanding_rate(&self) -> f32 {
        if self.times_used == 0 {
            0.0
        } else {
            self.times_understood as f32 / self.times_used as f32
        }
    }

    /// True when both words carry the same token sequence.
    pub fn same_pattern(&self, other: &SignalWord) -> bool {
        self.components == other.components
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tones(n: usize) -> Components {
        (0..n)
            .map(|i| Tone::new(ToneKind::ToneMid, 100 + i as u16, 120))
            .collect()
    }

    #[test]
    fn empty_word_is_rejected() {
        let word = SignalWord::new(
            EnvironmentalContext::OpenSpace,
            EmotionalState::Neutral,
            Components::new(),
            0,
        );
        assert!(word.is_none());
    }

    #[test]
    fn utility_is_clamped() {
        let mut word = SignalWord::new(
            EnvironmentalContext::OpenSpace,
            EmotionalState::Neutral,
            tones(2),
            10,
        )
        .unwrap();
        word.set_utility(1.7);
        assert_eq!(word.utility, 1.0);
        word.set_utility(-3.0);
        assert_eq!(word.utility, 0.0);
        word.set_utility(f32::NAN);
        assert_eq!(word.utility, 0.0);
        assert!(word.is_well_formed());
    }

    #[test]
    fn duration_sums_tokens() {
        let word = SignalWord::new(
            EnvironmentalContext::Waiting,
            EmotionalState::Positive,
            tones(3),
            0,
        )
        .unwrap();
        assert_eq!(word.duration_ms(), 100 + 101 + 102);
        assert_eq!(word.understanding_rate(), 0.0);
    }
}
