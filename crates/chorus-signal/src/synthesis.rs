//! Fresh signal synthesis.
//!
//! Shape follows the situation: urgent contexts get several short tokens,
//! good news gets a couple of bright ones, calm contexts get long ones.
//! Emotion picks the token palette and intensity band.

use chorus_wire::{
    Components, EmotionalState, EnvironmentalContext, Millis, SignalWord, Tone, ToneKind,
};
use rand::seq::SliceRandom;
use rand::Rng;

use crate::personality::Personality;

/// Coin a brand-new word for `context` and `emotion`.
pub fn synthesize<R: Rng + ?Sized>(
    context: EnvironmentalContext,
    emotion: EmotionalState,
    personality: &Personality,
    generation: u16,
    now: Millis,
    rng: &mut R,
) -> SignalWord {
    let count = component_count(context, personality, rng);
    let components: Components = (0..count)
        .map(|_| {
            let (kind, intensity) = styled_token(emotion, personality, rng);
            Tone::new(kind, duration_for(context, rng), intensity)
        })
        .collect();

    SignalWord {
        context,
        valence: emotion,
        generation,
        components,
        utility: SignalWord::INITIAL_UTILITY,
        times_used: 1,
        times_understood: 0,
        last_used: now,
        created_at: now,
        personality_signature: personality.signature,
        complexity_preference: personality.complexity,
    }
}

fn component_count<R: Rng + ?Sized>(
    context: EnvironmentalContext,
    personality: &Personality,
    rng: &mut R,
) -> usize {
    if context.is_urgent() {
        rng.gen_range(3..=6)
    } else if context.is_positive() {
        rng.gen_range(2..=3)
    } else {
        let max = usize::from(personality.complexity).clamp(1, chorus_wire::MAX_COMPONENTS);
        rng.gen_range(1..=max)
    }
}

fn styled_token<R: Rng + ?Sized>(
    emotion: EmotionalState,
    personality: &Personality,
    rng: &mut R,
) -> (ToneKind, u8) {
    let (palette, low, high): (&[ToneKind], u8, u8) = if emotion.is_positive() {
        (&ToneKind::BRIGHT, 150, 254)
    } else if emotion.is_negative() {
        (&ToneKind::DARK, 100, 199)
    } else {
        (ToneKind::ALL, 100, 254)
    };
    let kind = palette.choose(rng).copied().unwrap_or(ToneKind::ToneMid);
    let base = i16::from(rng.gen_range(low..=high));
    let intensity = (base + personality.intensity_bias()).clamp(i16::from(low), i16::from(high));
    (kind, intensity as u8)
}

fn duration_for<R: Rng + ?Sized>(context: EnvironmentalContext, rng: &mut R) -> u16 {
    if context.is_urgent() {
        rng.gen_range(50..200)
    } else if context.is_calm() {
        rng.gen_range(200..800)
    } else {
        rng.gen_range(100..400)
    }
}

/// A random token with a neutral style, used when a mutation grows a word.
pub fn random_tone<R: Rng + ?Sized>(rng: &mut R) -> Tone {
    let kind = ToneKind::ALL.choose(rng).copied().unwrap_or(ToneKind::ToneMid);
    Tone::new(kind, rng.gen_range(100..500), rng.gen_range(100..=254))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn personality() -> Personality {
        Personality {
            signature: 0x42,
            complexity: 4,
            innovation_rate: 0.2,
        }
    }

    #[test]
    fn danger_words_are_short_and_dark() {
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..100 {
            let word = synthesize(
                EnvironmentalContext::DangerSensed,
                EmotionalState::VeryNegative,
                &personality(),
                0,
                0,
                &mut rng,
            );
            assert!((3..=6).contains(&word.components.len()));
            for tone in &word.components {
                assert!(ToneKind::DARK.contains(&tone.kind));
                assert!((50..200).contains(&tone.duration_ms));
                assert!((100..=199).contains(&tone.intensity));
            }
            assert!(word.is_well_formed());
        }
    }

    #[test]
    fn success_words_are_bright() {
        let mut rng = StdRng::seed_from_u64(12);
        for _ in 0..100 {
            let word = synthesize(
                EnvironmentalContext::ResourceFound,
                EmotionalState::VeryPositive,
                &personality(),
                2,
                500,
                &mut rng,
            );
            assert!((2..=3).contains(&word.components.len()));
            assert!(word
                .components
                .iter()
                .all(|t| ToneKind::BRIGHT.contains(&t.kind) && t.intensity >= 150));
            assert_eq!(word.generation, 2);
            assert_eq!(word.created_at, 500);
            assert_eq!(word.personality_signature, 0x42);
        }
    }

    #[test]
    fn other_contexts_respect_complexity() {
        let mut rng = StdRng::seed_from_u64(13);
        for _ in 0..100 {
            let word = synthesize(
                EnvironmentalContext::Waiting,
                EmotionalState::Neutral,
                &personality(),
                0,
                0,
                &mut rng,
            );
            assert!((1..=4).contains(&word.components.len()));
            assert!(word.components.iter().all(|t| (200..800).contains(&t.duration_ms)));
        }
    }
}
