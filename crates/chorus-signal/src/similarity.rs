//! Acoustic similarity between two signal words.

use chorus_wire::SignalWord;

const KIND_WEIGHT: f32 = 0.4;
const DURATION_WEIGHT: f32 = 0.3;
const INTENSITY_WEIGHT: f32 = 0.3;

/// Durations within 50% of each other count as matching.
const DURATION_TOLERANCE: f32 = 0.5;
/// Intensities within 30% of each other count as matching.
const INTENSITY_TOLERANCE: f32 = 0.7;

/// Score in `[0, 1]` comparing tokens position by position over the common
/// prefix of both words. Words with no tokens score 0.
pub fn acoustic_similarity(a: &SignalWord, b: &SignalWord) -> f32 {
    let common = a.components.len().min(b.components.len());
    if common == 0 {
        return 0.0;
    }
    let share = 1.0 / common as f32;
    let score: f32 = a
        .components
        .iter()
        .zip(b.components.iter())
        .map(|(x, y)| {
            let mut s = 0.0;
            if x.kind == y.kind {
                s += KIND_WEIGHT;
            }
            if ratio(f32::from(x.duration_ms), f32::from(y.duration_ms)) > DURATION_TOLERANCE {
                s += DURATION_WEIGHT;
            }
            if ratio(f32::from(x.intensity), f32::from(y.intensity)) > INTENSITY_TOLERANCE {
                s += INTENSITY_WEIGHT;
            }
            s * share
        })
        .sum();
    score.clamp(0.0, 1.0)
}

/// `min / max`, with two zeros treated as identical.
fn ratio(x: f32, y: f32) -> f32 {
    let hi = x.max(y);
    if hi == 0.0 {
        1.0
    } else {
        x.min(y) / hi
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chorus_wire::{Components, EmotionalState, EnvironmentalContext, Tone, ToneKind};

    fn word(tones: &[(ToneKind, u16, u8)]) -> SignalWord {
        let components: Components = tones.iter().map(|&(k, d, i)| Tone::new(k, d, i)).collect();
        SignalWord::new(
            EnvironmentalContext::PeerDetected,
            EmotionalState::Neutral,
            components,
            0,
        )
        .unwrap()
    }

    #[test]
    fn identical_words_score_one() {
        let w = word(&[(ToneKind::ToneHigh, 120, 200), (ToneKind::SweepUp, 300, 180)]);
        assert!((acoustic_similarity(&w, &w) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn disjoint_words_score_low() {
        let a = word(&[(ToneKind::ToneHigh, 1000, 250), (ToneKind::SweepUp, 900, 240)]);
        let b = word(&[(ToneKind::ToneLow, 100, 60), (ToneKind::SweepDown, 80, 50)]);
        assert!(acoustic_similarity(&a, &b) <= 0.3);
        assert_eq!(acoustic_similarity(&a, &b), 0.0);
    }

    #[test]
    fn compares_common_prefix_only() {
        let short = word(&[(ToneKind::PulseFast, 100, 100)]);
        let long = word(&[
            (ToneKind::PulseFast, 100, 100),
            (ToneKind::Silence, 500, 50),
            (ToneKind::ToneLow, 500, 50),
        ]);
        assert!((acoustic_similarity(&short, &long) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn partial_matches_add_up() {
        // same kind and duration, intensity too far apart
        let a = word(&[(ToneKind::ToneMid, 200, 200)]);
        let b = word(&[(ToneKind::ToneMid, 150, 100)]);
        assert!((acoustic_similarity(&a, &b) - 0.7).abs() < 1e-6);
    }

    #[test]
    fn zero_durations_match() {
        let a = word(&[(ToneKind::Silence, 0, 0)]);
        assert!((acoustic_similarity(&a, &a) - 1.0).abs() < 1e-6);
    }
}
