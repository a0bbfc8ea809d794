//! Single-step signal mutation.

use chorus_wire::{SignalWord, Tone, ToneKind, MAX_COMPONENTS};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::synthesis::random_tone;

pub const MIN_DURATION_MS: u16 = 50;
pub const MAX_DURATION_MS: u16 = 1000;
pub const MIN_INTENSITY: u8 = 50;

/// What a mutation did, for logs and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mutation {
    Duration { index: usize, from: u16, to: u16 },
    Intensity { index: usize, from: u8, to: u8 },
    Kind { index: usize, from: ToneKind, to: ToneKind },
    Grow(Tone),
    Shrink(Tone),
}

/// Apply exactly one mutation. The token sequence always changes and stays
/// within `1..=8` tokens.
pub fn mutate<R: Rng + ?Sized>(signal: &mut SignalWord, rng: &mut R) -> Mutation {
    if signal.components.is_empty() {
        let tone = random_tone(rng);
        signal.components.push(tone);
        return Mutation::Grow(tone);
    }
    let index = rng.gen_range(0..signal.components.len());
    match rng.gen_range(0..4u8) {
        0 => {
            let tone = &mut signal.components[index];
            let from = tone.duration_ms;
            let to = perturb(
                i32::from(from),
                rng.gen_range(1..=50),
                rng.gen_bool(0.5),
                i32::from(MIN_DURATION_MS),
                i32::from(MAX_DURATION_MS),
            ) as u16;
            tone.duration_ms = to;
            Mutation::Duration { index, from, to }
        }
        1 => {
            let tone = &mut signal.components[index];
            let from = tone.intensity;
            let to = perturb(
                i32::from(from),
                rng.gen_range(1..=30),
                rng.gen_bool(0.5),
                i32::from(MIN_INTENSITY),
                i32::from(u8::MAX),
            ) as u8;
            tone.intensity = to;
            Mutation::Intensity { index, from, to }
        }
        2 => {
            let from = signal.components[index].kind;
            let others: Vec<ToneKind> = ToneKind::ALL.iter().copied().filter(|k| *k != from).collect();
            let to = others.choose(rng).copied().unwrap_or(from);
            signal.components[index].kind = to;
            Mutation::Kind { index, from, to }
        }
        _ => {
            let len = signal.components.len();
            let grow = len == 1 || (len < MAX_COMPONENTS && rng.gen_bool(0.5));
            if grow {
                let tone = random_tone(rng);
                signal.components.push(tone);
                Mutation::Grow(tone)
            } else {
                // len >= 2 here
                let tone = signal.components[len - 1];
                signal.components.truncate(len - 1);
                Mutation::Shrink(tone)
            }
        }
    }
}

/// Move `value` by `magnitude` (>= 1) in the requested direction, clamped to
/// `[min, max]`. When the clamp swallows the step the opposite direction is
/// taken so the value always changes. Requires `max - min > magnitude`.
fn perturb(value: i32, magnitude: i32, up: bool, min: i32, max: i32) -> i32 {
    let step = if up { magnitude } else { -magnitude };
    let moved = (value + step).clamp(min, max);
    if moved != value {
        moved
    } else {
        (value - step).clamp(min, max)
    }
}
