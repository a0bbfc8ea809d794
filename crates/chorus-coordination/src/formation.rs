//! Formation layouts.
//!
//! Each participant gets a relative offset and heading. Participants are
//! ordered by identity so every node computes the same assignment from
//! the same membership.

use std::f32::consts::{FRAC_PI_2, FRAC_PI_4, SQRT_2, TAU};

use chorus_wire::{elapsed, FormationType, Millis, NodeId};
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FormationPosition {
    pub id: NodeId,
    pub x: f32,
    pub y: f32,
    /// Radians, 0 along +x.
    pub heading: f32,
}

/// Positions for `participants` in `formation`.
///
/// Line spaces nodes `2·scale` apart, circle puts them on a ring of radius
/// `scale` facing along the ring, dispersed spreads them on a ring of
/// radius `1.5·√2·scale` facing outward. Everything else is side by side,
/// `scale` apart.
pub fn layout(formation: FormationType, scale: f32, participants: &[NodeId]) -> Vec<FormationPosition> {
    let mut ids = participants.to_vec();
    ids.sort_unstable();
    ids.dedup();
    let n = ids.len() as f32;
    ids.into_iter()
        .enumerate()
        .map(|(i, id)| {
            let i = i as f32;
            let (x, y, heading) = match formation {
                FormationType::Line => (i * 2.0 * scale, 0.0, 0.0),
                FormationType::Circle => {
                    let angle = TAU * i / n;
                    (scale * angle.cos(), scale * angle.sin(), angle + FRAC_PI_2)
                }
                FormationType::Dispersed => {
                    let angle = FRAC_PI_4 + TAU * i / n;
                    let radius = 1.5 * SQRT_2 * scale;
                    (radius * angle.cos(), radius * angle.sin(), angle)
                }
                _ => (i * scale, 0.0, 0.0),
            };
            FormationPosition { id, x, y, heading }
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveFormation {
    pub formation: FormationType,
    pub scale: f32,
    pub since: Millis,
    pub positions: Vec<FormationPosition>,
}

/// The formation currently in force, if any.
#[derive(Debug, Clone, Default)]
pub struct FormationControl {
    active: Option<ActiveFormation>,
}

impl FormationControl {
    pub fn active(&self) -> Option<&ActiveFormation> {
        self.active.as_ref()
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    /// Switch formation. Positions are recomputed only when the type or
    /// scale actually changes; returns whether anything changed.
    pub fn change(&mut self, formation: FormationType, scale: f32, participants: &[NodeId], now: Millis) -> bool {
        let scale = if scale.is_finite() && scale > 0.0 { scale } else { 1.0 };
        if let Some(current) = &self.active {
            if current.formation == formation && current.scale == scale {
                return false;
            }
        }
        let positions = layout(formation, scale, participants);
        info!(?formation, scale, participants = positions.len(), "formation changed");
        self.active = Some(ActiveFormation {
            formation,
            scale,
            since: now,
            positions,
        });
        true
    }

    pub fn position_of(&self, id: &NodeId) -> Option<&FormationPosition> {
        self.active.as_ref()?.positions.iter().find(|p| p.id == *id)
    }

    /// How long the current formation has held.
    pub fn stable_for(&self, now: Millis) -> Option<Millis> {
        self.active.as_ref().map(|a| elapsed(now, a.since))
    }

    pub fn disband(&mut self) {
        self.active = None;
    }
}
