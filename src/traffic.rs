// src/traffic.rs
//
// Traffic lights at each intersection.

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::types::{Heading, Light};

const PERIODS: [u32; 4] = [2, 3, 4, 5];

/// A two-phase light: either north-south or east-west traffic may pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrafficLight {
    /// True while north-south traffic has green.
    pub ns_open: bool,
    /// Ticks between flips.
    pub period: u32,
    /// Tick of the last flip.
    pub last_updated: u64,
}

impl TrafficLight {
    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Self {
            ns_open: rng.gen(),
            period: *PERIODS.choose(rng).unwrap_or(&3),
            last_updated: 0,
        }
    }

    /// Re-roll phase and period for a new trial.
    pub fn reset<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        *self = Self::random(rng);
    }

    /// Flip once `period` ticks have passed since the last flip.
    pub fn update(&mut self, t: u64) {
        if t.saturating_sub(self.last_updated) >= u64::from(self.period) {
            self.ns_open = !self.ns_open;
            self.last_updated = t;
        }
    }

    /// Light colour for a car travelling along `heading`.
    pub fn light_for(&self, heading: Heading) -> Light {
        if self.ns_open == heading.is_vertical() {
            Light::Green
        } else {
            Light::Red
        }
    }
}
