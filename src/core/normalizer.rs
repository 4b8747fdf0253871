//! Normalization for partially and fully answered trait vectors.
//!
//! Implements:
//! 1. Provisional normalization: the working vector is treated as a noisy
//!    low-sample estimate of the full one, rescaled by `1 / max(ratio, floor)`
//!    before projection onto the unit sphere.
//! 2. Final normalization: plain unit-sphere projection, used once all
//!    questions are answered.
//!
//! Both clamp every component to `[-1.0, 1.0]` and fall back to clamping the
//! raw vector when the (scaled) magnitude is below `epsilon`.

use crate::config::VectorSettings;
use crate::metric::magnitude;
use crate::{TraitVector, QUESTION_COUNT, TRAIT_AXES};

#[derive(Debug, Clone, Copy)]
pub struct ProvisionalNormalizer {
    epsilon: f32,
    completion_floor: f32,
}

impl ProvisionalNormalizer {
    pub fn new(epsilon: f32, completion_floor: f32) -> Self {
        Self {
            epsilon,
            completion_floor,
        }
    }

    pub fn from_settings(settings: &VectorSettings) -> Self {
        Self::new(settings.epsilon, settings.completion_floor)
    }

    pub fn epsilon(&self) -> f32 {
        self.epsilon
    }

    pub fn completion_ratio(answered: usize) -> f32 {
        answered.min(QUESTION_COUNT) as f32 / QUESTION_COUNT as f32
    }

    pub fn normalize(&self, working: &TraitVector, answered: usize) -> TraitVector {
        if answered == 0 {
            return [0.0; TRAIT_AXES];
        }
        let ratio = Self::completion_ratio(answered);
        let scale = 1.0 / ratio.max(self.completion_floor);
        self.unit_scale(working, scale)
    }

    /// Canonical vector persisted after completion. No completion rescale.
    pub fn finalize(&self, working: &TraitVector) -> TraitVector {
        self.unit_scale(working, 1.0)
    }

    fn unit_scale(&self, working: &TraitVector, scale: f32) -> TraitVector {
        // scale > 0, so ‖w·s‖ == s·‖w‖.
        let scaled_magnitude = magnitude(working) * scale;

        if scaled_magnitude > self.epsilon {
            let factor = scale / scaled_magnitude;
            working.map(|v| (v * factor).clamp(-1.0, 1.0))
        } else {
            working.map(|v| v.clamp(-1.0, 1.0))
        }
    }
}

impl Default for ProvisionalNormalizer {
    fn default() -> Self {
        Self::from_settings(&VectorSettings::default())
    }
}
