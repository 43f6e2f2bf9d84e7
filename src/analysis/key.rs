// KeyEstimator - decayed chord accumulation matched against scale templates

use serde::Serialize;

use super::templates::{normalize, PitchVector, TemplateSet};

/// Label used while no chord energy has been accumulated
pub const UNKNOWN_KEY: &str = "unknown";

/// Key label plus the gap between the two best template scores
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KeyEstimate {
    pub key: String,
    pub confidence: f32,
}

impl KeyEstimate {
    fn unknown() -> Self {
        Self {
            key: UNKNOWN_KEY.to_string(),
            confidence: 0.0,
        }
    }
}

pub struct KeyEstimator {
    energy: PitchVector,
    decay: f32,
    templates: TemplateSet,
}

impl KeyEstimator {
    pub fn new(decay: f32) -> Self {
        Self {
            energy: [0.0; 12],
            decay: decay.clamp(0.0, 1.0),
            templates: TemplateSet::keys(),
        }
    }

    /// Fold in a reported chord's template vector
    ///
    /// `None` (silence, unknown label) leaves the energy untouched.
    pub fn observe(&mut self, chord_vector: Option<&PitchVector>) -> KeyEstimate {
        if let Some(vector) = chord_vector {
            for (energy, value) in self.energy.iter_mut().zip(vector) {
                *energy = *energy * self.decay + value;
            }
        }
        self.estimate()
    }

    /// Current best key; "unknown" with confidence 0 for zero energy
    pub fn estimate(&self) -> KeyEstimate {
        if self.energy.iter().all(|v| *v <= 0.0) {
            return KeyEstimate::unknown();
        }

        let normalized = normalize(&self.energy);
        let scores = self.templates.scores(&normalized);

        let mut best = 0usize;
        for (i, score) in scores.iter().enumerate() {
            if *score > scores[best] {
                best = i;
            }
        }
        let runner_up = scores
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != best)
            .map(|(_, s)| *s)
            .fold(f32::NEG_INFINITY, f32::max);

        match self.templates.iter().nth(best) {
            Some(template) => KeyEstimate {
                key: template.label.clone(),
                confidence: scores[best] - runner_up,
            },
            None => KeyEstimate::unknown(),
        }
    }

    pub fn energy(&self) -> &PitchVector {
        &self.energy
    }

    pub fn reset(&mut self) {
        self.energy = [0.0; 12];
    }
}
