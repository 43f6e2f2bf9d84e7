// ChordRecognizer - rolling-window triad matching with debounce
//
// Every block is pushed into a rolling window; one recognition runs per
// `every_n` blocks. A recognition is either "silence" (window peak below the
// threshold) or the best-matching triad for the L2-normalised chroma. The
// StableLabelDebouncer turns the recognition stream into sparse reports.

use std::sync::Arc;

use super::debounce::{DebounceState, StableLabelDebouncer, TickDivider};
use super::features::FeatureExtractor;
use super::templates::{normalize, PitchVector, TemplateSet};
use crate::audio::RollingAudioBuffer;
use crate::config::ChordConfig;

/// Label produced for windows quieter than the silence threshold
pub const SILENCE: &str = "silence";

pub struct ChordRecognizer {
    buffer: RollingAudioBuffer,
    templates: TemplateSet,
    divider: TickDivider,
    debouncer: StableLabelDebouncer,
    extractor: Arc<dyn FeatureExtractor>,
    sample_rate: u32,
    detection_hz: f32,
    silence_threshold: f32,
}

impl ChordRecognizer {
    /// # Arguments
    /// * `config` - Window, detection rate, smoothing and vocabulary
    /// * `sample_rate` - Sample rate of the incoming blocks
    /// * `update_seconds` - Duration of one incoming block
    /// * `extractor` - Chroma provider
    pub fn new(
        config: &ChordConfig,
        sample_rate: u32,
        update_seconds: f32,
        extractor: Arc<dyn FeatureExtractor>,
    ) -> Self {
        let divider = TickDivider::from_rates(config.detection_hz, update_seconds);
        tracing::debug!(
            "[ChordRecognizer] window={}s, detection every {} block(s), smoothing={}",
            config.window_seconds,
            divider.every_n(),
            config.smoothing
        );

        Self {
            buffer: RollingAudioBuffer::for_duration(config.window_seconds, sample_rate),
            templates: TemplateSet::chords(config.vocabulary),
            divider,
            debouncer: StableLabelDebouncer::new(config.smoothing),
            extractor,
            sample_rate,
            detection_hz: config.detection_hz,
            silence_threshold: config.silence_threshold,
        }
    }

    /// Push one block; returns a chord label when a new stable chord appears
    pub fn process_block(&mut self, block: &[f32]) -> Option<String> {
        self.buffer.push(block);

        if !self.divider.tick() {
            return None;
        }

        let label = self.recognize();
        let reported = self.debouncer.observe(&label);
        if let Some(chord) = &reported {
            tracing::debug!("[ChordRecognizer] Stable chord: {}", chord);
        }
        reported
    }

    /// Classify the current window without touching the debounce state
    pub fn recognize(&self) -> String {
        if self.buffer.peak() < self.silence_threshold {
            return SILENCE.to_string();
        }

        let chroma = normalize(&self.extractor.chroma(self.buffer.as_slice(), self.sample_rate));
        self.templates
            .best_match(&chroma)
            .map(|(template, _)| template.label.clone())
            .unwrap_or_else(|| SILENCE.to_string())
    }

    /// Recompute the detection divider for a new block duration
    pub fn set_update_interval(&mut self, update_seconds: f32) {
        self.divider
            .set_every_n(TickDivider::divisor(self.detection_hz, update_seconds));
    }

    /// Most recently reported chord (may be "silence")
    pub fn last_reported(&self) -> Option<&str> {
        self.debouncer.last_reported()
    }

    pub fn debounce_state(&self) -> DebounceState {
        self.debouncer.state()
    }

    /// Unit-norm template vector for a chord label
    pub fn template_for(&self, label: &str) -> Option<PitchVector> {
        self.templates.get(label).map(|t| t.vector)
    }

    pub fn every_n_updates(&self) -> u64 {
        self.divider.every_n()
    }

    pub fn window(&self) -> &[f32] {
        self.buffer.as_slice()
    }

    /// Zero the window and forget all debounce state
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.divider.reset();
        self.debouncer.reset();
    }
}
