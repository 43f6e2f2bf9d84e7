//! Configuration management for dynamic parameter tuning
//!
//! This module provides runtime configuration loading from JSON files,
//! enabling fast iteration without recompilation. The heuristic constants
//! of the pipeline (key decay, boundary threshold, distance weights, debounce
//! length) all live here rather than inside the detectors.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::analysis::templates::ChordVocabulary;
use crate::audio::buffer_pool::OverflowPolicy;
use crate::error::AudioError;

/// Complete application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub audio: AudioConfig,
    pub features: FeatureConfig,
    pub chord: ChordConfig,
    pub key: KeyConfig,
    pub tempo: TempoConfig,
    pub cache: CacheConfig,
    pub structure: StructureConfig,
}

/// Capture and hand-off queue parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Nominal sample rate in Hz
    pub sample_rate: u32,
    /// Duration of one capture block in seconds
    pub block_seconds: f32,
    /// Number of blocks the hand-off queue can hold
    pub queue_capacity: usize,
    /// What the producer does when every block slot is in flight
    pub overflow_policy: OverflowPolicy,
    /// How long a single queue read waits before reporting a timeout
    pub poll_timeout_ms: u64,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44_100,
            block_seconds: 0.02,
            queue_capacity: 64,
            overflow_policy: OverflowPolicy::DropIncoming,
            poll_timeout_ms: 100,
        }
    }
}

impl AudioConfig {
    /// Samples per capture block (never zero)
    pub fn block_size(&self) -> usize {
        ((self.block_seconds * self.sample_rate as f32).round() as usize).max(1)
    }

    /// Effective block duration after rounding to whole samples
    pub fn effective_block_seconds(&self) -> f32 {
        self.block_size() as f32 / self.sample_rate.max(1) as f32
    }
}

/// Spectral front-end parameters for the default feature extractor
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    /// FFT size used for chroma frames
    pub chroma_fft_size: usize,
    /// Hop between chroma frames
    pub chroma_hop_length: usize,
    /// Number of most recent samples used for the dominant-frequency probe
    pub frequency_window: usize,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            chroma_fft_size: 8192,
            chroma_hop_length: 2048,
            frequency_window: 4096,
        }
    }
}

/// Chord recognition and debounce parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChordConfig {
    /// Length of the rolling analysis window in seconds
    pub window_seconds: f32,
    /// Desired recognitions per second
    pub detection_hz: f32,
    /// Identical consecutive recognitions required before reporting
    pub smoothing: u32,
    /// Which triads the template set contains
    pub vocabulary: ChordVocabulary,
    /// Peak amplitude below which the window is reported as silence
    pub silence_threshold: f32,
}

impl Default for ChordConfig {
    fn default() -> Self {
        Self {
            window_seconds: 1.5,
            detection_hz: 10.0,
            smoothing: 2,
            vocabulary: ChordVocabulary::All,
            silence_threshold: 0.01,
        }
    }
}

/// Key estimation parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyConfig {
    /// Multiplicative decay applied to the key energy before each chord
    pub decay: f32,
    /// Minimum spacing between two announced key changes
    pub report_interval_seconds: f64,
}

impl Default for KeyConfig {
    fn default() -> Self {
        Self {
            decay: 0.92,
            report_interval_seconds: 0.5,
        }
    }
}

/// Tempo estimation parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TempoConfig {
    /// Length of the tempo rolling buffer in seconds
    pub window_seconds: f32,
    /// Minimum wall-clock spacing between two active updates
    pub update_interval_seconds: f64,
    /// Onset envelope hop in samples
    pub hop_length: usize,
    /// Onset envelope FFT size
    pub fft_size: usize,
    /// Slowest tempo searched
    pub bpm_min: f32,
    /// Fastest tempo searched
    pub bpm_max: f32,
    /// Number of raw estimates the median is taken over
    pub history_size: usize,
}

impl Default for TempoConfig {
    fn default() -> Self {
        Self {
            window_seconds: 8.0,
            update_interval_seconds: 1.0,
            hop_length: 512,
            fft_size: 2048,
            bpm_min: 60.0,
            bpm_max: 200.0,
            history_size: 5,
        }
    }
}

/// Sound cache retention
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Entries older than this many seconds are pruned
    pub window_seconds: f64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            window_seconds: crate::cache::DEFAULT_WINDOW_SECONDS,
        }
    }
}

/// Song structure segmentation parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StructureConfig {
    /// How far back the analyzer looks into the cache
    pub lookback_seconds: f64,
    /// Width of one analysis bin
    pub bin_seconds: f64,
    /// Weight of the chord-set Jaccard distance
    pub chord_weight: f64,
    /// Weight of the mean BPM difference
    pub bpm_weight: f64,
    /// Weight of the chord change-rate difference
    pub rate_weight: f64,
    /// BPM difference that counts as a distance of 1.0
    pub bpm_scale: f64,
    /// Boundary threshold = mean + this many standard deviations
    pub threshold_stddevs: f64,
    /// Shortest fingerprint eligible as a chorus
    pub min_chorus_len: usize,
    /// Fewest repetitions for a fingerprint to become the chorus
    pub min_chorus_occurrences: usize,
}

impl Default for StructureConfig {
    fn default() -> Self {
        Self {
            lookback_seconds: 300.0,
            bin_seconds: 2.0,
            chord_weight: 1.0,
            bpm_weight: 0.3,
            rate_weight: 0.5,
            bpm_scale: 200.0,
            threshold_stddevs: 1.0,
            min_chorus_len: 3,
            min_chorus_occurrences: 2,
        }
    }
}

impl AppConfig {
    /// Load configuration from JSON file
    ///
    /// # Arguments
    /// * `path` - Path to JSON config file
    ///
    /// # Returns
    /// The loaded configuration, or the defaults if the file is missing or
    /// its JSON is invalid (a warning is logged in both cases)
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Self {
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(config) => {
                    log::info!("[Config] Loaded configuration from {:?}", path.as_ref());
                    config
                }
                Err(err) => {
                    log::warn!(
                        "[Config] Failed to parse JSON from {:?}: {}. Using defaults.",
                        path.as_ref(),
                        err
                    );
                    Self::default()
                }
            },
            Err(err) => {
                log::warn!(
                    "[Config] Failed to read config file {:?}: {}. Using defaults.",
                    path.as_ref(),
                    err
                );
                Self::default()
            }
        }
    }

    /// Load the bundled configuration asset
    pub fn load() -> Self {
        Self::load_from_file("assets/analyzer_config.json")
    }

    /// Reject values the pipeline cannot run with
    pub fn validate(&self) -> Result<(), AudioError> {
        let invalid = |reason: &str| {
            Err(AudioError::InvalidConfig {
                reason: reason.to_string(),
            })
        };

        if self.audio.sample_rate == 0 {
            return invalid("audio.sample_rate must be > 0");
        }
        if self.audio.block_seconds <= 0.0 {
            return invalid("audio.block_seconds must be > 0");
        }
        if self.audio.queue_capacity == 0 {
            return invalid("audio.queue_capacity must be > 0");
        }
        if self.features.chroma_fft_size < 2 || self.features.chroma_hop_length == 0 {
            return invalid("features.chroma_fft_size must be >= 2 and chroma_hop_length > 0");
        }
        if self.chord.window_seconds <= 0.0 || self.chord.detection_hz <= 0.0 {
            return invalid("chord.window_seconds and chord.detection_hz must be > 0");
        }
        if self.chord.smoothing == 0 {
            return invalid("chord.smoothing must be >= 1");
        }
        if !(0.0..=1.0).contains(&self.key.decay) {
            return invalid("key.decay must be within [0, 1]");
        }
        if self.tempo.window_seconds <= 0.0 || self.tempo.hop_length == 0 {
            return invalid("tempo.window_seconds and tempo.hop_length must be > 0");
        }
        if self.tempo.bpm_min <= 0.0 || self.tempo.bpm_max <= self.tempo.bpm_min {
            return invalid("tempo bpm range must satisfy 0 < bpm_min < bpm_max");
        }
        if self.tempo.history_size == 0 {
            return invalid("tempo.history_size must be >= 1");
        }
        if self.cache.window_seconds <= 0.0 {
            return invalid("cache.window_seconds must be > 0");
        }
        if self.structure.bin_seconds <= 0.0 {
            return invalid("structure.bin_seconds must be > 0");
        }
        if self.structure.bpm_scale <= 0.0 {
            return invalid("structure.bpm_scale must be > 0");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.key.decay, 0.92);
        assert_eq!(config.chord.smoothing, 2);
        assert_eq!(config.tempo.history_size, 5);
        assert_eq!(config.cache.window_seconds, 600.0);
        assert_eq!(config.structure.chord_weight, 1.0);
        assert_eq!(config.structure.bpm_weight, 0.3);
        assert_eq!(config.structure.rate_weight, 0.5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_block_size_rounding() {
        let audio = AudioConfig::default();
        assert_eq!(audio.block_size(), 882);
        assert!((audio.effective_block_seconds() - 0.02).abs() < 1e-6);
    }

    #[test]
    fn test_json_roundtrip() {
        let config = AppConfig::default();
        let json = serde_json::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed.chord.window_seconds, config.chord.window_seconds);
        assert_eq!(parsed.structure.bin_seconds, config.structure.bin_seconds);
        assert_eq!(parsed.audio.overflow_policy, config.audio.overflow_policy);
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let parsed: AppConfig =
            serde_json::from_str(r#"{ "key": { "decay": 0.5 }, "cache": {} }"#).unwrap();
        assert_eq!(parsed.key.decay, 0.5);
        assert_eq!(parsed.key.report_interval_seconds, 0.5);
        assert_eq!(parsed.cache.window_seconds, 600.0);
        assert_eq!(parsed.tempo.bpm_max, 200.0);
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let config = AppConfig::load_from_file("does/not/exist.json");
        assert_eq!(config.chord.detection_hz, 10.0);
    }

    #[test]
    fn test_validate_rejects_inverted_bpm_range() {
        let mut config = AppConfig::default();
        config.tempo.bpm_min = 180.0;
        config.tempo.bpm_max = 90.0;
        assert!(matches!(
            config.validate(),
            Err(AudioError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn test_validate_rejects_zero_smoothing() {
        let mut config = AppConfig::default();
        config.chord.smoothing = 0;
        assert!(config.validate().is_err());
    }
}
