//! Song structure segmentation over cached observations
//!
//! One on-demand pass: fetch a [`SoundCache::since`] snapshot, bin it on a
//! fixed grid, compute per-bin features, place boundaries where consecutive
//! bins differ by more than mean + k·σ, then label the resulting segments
//! (chorus by repeated fingerprint, the rest by a [`LabelPolicy`]).

pub mod binning;
pub mod boundaries;
pub mod labeling;

use serde::Serialize;

pub use binning::{bin_entries, BinFeatures};
pub use boundaries::{bin_distances, find_boundaries, jaccard_distance, DistanceWeights};
pub use labeling::{
    fingerprint, find_chorus, ChorusGatedLabelPolicy, LabelContext, LabelPolicy,
    PositionalLabelPolicy, SectionLabel,
};

use crate::cache::{CacheEntry, SoundCache};
use crate::config::StructureConfig;
use crate::error::CacheError;

/// A contiguous run of bins with its label
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Segment {
    /// Timestamp of the first entry of the first bin
    pub start: f64,
    /// Timestamp of the last entry of the last bin
    pub end: f64,
    /// Dominant chord of each bin in the segment
    pub dominant_chords: Vec<String>,
    pub fingerprint: Vec<String>,
    pub label: SectionLabel,
}

pub struct SongStructureAnalyzer {
    config: StructureConfig,
    policy: Box<dyn LabelPolicy>,
}

impl Default for SongStructureAnalyzer {
    fn default() -> Self {
        Self::new(StructureConfig::default())
    }
}

impl SongStructureAnalyzer {
    pub fn new(config: StructureConfig) -> Self {
        Self::with_policy(config, Box::new(PositionalLabelPolicy))
    }

    pub fn with_policy(config: StructureConfig, policy: Box<dyn LabelPolicy>) -> Self {
        Self { config, policy }
    }

    pub fn config(&self) -> &StructureConfig {
        &self.config
    }

    /// Segment the configured lookback of `cache`
    ///
    /// # Errors
    /// Propagates [`CacheError::UnsupportedLookback`] when the lookback is not
    /// shorter than the cache window, and [`CacheError::InvalidBinWidth`]
    /// when the bin width is not a positive number.
    pub fn analyze(&self, cache: &SoundCache) -> Result<Vec<Segment>, CacheError> {
        self.check_bin_width()?;
        let entries = cache.since(self.config.lookback_seconds)?;
        self.analyze_entries(&entries)
    }

    /// Segment an already fetched, time-ordered list of entries
    pub fn analyze_entries(&self, entries: &[CacheEntry]) -> Result<Vec<Segment>, CacheError> {
        self.check_bin_width()?;
        if entries.is_empty() {
            return Ok(Vec::new());
        }

        let bins = bin_entries(entries, self.config.bin_seconds);
        let features: Vec<BinFeatures> = bins.iter().map(|b| BinFeatures::from_entries(b)).collect();
        let distances = bin_distances(&features, &DistanceWeights::from(&self.config));
        let boundaries = find_boundaries(&distances, self.config.threshold_stddevs);

        let mut segments: Vec<Segment> = boundaries
            .windows(2)
            .filter_map(|range| {
                let (a, b) = (range[0], range[1]);
                let start = bins[a].first()?.timestamp;
                let end = bins[b - 1].last()?.timestamp;
                let dominant_chords: Vec<String> =
                    features[a..b].iter().map(|f| f.dominant_chord.clone()).collect();
                Some(Segment {
                    start,
                    end,
                    fingerprint: fingerprint(&dominant_chords),
                    dominant_chords,
                    label: SectionLabel::Verse,
                })
            })
            .collect();

        let fingerprints: Vec<Vec<String>> = segments.iter().map(|s| s.fingerprint.clone()).collect();
        let labels = labeling::label_fingerprints(
            &fingerprints,
            self.policy.as_ref(),
            self.config.min_chorus_len,
            self.config.min_chorus_occurrences,
        );
        for (segment, label) in segments.iter_mut().zip(labels) {
            segment.label = label;
        }

        tracing::debug!(
            "[SongStructure] {} entries, {} bins, {} segments",
            entries.len(),
            bins.len(),
            segments.len()
        );
        Ok(segments)
    }

    fn check_bin_width(&self) -> Result<(), CacheError> {
        let bin_seconds = self.config.bin_seconds;
        if bin_seconds.is_finite() && bin_seconds > 0.0 {
            Ok(())
        } else {
            Err(CacheError::InvalidBinWidth { bin_seconds })
        }
    }
}
