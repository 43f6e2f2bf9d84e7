// FeatureExtractor - signal-processing seam of the analysis pipeline
//
// The detectors only see this trait: chroma vectors for chord matching, an
// onset envelope for tempo, and a dominant-frequency probe for the cache.
// SpectralFeatureExtractor is the default rustfft-based implementation.
//
// Module organization:
// - fft: framing, windowing and magnitude spectra
// - chroma: STFT power folded onto pitch classes
// - onset: log-magnitude spectral flux envelope
// - mod.rs: trait + default implementation

mod chroma;
mod fft;
mod onset;

pub use chroma::pitch_class;
pub use fft::FftProcessor;

use crate::analysis::templates::PitchVector;
use crate::config::FeatureConfig;

/// Opaque audio-window transforms consumed by the detectors
pub trait FeatureExtractor: Send + Sync {
    /// Frame-averaged 12-bin chroma of `window` (not yet L2-normalised)
    fn chroma(&self, window: &[f32], sample_rate: u32) -> PitchVector;

    /// Onset-strength envelope, one value per `hop_length` frame
    fn onset_strength(
        &self,
        window: &[f32],
        sample_rate: u32,
        hop_length: usize,
        fft_size: usize,
    ) -> Vec<f32>;

    /// Frequency of the strongest spectral peak, `None` for silence
    fn dominant_frequency(&self, window: &[f32], sample_rate: u32) -> Option<f32>;
}

/// Default extractor built on [`FftProcessor`]
pub struct SpectralFeatureExtractor {
    fft: FftProcessor,
    chroma_fft_size: usize,
    chroma_hop_length: usize,
    frequency_window: usize,
}

impl Default for SpectralFeatureExtractor {
    fn default() -> Self {
        Self::new(&FeatureConfig::default())
    }
}

impl SpectralFeatureExtractor {
    pub fn new(config: &FeatureConfig) -> Self {
        Self {
            fft: FftProcessor::new(),
            chroma_fft_size: config.chroma_fft_size.max(2),
            chroma_hop_length: config.chroma_hop_length.max(1),
            frequency_window: config.frequency_window.max(2),
        }
    }
}

impl FeatureExtractor for SpectralFeatureExtractor {
    fn chroma(&self, window: &[f32], sample_rate: u32) -> PitchVector {
        chroma::chroma(
            &self.fft,
            window,
            sample_rate,
            self.chroma_fft_size,
            self.chroma_hop_length,
        )
    }

    fn onset_strength(
        &self,
        window: &[f32],
        _sample_rate: u32,
        hop_length: usize,
        fft_size: usize,
    ) -> Vec<f32> {
        onset::onset_strength(&self.fft, window, hop_length.max(1), fft_size.max(2))
    }

    fn dominant_frequency(&self, window: &[f32], sample_rate: u32) -> Option<f32> {
        let start = window.len().saturating_sub(self.frequency_window);
        let spectrum = self
            .fft
            .magnitude_spectrum(&window[start..], self.frequency_window);

        let (bin, magnitude) = spectrum
            .iter()
            .enumerate()
            .skip(1)
            .fold((0usize, 0.0f32), |best, (i, &m)| if m > best.1 { (i, m) } else { best });

        if bin == 0 || magnitude <= 1e-6 {
            return None;
        }
        Some(fft::bin_frequency(bin, self.frequency_window, sample_rate))
    }
}
