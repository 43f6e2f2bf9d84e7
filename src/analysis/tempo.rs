// TempoEstimator - autocorrelation tempo over an onset envelope
//
// Algorithm (per active update):
// 1. Onset envelope of the rolling window (hop_length frames)
// 2. Min-max normalise, then remove the mean
// 3. Autocorrelation normalised by its zero-lag value
// 4. Search lags in [floor(60*fps/bpm_max), ceil(60*fps/bpm_min)], fps = sr / hop
// 5. BPM = 60 * fps / best_lag, pushed into a short history
// 6. Report the median of the history
//
// Updates are rate-limited by wall-clock time through the injected Clock.

use std::collections::VecDeque;
use std::sync::Arc;

use super::debounce::IntervalGate;
use super::features::FeatureExtractor;
use crate::audio::RollingAudioBuffer;
use crate::clock::Clock;
use crate::config::TempoConfig;

pub struct TempoEstimator {
    buffer: RollingAudioBuffer,
    gate: IntervalGate,
    clock: Arc<dyn Clock>,
    extractor: Arc<dyn FeatureExtractor>,
    sample_rate: u32,
    hop_length: usize,
    fft_size: usize,
    bpm_min: f32,
    bpm_max: f32,
    history: VecDeque<f32>,
    history_size: usize,
    last_estimate: Option<f32>,
}

impl TempoEstimator {
    pub fn new(
        config: &TempoConfig,
        sample_rate: u32,
        extractor: Arc<dyn FeatureExtractor>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let history_size = config.history_size.max(1);
        Self {
            buffer: RollingAudioBuffer::for_duration(config.window_seconds, sample_rate),
            gate: IntervalGate::new(config.update_interval_seconds),
            clock,
            extractor,
            sample_rate,
            hop_length: config.hop_length.max(1),
            fft_size: config.fft_size.max(2),
            bpm_min: config.bpm_min,
            bpm_max: config.bpm_max,
            history: VecDeque::with_capacity(history_size),
            history_size,
            last_estimate: None,
        }
    }

    /// Append samples to the tempo window
    pub fn push(&mut self, samples: &[f32]) {
        self.buffer.push(samples);
    }

    /// Run an update if the rate limit allows it
    ///
    /// Returns the smoothed BPM, or `None` when rate-limited or when the
    /// window carries no usable periodicity.
    pub fn update(&mut self) -> Option<f32> {
        if !self.gate.try_open(self.clock.now()) {
            return None;
        }

        let envelope = self.extractor.onset_strength(
            self.buffer.as_slice(),
            self.sample_rate,
            self.hop_length,
            self.fft_size,
        );
        let fps = self.sample_rate as f32 / self.hop_length as f32;
        let raw = estimate_bpm(&envelope, fps, self.bpm_min, self.bpm_max)?;

        if self.history.len() == self.history_size {
            self.history.pop_front();
        }
        self.history.push_back(raw);

        let smoothed = median(self.history.iter().copied());
        tracing::trace!("[TempoEstimator] raw={:.1} smoothed={:.1}", raw, smoothed);
        self.last_estimate = Some(smoothed);
        Some(smoothed)
    }

    /// Raw estimates the median is taken over, oldest first
    pub fn history(&self) -> impl Iterator<Item = f32> + '_ {
        self.history.iter().copied()
    }

    pub fn last_estimate(&self) -> Option<f32> {
        self.last_estimate
    }

    pub fn reset(&mut self) {
        self.buffer.clear();
        self.gate.reset();
        self.history.clear();
        self.last_estimate = None;
    }
}

/// Single autocorrelation tempo estimate from an onset envelope
///
/// `None` for envelopes shorter than two frames, flat envelopes, a
/// non-positive zero-lag value, or an empty lag range.
pub fn estimate_bpm(envelope: &[f32], frames_per_second: f32, bpm_min: f32, bpm_max: f32) -> Option<f32> {
    let n = envelope.len();
    if n < 2 || frames_per_second <= 0.0 || bpm_min <= 0.0 || bpm_max <= 0.0 {
        return None;
    }

    let (min, max) = envelope
        .iter()
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    let range = max - min;
    if !range.is_finite() || range <= f32::EPSILON {
        return None;
    }

    let scaled: Vec<f32> = envelope.iter().map(|v| (v - min) / range).collect();
    let mean = scaled.iter().sum::<f32>() / n as f32;
    let centered: Vec<f32> = scaled.iter().map(|v| v - mean).collect();

    let zero_lag: f32 = centered.iter().map(|v| v * v).sum();
    if zero_lag <= 0.0 {
        return None;
    }

    let min_lag = ((60.0 * frames_per_second / bpm_max).floor() as usize).max(1);
    let max_lag = ((60.0 * frames_per_second / bpm_min).ceil() as usize).min(n - 1);
    if min_lag > max_lag {
        return None;
    }

    let mut best_lag = min_lag;
    let mut best_value = f32::NEG_INFINITY;
    for lag in min_lag..=max_lag {
        let value = centered[..n - lag]
            .iter()
            .zip(&centered[lag..])
            .map(|(a, b)| a * b)
            .sum::<f32>()
            / zero_lag;
        if value > best_value {
            best_value = value;
            best_lag = lag;
        }
    }

    Some(60.0 * frames_per_second / best_lag as f32)
}

fn median(values: impl Iterator<Item = f32>) -> f32 {
    let mut sorted: Vec<f32> = values.collect();
    if sorted.is_empty() {
        return 0.0;
    }
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::features::SpectralFeatureExtractor;
    use crate::clock::ManualClock;

    fn pulse_envelope(period: usize, len: usize) -> Vec<f32> {
        (0..len).map(|i| if i % period == 0 { 1.0 } else { 0.0 }).collect()
    }

    #[test]
    fn test_estimate_from_pulse_train() {
        // 100 frames per second, pulse every 50 frames -> 120 BPM
        let bpm = estimate_bpm(&pulse_envelope(50, 800), 100.0, 60.0, 200.0).unwrap();
        assert!((bpm - 120.0).abs() < 1e-3);
    }

    #[test]
    fn test_degenerate_envelopes() {
        assert_eq!(estimate_bpm(&[], 100.0, 60.0, 200.0), None);
        assert_eq!(estimate_bpm(&[1.0], 100.0, 60.0, 200.0), None);
        assert_eq!(estimate_bpm(&[0.0; 500], 100.0, 60.0, 200.0), None);
        assert_eq!(estimate_bpm(&[0.3; 500], 100.0, 60.0, 200.0), None);
    }

    #[test]
    fn test_lag_range_clamped_to_envelope() {
        // Shortest lag for 200 BPM at 100 fps is 30 frames; a 20 frame
        // envelope has no lag in range
        assert_eq!(estimate_bpm(&pulse_envelope(5, 20), 100.0, 60.0, 200.0), None);
    }

    #[test]
    fn test_median() {
        assert_eq!(median([3.0, 1.0, 2.0].into_iter()), 2.0);
        assert_eq!(median([4.0, 1.0, 3.0, 2.0].into_iter()), 2.5);
    }

    fn click_track(period_samples: usize, seconds: f32, sample_rate: u32) -> Vec<f32> {
        let mut audio = vec![0.0f32; (seconds * sample_rate as f32) as usize];
        for start in (0..audio.len()).step_by(period_samples) {
            for (i, sample) in audio.iter_mut().skip(start).take(200).enumerate() {
                *sample = if i % 2 == 0 { 0.8 } else { -0.8 };
            }
        }
        audio
    }

    #[test]
    fn test_rate_limit_and_click_track() {
        let sample_rate = 22_050;
        let config = TempoConfig::default();
        // Clicks every 22 hops (~117.5 BPM) so the beat period is a whole lag
        let period = 22 * config.hop_length;
        let expected = 60.0 * sample_rate as f32 / period as f32;

        let clock = Arc::new(ManualClock::new(0.0));
        let mut estimator = TempoEstimator::new(
            &config,
            sample_rate,
            Arc::new(SpectralFeatureExtractor::default()),
            clock.clone(),
        );

        estimator.push(&click_track(period, 8.0, sample_rate));
        let bpm = estimator.update().expect("first update runs");
        assert!((bpm - expected).abs() < 4.0, "got {bpm}, expected {expected}");

        // Inside the interval: no-op
        clock.advance(0.5);
        assert_eq!(estimator.update(), None);
        assert_eq!(estimator.history().count(), 1);

        clock.advance(0.6);
        assert!(estimator.update().is_some());
        assert_eq!(estimator.history().count(), 2);
        assert!(estimator.last_estimate().is_some());

        estimator.reset();
        assert_eq!(estimator.last_estimate(), None);
        assert_eq!(estimator.history().count(), 0);
    }

    #[test]
    fn test_silence_gives_no_estimate() {
        let mut estimator = TempoEstimator::new(
            &TempoConfig::default(),
            22_050,
            Arc::new(SpectralFeatureExtractor::default()),
            Arc::new(ManualClock::new(0.0)),
        );
        estimator.push(&vec![0.0; 22_050]);
        assert_eq!(estimator.update(), None);
    }
}
