// FFT module - windowed magnitude spectra over framed signals
//
// Frames are Hann-windowed and zero-padded to the FFT size. Only the
// positive-frequency half of the spectrum is returned (fft_size / 2 + 1 bins).

use rustfft::{num_complex::Complex, FftPlanner};
use std::sync::{Mutex, PoisonError};

/// FFT processor shared by the chroma, onset and frequency probes
pub struct FftProcessor {
    fft_planner: Mutex<FftPlanner<f32>>,
}

impl Default for FftProcessor {
    fn default() -> Self {
        Self::new()
    }
}

impl FftProcessor {
    pub fn new() -> Self {
        Self {
            fft_planner: Mutex::new(FftPlanner::new()),
        }
    }

    /// Compute magnitude spectrum using FFT
    ///
    /// # Arguments
    /// * `audio` - Audio frame (samples beyond `fft_size` are ignored)
    /// * `fft_size` - Transform length
    ///
    /// # Returns
    /// Magnitude spectrum (size = fft_size / 2 + 1)
    pub fn magnitude_spectrum(&self, audio: &[f32], fft_size: usize) -> Vec<f32> {
        let fft_size = fft_size.max(2);
        let mut buffer: Vec<Complex<f32>> = audio
            .iter()
            .take(fft_size)
            .enumerate()
            .map(|(i, &sample)| Complex::new(sample * hann(i, fft_size), 0.0))
            .collect();
        buffer.resize(fft_size, Complex::new(0.0, 0.0));

        let fft = self
            .fft_planner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .plan_fft_forward(fft_size);
        fft.process(&mut buffer);

        buffer[..fft_size / 2 + 1].iter().map(|c| c.norm()).collect()
    }

    /// Magnitude spectra of consecutive frames (`fft_size` long, `hop` apart)
    ///
    /// A signal shorter than one frame yields a single zero-padded frame;
    /// an empty signal yields none.
    pub fn stft_magnitudes(&self, signal: &[f32], fft_size: usize, hop: usize) -> Vec<Vec<f32>> {
        frame_starts(signal.len(), fft_size, hop)
            .map(|start| {
                let end = (start + fft_size).min(signal.len());
                self.magnitude_spectrum(&signal[start..end], fft_size)
            })
            .collect()
    }
}

/// Start offsets of the analysis frames
pub fn frame_starts(len: usize, fft_size: usize, hop: usize) -> impl Iterator<Item = usize> {
    let hop = hop.max(1);
    let count = if len == 0 {
        0
    } else if len <= fft_size {
        1
    } else {
        1 + (len - fft_size) / hop
    };
    (0..count).map(move |i| i * hop)
}

/// Centre frequency of an FFT bin in Hz
pub fn bin_frequency(bin: usize, fft_size: usize, sample_rate: u32) -> f32 {
    bin as f32 * sample_rate as f32 / fft_size as f32
}

fn hann(i: usize, size: usize) -> f32 {
    0.5 * (1.0 - ((2.0 * std::f32::consts::PI * i as f32) / (size as f32 - 1.0)).cos())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sine_peak_bin() {
        let sample_rate = 8000;
        let fft_size = 1024;
        let freq = 1000.0;
        let audio: Vec<f32> = (0..fft_size)
            .map(|i| (2.0 * std::f32::consts::PI * freq * i as f32 / sample_rate as f32).sin())
            .collect();

        let spectrum = FftProcessor::new().magnitude_spectrum(&audio, fft_size);
        assert_eq!(spectrum.len(), fft_size / 2 + 1);

        let peak = spectrum
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i)
            .unwrap();
        assert_eq!(peak, 128);
        assert!((bin_frequency(peak, fft_size, sample_rate) - 1000.0).abs() < 1e-3);
    }

    #[test]
    fn test_frame_starts() {
        assert_eq!(frame_starts(0, 4, 2).count(), 0);
        assert_eq!(frame_starts(3, 4, 2).collect::<Vec<_>>(), vec![0]);
        assert_eq!(frame_starts(10, 4, 2).collect::<Vec<_>>(), vec![0, 2, 4, 6]);
    }
}
