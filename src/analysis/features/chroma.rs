// Chroma - STFT power folded onto the twelve pitch classes
//
// Each bin between MIN_FREQ and MAX_FREQ contributes its power to the pitch
// class nearest its centre frequency. Frames are normalised by their maximum
// (silent frames are skipped) and then averaged over the window.

use super::fft::{bin_frequency, FftProcessor};
use crate::analysis::templates::PitchVector;

/// Lowest frequency folded into the chroma (A1)
const MIN_FREQ: f32 = 55.0;
/// Highest frequency folded into the chroma
const MAX_FREQ: f32 = 5000.0;

/// Pitch class (0 = C) of a frequency in Hz
pub fn pitch_class(freq: f32) -> usize {
    let midi = 69.0 + 12.0 * (freq / 440.0).log2();
    (midi.round() as i64).rem_euclid(12) as usize
}

pub fn chroma(
    fft: &FftProcessor,
    window: &[f32],
    sample_rate: u32,
    fft_size: usize,
    hop: usize,
) -> PitchVector {
    let mut total = [0.0f32; 12];
    let mut frames = 0usize;

    for spectrum in fft.stft_magnitudes(window, fft_size, hop) {
        let mut frame = [0.0f32; 12];
        for (bin, magnitude) in spectrum.iter().enumerate().skip(1) {
            let freq = bin_frequency(bin, fft_size, sample_rate);
            if freq < MIN_FREQ {
                continue;
            }
            if freq > MAX_FREQ {
                break;
            }
            frame[pitch_class(freq)] += magnitude * magnitude;
        }

        let peak = frame.iter().copied().fold(0.0f32, f32::max);
        if peak <= f32::EPSILON {
            continue;
        }
        for (acc, value) in total.iter_mut().zip(frame) {
            *acc += value / peak;
        }
        frames += 1;
    }

    if frames > 0 {
        for value in total.iter_mut() {
            *value /= frames as f32;
        }
    }
    total
}
