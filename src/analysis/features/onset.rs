// Onset envelope - spectral flux over log-compressed magnitudes
//
// flux_t = mean_k max(0, log(1 + |X_t[k]|) - log(1 + |X_(t-1)[k]|))
// The first frame has no predecessor and is defined as 0.

use super::fft::FftProcessor;

pub fn onset_strength(
    fft: &FftProcessor,
    window: &[f32],
    hop_length: usize,
    fft_size: usize,
) -> Vec<f32> {
    let spectra = fft.stft_magnitudes(window, fft_size, hop_length);
    let mut envelope = Vec::with_capacity(spectra.len());
    let mut previous: Option<Vec<f32>> = None;

    for spectrum in spectra {
        let compressed: Vec<f32> = spectrum.iter().map(|m| m.ln_1p()).collect();
        let flux = match &previous {
            Some(prev) => {
                let rise: f32 = compressed
                    .iter()
                    .zip(prev)
                    .map(|(cur, old)| (cur - old).max(0.0))
                    .sum();
                rise / compressed.len() as f32
            }
            None => 0.0,
        };
        envelope.push(flux);
        previous = Some(compressed);
    }

    envelope
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_click_produces_peak() {
        let mut audio = vec![0.0f32; 8192];
        for sample in audio.iter_mut().skip(4096).take(64) {
            *sample = 1.0;
        }
        let envelope = onset_strength(&FftProcessor::new(), &audio, 512, 1024);
        assert_eq!(envelope[0], 0.0);

        let peak = envelope
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i)
            .unwrap();
        // Click enters the frame starting at 3584 (index 7) or its neighbour
        assert!((6..=8).contains(&peak), "peak at frame {peak}");
        assert!(envelope[peak] > 0.0);
    }

    #[test]
    fn test_silence_is_flat() {
        let envelope = onset_strength(&FftProcessor::new(), &vec![0.0; 4096], 512, 1024);
        assert_eq!(envelope.len(), 7);
        assert!(envelope.iter().all(|v| *v == 0.0));
    }
}
