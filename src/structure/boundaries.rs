// Boundaries - novelty between consecutive bins and threshold peak picking

use super::binning::BinFeatures;
use crate::config::StructureConfig;

/// Weights of the three distance terms
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DistanceWeights {
    pub chord: f64,
    pub bpm: f64,
    pub rate: f64,
    /// BPM difference that counts as 1.0
    pub bpm_scale: f64,
}

impl Default for DistanceWeights {
    fn default() -> Self {
        Self::from(&StructureConfig::default())
    }
}

impl From<&StructureConfig> for DistanceWeights {
    fn from(config: &StructureConfig) -> Self {
        Self {
            chord: config.chord_weight,
            bpm: config.bpm_weight,
            rate: config.rate_weight,
            bpm_scale: config.bpm_scale,
        }
    }
}

/// 1 - |A ∩ B| / |A ∪ B| over the chord sets; two empty sets are identical
pub fn jaccard_distance(a: &BinFeatures, b: &BinFeatures) -> f64 {
    let intersection = a.chord_set().filter(|c| b.chord_set().any(|d| d == *c)).count();
    let union = a.chord_histogram.len() + b.chord_histogram.len() - intersection;
    if union == 0 {
        return 0.0;
    }
    1.0 - intersection as f64 / union as f64
}

/// Distance of each bin to its predecessor; index 0 is 0
pub fn bin_distances(features: &[BinFeatures], weights: &DistanceWeights) -> Vec<f64> {
    let mut distances = Vec::with_capacity(features.len());
    if features.is_empty() {
        return distances;
    }
    distances.push(0.0);

    for pair in features.windows(2) {
        let (prev, cur) = (&pair[0], &pair[1]);
        let d_chord = jaccard_distance(prev, cur);
        let d_bpm = (prev.bpm_mean - cur.bpm_mean).abs() / weights.bpm_scale;
        let d_rate = (prev.change_rate - cur.change_rate).abs();
        distances.push(weights.chord * d_chord + weights.bpm * d_bpm + weights.rate * d_rate);
    }
    distances
}

/// Segment start indices bracketed by 0 and `distances.len()`
///
/// Threshold = mean + `stddevs` x population standard deviation; every
/// index i > 0 with distance >= threshold opens a segment.
pub fn find_boundaries(distances: &[f64], stddevs: f64) -> Vec<usize> {
    let n = distances.len();
    if n == 0 {
        return vec![0];
    }

    let mean = distances.iter().sum::<f64>() / n as f64;
    let std = (distances.iter().map(|d| (d - mean).powi(2)).sum::<f64>() / n as f64).sqrt();
    let threshold = mean + stddevs * std;

    let mut boundaries = vec![0];
    boundaries.extend(
        distances
            .iter()
            .enumerate()
            .skip(1)
            .filter(|(_, d)| **d >= threshold)
            .map(|(i, _)| i),
    );
    boundaries.push(n);
    boundaries.dedup();
    boundaries
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bin(chords: &[&str], bpm_mean: f64, change_rate: f64) -> BinFeatures {
        BinFeatures {
            dominant_chord: chords.first().unwrap_or(&"none").to_string(),
            chord_histogram: chords.iter().map(|c| (c.to_string(), 1)).collect(),
            change_rate,
            bpm_mean,
            bpm_var: 0.0,
        }
    }

    #[test]
    fn test_jaccard() {
        assert_eq!(jaccard_distance(&bin(&[], 0.0, 0.0), &bin(&[], 0.0, 0.0)), 0.0);
        assert_eq!(jaccard_distance(&bin(&["C"], 0.0, 0.0), &bin(&["G"], 0.0, 0.0)), 1.0);
        let d = jaccard_distance(&bin(&["C", "G"], 0.0, 0.0), &bin(&["G", "Am"], 0.0, 0.0));
        assert!((d - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_weighted_distance() {
        let features = vec![bin(&["C"], 120.0, 0.0), bin(&["G"], 100.0, 0.5)];
        let distances = bin_distances(&features, &DistanceWeights::default());
        assert_eq!(distances[0], 0.0);
        // 1.0 * 1 + 0.3 * 20/200 + 0.5 * 0.5
        assert!((distances[1] - 1.28).abs() < 1e-9);
    }

    #[test]
    fn test_single_change_gives_one_boundary() {
        let mut distances = vec![0.0; 10];
        distances[5] = 1.0;
        assert_eq!(find_boundaries(&distances, 1.0), vec![0, 5, 10]);
    }

    #[test]
    fn test_constant_distances_split_everywhere() {
        // std is 0 and the threshold equals every distance except index 0
        let distances = vec![0.0, 0.0, 0.0];
        assert_eq!(find_boundaries(&distances, 1.0), vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_single_bin() {
        assert_eq!(find_boundaries(&[0.0], 1.0), vec![0, 1]);
        assert_eq!(find_boundaries(&[], 1.0), vec![0]);
    }
}
