// Binning - fixed-width time bins and per-bin features
//
// The bin grid is anchored at the first entry's timestamp. An entry joins the
// open bin while ts < bin_start + bin_seconds; otherwise the bin closes and
// the next one opens on the grid cell containing the entry. Bins are
// contiguous slices that partition the input.

use crate::cache::{CacheEntry, NO_CHORD};

/// Split time-ordered entries into grid-aligned bins
pub fn bin_entries(entries: &[CacheEntry], bin_seconds: f64) -> Vec<&[CacheEntry]> {
    let Some(first) = entries.first() else {
        return Vec::new();
    };

    let origin = first.timestamp;
    let mut bins = Vec::new();
    let mut bin_start_index = 0;
    let mut bin_start = origin;

    for (i, entry) in entries.iter().enumerate() {
        if entry.timestamp < bin_start + bin_seconds {
            continue;
        }
        bins.push(&entries[bin_start_index..i]);
        bin_start_index = i;
        bin_start = origin + ((entry.timestamp - origin) / bin_seconds).floor() * bin_seconds;
    }
    bins.push(&entries[bin_start_index..]);
    bins
}

/// Summary of one bin
#[derive(Debug, Clone, PartialEq)]
pub struct BinFeatures {
    /// Most frequent chord (first seen wins ties), or "none"
    pub dominant_chord: String,
    /// Chord counts in first-seen order
    pub chord_histogram: Vec<(String, usize)>,
    /// Adjacent chord changes / max(1, chords - 1)
    pub change_rate: f64,
    /// Mean over strictly positive BPM values (0 if none)
    pub bpm_mean: f64,
    /// Population variance over strictly positive BPM values
    pub bpm_var: f64,
}

impl BinFeatures {
    pub fn from_entries(entries: &[CacheEntry]) -> Self {
        let chords: Vec<&str> = entries
            .iter()
            .map(|e| e.chord.as_str())
            .filter(|c| !c.is_empty() && *c != NO_CHORD)
            .collect();
        let bpms: Vec<f64> = entries.iter().map(|e| e.bpm).filter(|b| *b > 0.0).collect();

        let mut histogram: Vec<(String, usize)> = Vec::new();
        for chord in &chords {
            match histogram.iter_mut().find(|(c, _)| c == chord) {
                Some((_, count)) => *count += 1,
                None => histogram.push((chord.to_string(), 1)),
            }
        }

        let mut dominant: Option<&(String, usize)> = None;
        for item in &histogram {
            if dominant.map_or(true, |d| item.1 > d.1) {
                dominant = Some(item);
            }
        }
        let dominant_chord = dominant.map_or_else(|| NO_CHORD.to_string(), |d| d.0.clone());

        let change_rate = if chords.is_empty() {
            0.0
        } else {
            let changes = chords.windows(2).filter(|w| w[0] != w[1]).count();
            changes as f64 / (chords.len().saturating_sub(1)).max(1) as f64
        };

        let (bpm_mean, bpm_var) = if bpms.is_empty() {
            (0.0, 0.0)
        } else {
            let mean = bpms.iter().sum::<f64>() / bpms.len() as f64;
            let var = bpms.iter().map(|b| (b - mean).powi(2)).sum::<f64>() / bpms.len() as f64;
            (mean, var)
        };

        Self {
            dominant_chord,
            chord_histogram: histogram,
            change_rate,
            bpm_mean,
            bpm_var,
        }
    }

    /// Distinct chords present in the bin
    pub fn chord_set(&self) -> impl Iterator<Item = &str> {
        self.chord_histogram.iter().map(|(c, _)| c.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(chord: &str, bpm: f64, ts: f64) -> CacheEntry {
        CacheEntry::new(chord, 0.0, bpm, ts)
    }

    #[test]
    fn test_bins_partition_entries() {
        let entries: Vec<_> = [0.0, 0.5, 1.9, 2.0, 2.1, 7.3, 7.9, 8.0]
            .iter()
            .map(|ts| entry("C", 0.0, 100.0 + ts))
            .collect();
        let bins = bin_entries(&entries, 2.0);

        let sizes: Vec<usize> = bins.iter().map(|b| b.len()).collect();
        assert_eq!(sizes, vec![3, 2, 2, 1]);
        assert_eq!(sizes.iter().sum::<usize>(), entries.len());
    }

    #[test]
    fn test_grid_anchored_at_first_entry() {
        // 104.5 opens the [104, 106) cell, so 105.9 stays in it
        let entries: Vec<_> = [100.0, 104.5, 105.9, 106.0]
            .iter()
            .map(|ts| entry("C", 0.0, *ts))
            .collect();
        let sizes: Vec<usize> = bin_entries(&entries, 2.0).iter().map(|b| b.len()).collect();
        assert_eq!(sizes, vec![1, 2, 1]);
    }

    #[test]
    fn test_empty_input() {
        assert!(bin_entries(&[], 2.0).is_empty());
    }

    #[test]
    fn test_features() {
        let entries = vec![
            entry("C", 120.0, 0.0),
            entry("G", 0.0, 0.1),
            entry("none", 124.0, 0.2),
            entry("G", 122.0, 0.3),
            entry("C", 0.0, 0.4),
        ];
        let features = BinFeatures::from_entries(&entries);
        // C and G tie at two each; C was seen first
        assert_eq!(features.dominant_chord, "C");
        // C G G C -> 2 changes over 3 transitions
        assert!((features.change_rate - 2.0 / 3.0).abs() < 1e-9);
        assert!((features.bpm_mean - 122.0).abs() < 1e-9);
        assert!((features.bpm_var - 8.0 / 3.0).abs() < 1e-9);
        assert_eq!(features.chord_set().collect::<Vec<_>>(), vec!["C", "G"]);
    }

    #[test]
    fn test_features_without_chords() {
        let features = BinFeatures::from_entries(&[entry("none", 0.0, 0.0)]);
        assert_eq!(features.dominant_chord, NO_CHORD);
        assert_eq!(features.change_rate, 0.0);
        assert_eq!(features.bpm_mean, 0.0);
        assert!(features.chord_histogram.is_empty());
    }
}
