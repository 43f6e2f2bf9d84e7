// Labeling - chorus detection by repeated fingerprints, positional fallback
//
// Fingerprint: a segment's dominant-chord sequence with "none" removed and
// consecutive repeats collapsed (["C","C","G","G","Am"] -> ["C","G","Am"]).
// The most frequent fingerprint that repeats often enough and is long enough
// is the chorus. Everything else is labelled by a LabelPolicy.

use serde::Serialize;
use std::fmt;

use crate::cache::NO_CHORD;

/// Section names produced by the analyzer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SectionLabel {
    Chorus,
    Verse,
    Bridge,
}

impl fmt::Display for SectionLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SectionLabel::Chorus => "chorus",
            SectionLabel::Verse => "verse",
            SectionLabel::Bridge => "bridge",
        };
        f.write_str(name)
    }
}

/// Where a non-chorus segment sits in the song
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LabelContext {
    /// Position over all segments in temporal order
    pub index: usize,
    /// Position over the segments that did not match the chorus
    pub non_chorus_index: usize,
    pub chorus_found: bool,
}

/// Labels segments that did not match the chorus fingerprint
pub trait LabelPolicy: Send + Sync {
    fn label(&self, context: LabelContext) -> SectionLabel;
}

/// Best-effort labeling: the first two non-chorus segments are verses, the
/// rest are bridges, whether or not a chorus was found. Not musically
/// validated.
#[derive(Debug, Clone, Copy, Default)]
pub struct PositionalLabelPolicy;

impl LabelPolicy for PositionalLabelPolicy {
    fn label(&self, context: LabelContext) -> SectionLabel {
        if context.non_chorus_index < 2 {
            SectionLabel::Verse
        } else {
            SectionLabel::Bridge
        }
    }
}

/// Verses everywhere until a chorus exists; with a chorus, segments past the
/// second overall position become bridges. Also best-effort.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChorusGatedLabelPolicy;

impl LabelPolicy for ChorusGatedLabelPolicy {
    fn label(&self, context: LabelContext) -> SectionLabel {
        if !context.chorus_found || context.index < 2 {
            SectionLabel::Verse
        } else {
            SectionLabel::Bridge
        }
    }
}

/// Collapse consecutive repeats and drop the "none" sentinel
///
/// A repeat is judged against the raw predecessor, so "none" between two
/// equal chords keeps both of them.
pub fn fingerprint(dominant_chords: &[String]) -> Vec<String> {
    let mut out = Vec::new();
    let mut last: Option<&str> = None;
    for chord in dominant_chords {
        if last != Some(chord.as_str()) && chord != NO_CHORD {
            out.push(chord.clone());
        }
        last = Some(chord.as_str());
    }
    out
}

/// Most frequent fingerprint (first occurrence wins ties) that meets both
/// minimums
pub fn find_chorus(
    fingerprints: &[Vec<String>],
    min_len: usize,
    min_occurrences: usize,
) -> Option<&[String]> {
    let mut counts: Vec<(&[String], usize)> = Vec::new();
    for fp in fingerprints {
        match counts.iter_mut().find(|(seen, _)| *seen == fp.as_slice()) {
            Some((_, count)) => *count += 1,
            None => counts.push((fp.as_slice(), 1)),
        }
    }
    // Stable: equal counts stay in first-occurrence order
    counts.sort_by(|a, b| b.1.cmp(&a.1));

    counts
        .into_iter()
        .find(|(fp, count)| *count >= min_occurrences && fp.len() >= min_len)
        .map(|(fp, _)| fp)
}

/// Label every fingerprint: chorus matches first, then the policy
pub fn label_fingerprints(
    fingerprints: &[Vec<String>],
    policy: &dyn LabelPolicy,
    min_chorus_len: usize,
    min_chorus_occurrences: usize,
) -> Vec<SectionLabel> {
    let chorus = find_chorus(fingerprints, min_chorus_len, min_chorus_occurrences);
    let mut non_chorus_index = 0;
    fingerprints
        .iter()
        .enumerate()
        .map(|(index, fp)| match chorus {
            Some(chorus) if fp.as_slice() == chorus => SectionLabel::Chorus,
            _ => {
                let context = LabelContext {
                    index,
                    non_chorus_index,
                    chorus_found: chorus.is_some(),
                };
                non_chorus_index += 1;
                policy.label(context)
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seq(chords: &[&str]) -> Vec<String> {
        chords.iter().map(|c| c.to_string()).collect()
    }

    #[test]
    fn test_fingerprint_collapse() {
        assert_eq!(
            fingerprint(&seq(&["C", "C", "G", "G", "Am"])),
            seq(&["C", "G", "Am"])
        );
        assert_eq!(fingerprint(&seq(&["none", "C", "none"])), seq(&["C"]));
        assert_eq!(fingerprint(&seq(&["C", "none", "C"])), seq(&["C", "C"]));
        assert!(fingerprint(&[]).is_empty());
    }

    #[test]
    fn test_chorus_voting() {
        let a = seq(&["C", "G", "Am"]);
        let b = seq(&["F", "G"]);
        let fingerprints = vec![a.clone(), b.clone(), a.clone()];

        assert_eq!(find_chorus(&fingerprints, 3, 2), Some(a.as_slice()));
        let labels = label_fingerprints(&fingerprints, &PositionalLabelPolicy, 3, 2);
        assert_eq!(
            labels,
            vec![SectionLabel::Chorus, SectionLabel::Verse, SectionLabel::Chorus]
        );
    }

    #[test]
    fn test_short_repeats_are_not_chorus() {
        let short = seq(&["F", "G"]);
        let fingerprints = vec![short.clone(), short.clone(), seq(&["C", "D", "E"])];
        assert_eq!(find_chorus(&fingerprints, 3, 2), None);

        // best-effort labeling, not a musical guarantee
        let labels = label_fingerprints(&fingerprints, &PositionalLabelPolicy, 3, 2);
        assert_eq!(
            labels,
            vec![SectionLabel::Verse, SectionLabel::Verse, SectionLabel::Bridge]
        );
    }

    #[test]
    fn test_bridge_counts_only_non_chorus_segments() {
        let chorus = seq(&["C", "G", "Am"]);
        let fingerprints = vec![
            seq(&["D"]),
            chorus.clone(),
            seq(&["E"]),
            chorus.clone(),
            seq(&["F", "G"]),
        ];
        // best-effort labeling: [D] and [E] are the first two non-chorus parts
        let labels = label_fingerprints(&fingerprints, &PositionalLabelPolicy, 3, 2);
        assert_eq!(
            labels,
            vec![
                SectionLabel::Verse,
                SectionLabel::Chorus,
                SectionLabel::Verse,
                SectionLabel::Chorus,
                SectionLabel::Bridge,
            ]
        );

        let gated = label_fingerprints(&fingerprints, &ChorusGatedLabelPolicy, 3, 2);
        assert_eq!(gated[2], SectionLabel::Bridge);
        assert_eq!(gated[4], SectionLabel::Bridge);
    }

    #[test]
    fn test_chorus_gated_policy_without_chorus() {
        let fingerprints = vec![seq(&["C"]), seq(&["G"]), seq(&["F"])];
        let labels = label_fingerprints(&fingerprints, &ChorusGatedLabelPolicy, 3, 2);
        assert!(labels.iter().all(|l| *l == SectionLabel::Verse));
    }

    #[test]
    fn test_custom_policy() {
        struct AlwaysBridge;
        impl LabelPolicy for AlwaysBridge {
            fn label(&self, _context: LabelContext) -> SectionLabel {
                SectionLabel::Bridge
            }
        }
        let labels = label_fingerprints(&[seq(&["C"])], &AlwaysBridge, 3, 2);
        assert_eq!(labels, vec![SectionLabel::Bridge]);
        assert_eq!(SectionLabel::Bridge.to_string(), "bridge");
    }
}
