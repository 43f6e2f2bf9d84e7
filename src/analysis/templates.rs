// Templates - unit-norm pitch-class reference vectors for chords and keys
//
// Chord templates are triads (root, third, fifth). Key templates are the seven
// pitch classes of the major / natural-minor scale rotated to each root.
// Chords are ordered root ascending C..B, major before minor at each root
// (C, Cm, C#, C#m, ...). Keys list all twelve majors before the minors.
// Every argmax in the crate resolves ties to the earliest template.

use serde::{Deserialize, Serialize};

/// Pitch-class names, index 0 = C
pub const PITCH_CLASSES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// 12-dimensional pitch-class energy vector
pub type PitchVector = [f32; 12];

const MAJOR_TRIAD: [usize; 3] = [0, 4, 7];
const MINOR_TRIAD: [usize; 3] = [0, 3, 7];
const MAJOR_SCALE: [usize; 7] = [0, 2, 4, 5, 7, 9, 11];
const MINOR_SCALE: [usize; 7] = [0, 2, 3, 5, 7, 8, 10];

/// Which triads the chord template set contains
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChordVocabulary {
    #[default]
    All,
    Major,
    Minor,
}

/// A labelled unit-norm reference vector
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    pub label: String,
    pub vector: PitchVector,
}

impl Template {
    fn from_intervals(label: String, root: usize, intervals: &[usize]) -> Self {
        let mut vector = [0.0f32; 12];
        for interval in intervals {
            vector[(root + interval) % 12] = 1.0;
        }
        Self {
            label,
            vector: normalize(&vector),
        }
    }
}

/// Ordered collection of templates with first-wins matching
#[derive(Debug, Clone)]
pub struct TemplateSet {
    templates: Vec<Template>,
}

impl TemplateSet {
    /// Chord triads; minor labels carry an `m` suffix ("Am", "C#m")
    pub fn chords(vocabulary: ChordVocabulary) -> Self {
        let mut templates = Vec::with_capacity(24);
        for (root, name) in PITCH_CLASSES.iter().enumerate() {
            if vocabulary != ChordVocabulary::Minor {
                templates.push(Template::from_intervals(name.to_string(), root, &MAJOR_TRIAD));
            }
            if vocabulary != ChordVocabulary::Major {
                templates.push(Template::from_intervals(format!("{name}m"), root, &MINOR_TRIAD));
            }
        }
        Self { templates }
    }

    /// 12 major keys followed by 12 natural-minor keys ("C major", "A minor")
    pub fn keys() -> Self {
        let mut templates = Vec::with_capacity(24);
        for (root, name) in PITCH_CLASSES.iter().enumerate() {
            templates.push(Template::from_intervals(format!("{name} major"), root, &MAJOR_SCALE));
        }
        for (root, name) in PITCH_CLASSES.iter().enumerate() {
            templates.push(Template::from_intervals(format!("{name} minor"), root, &MINOR_SCALE));
        }
        Self { templates }
    }

    /// Dot product of `vector` against every template, in canonical order
    pub fn scores(&self, vector: &PitchVector) -> Vec<f32> {
        self.templates.iter().map(|t| dot(&t.vector, vector)).collect()
    }

    /// Best-scoring template and its score; ties go to the earliest template
    pub fn best_match(&self, vector: &PitchVector) -> Option<(&Template, f32)> {
        let mut best: Option<(&Template, f32)> = None;
        for template in &self.templates {
            let score = dot(&template.vector, vector);
            match best {
                Some((_, top)) if score <= top => {}
                _ => best = Some((template, score)),
            }
        }
        best
    }

    /// Look up a template by label
    pub fn get(&self, label: &str) -> Option<&Template> {
        self.templates.iter().find(|t| t.label == label)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Template> {
        self.templates.iter()
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}

/// L2-normalise; vectors with (near) zero norm come back unchanged
pub fn normalize(vector: &PitchVector) -> PitchVector {
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm <= 1e-9 {
        return *vector;
    }
    let mut out = [0.0f32; 12];
    for (o, v) in out.iter_mut().zip(vector) {
        *o = v / norm;
    }
    out
}

pub fn dot(a: &PitchVector, b: &PitchVector) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chord_template_self_similarity() {
        let set = TemplateSet::chords(ChordVocabulary::All);
        assert_eq!(set.len(), 24);
        for template in set.iter() {
            let (best, score) = set.best_match(&template.vector).unwrap();
            assert_eq!(best.label, template.label);
            assert!((score - 1.0).abs() < 1e-5, "{} scored {}", template.label, score);
        }
    }

    #[test]
    fn test_canonical_order_and_labels() {
        let labels: Vec<_> = TemplateSet::chords(ChordVocabulary::All)
            .iter()
            .map(|t| t.label.clone())
            .collect();
        assert_eq!(labels.len(), 24);
        assert_eq!(&labels[..4], &["C", "Cm", "C#", "C#m"]);
        assert_eq!(labels[18], "A");
        assert_eq!(labels[19], "Am");
        assert_eq!(labels[23], "Bm");

        let keys = TemplateSet::keys();
        assert_eq!(keys.iter().next().unwrap().label, "C major");
        assert_eq!(keys.iter().nth(21).unwrap().label, "A minor");
    }

    #[test]
    fn test_vocabulary_filters() {
        assert_eq!(TemplateSet::chords(ChordVocabulary::Major).len(), 12);
        let minor = TemplateSet::chords(ChordVocabulary::Minor);
        assert_eq!(minor.len(), 12);
        assert!(minor.iter().all(|t| t.label.ends_with('m')));
    }

    #[test]
    fn test_templates_are_unit_norm() {
        for template in TemplateSet::keys().iter() {
            let norm = dot(&template.vector, &template.vector).sqrt();
            assert!((norm - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn test_tie_resolves_to_first_template() {
        // C major and A minor share the same seven pitch classes
        let keys = TemplateSet::keys();
        let c_major = keys.get("C major").unwrap().vector;
        let (best, _) = keys.best_match(&c_major).unwrap();
        assert_eq!(best.label, "C major");
    }

    #[test]
    fn test_minor_wins_tie_against_higher_major_root() {
        // D# and G only: Cm (C-D#-G) and D# (D#-G-A#) score the same
        let mut chroma = [0.0f32; 12];
        chroma[3] = 1.0;
        chroma[7] = 1.0;
        let chroma = normalize(&chroma);

        let set = TemplateSet::chords(ChordVocabulary::All);
        let cm = dot(&set.get("Cm").unwrap().vector, &chroma);
        let d_sharp = dot(&set.get("D#").unwrap().vector, &chroma);
        assert!((cm - d_sharp).abs() < 1e-6);

        let (best, score) = set.best_match(&chroma).unwrap();
        assert_eq!(best.label, "Cm");
        assert!((score - cm).abs() < 1e-6);
    }

    #[test]
    fn test_normalize_zero_vector() {
        let zero = [0.0f32; 12];
        assert_eq!(normalize(&zero), zero);
    }
}
