// Analysis module - real-time chord, key and tempo detection
//
// This module turns the stream of captured blocks into musical observations
// and feeds the sound cache.
//
// Architecture:
// - AnalysisThread: loop that consumes blocks from the hand-off queue
// - Pipeline: ChordRecognizer -> KeyEstimator, TempoEstimator -> SoundCache
// - Output: PipelineEvent broadcast + telemetry hub

pub mod chord;
pub mod debounce;
pub mod features;
pub mod key;
pub mod pipeline;
pub mod templates;
pub mod tempo;

pub use chord::{ChordRecognizer, SILENCE};
pub use features::{FeatureExtractor, SpectralFeatureExtractor};
pub use key::{KeyEstimate, KeyEstimator, UNKNOWN_KEY};
pub use pipeline::{
    spawn_analysis_thread, BlockOutcome, ListenSummary, MusicAnalyzer, PipelineEvent,
};
pub use templates::{ChordVocabulary, PitchVector, TemplateSet, PITCH_CLASSES};
pub use tempo::{estimate_bpm, TempoEstimator};
