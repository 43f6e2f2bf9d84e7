// Music Analyzer Core - real-time chord, key, tempo and song structure analysis
// Capture blocks flow through a lock-free hand-off queue into the analysis
// pipeline, which feeds a time-windowed sound cache for structure segmentation.

// Module declarations
pub mod analysis;
pub mod audio;
pub mod cache;
pub mod clock;
pub mod config;
pub mod error;
pub mod fixtures;
pub mod structure;
pub mod telemetry;

// Re-exports for convenience
pub use analysis::{BlockOutcome, ListenSummary, MusicAnalyzer, PipelineEvent};
pub use cache::{CacheEntry, SoundCache};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::AppConfig;
pub use error::{AudioError, CacheError, ErrorCode};
pub use structure::{Segment, SectionLabel, SongStructureAnalyzer};
