//! Event types published on the telemetry hub.

use serde::{Deserialize, Serialize};

use crate::error::{AudioError, CacheError};

/// Why a captured block never reached the detectors.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    /// Hand-off queue was full (drop_incoming policy)
    Overflow,
    /// Driver flagged an input overrun
    Overrun,
    /// Driver flagged the block as unusable
    Invalid,
}

/// Coarse error class carried by [`MetricEvent::Error`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticError {
    FixtureLoad,
    StreamFault,
    UnsupportedLookback,
    InvalidConfig,
    Unknown,
}

impl From<&CacheError> for DiagnosticError {
    fn from(err: &CacheError) -> Self {
        match err {
            CacheError::UnsupportedLookback { .. } => DiagnosticError::UnsupportedLookback,
            CacheError::FixtureParse { .. } | CacheError::FixtureIo { .. } => {
                DiagnosticError::FixtureLoad
            }
            CacheError::InvalidBinWidth { .. } => DiagnosticError::InvalidConfig,
        }
    }
}

impl From<&AudioError> for DiagnosticError {
    fn from(err: &AudioError) -> Self {
        match err {
            AudioError::StreamOpenFailed { .. }
            | AudioError::HardwareError { .. }
            | AudioError::StreamFailure { .. } => DiagnosticError::StreamFault,
            AudioError::InvalidConfig { .. } => DiagnosticError::InvalidConfig,
            AudioError::LockPoisoned { .. } => DiagnosticError::Unknown,
        }
    }
}

/// One observation from the pipeline, serialized as `{"type", "payload"}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum MetricEvent {
    ChordChanged { chord: String },
    KeyChanged { key: String, confidence: f32 },
    TempoEstimated { bpm: f32 },
    BufferOccupancy { channel: String, percent: f32 },
    BlockDropped { reason: DropReason, total: u64 },
    CacheSize { entries: usize },
    Error { code: DiagnosticError, context: String },
}
