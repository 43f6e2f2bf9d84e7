// Sound cache error types and constants

use crate::error::ErrorCode;
use log::error;
use std::fmt;

/// Cache error code constants
///
/// Error code range: 3001-3004
pub struct CacheErrorCodes {}

impl CacheErrorCodes {
    /// Lookback requested beyond the cache retention window
    pub const UNSUPPORTED_LOOKBACK: i32 = 3001;

    /// Fixture line could not be decoded
    pub const FIXTURE_PARSE: i32 = 3002;

    /// Fixture file could not be read or written
    pub const FIXTURE_IO: i32 = 3003;

    /// Structure bin width is zero, negative or not finite
    pub const INVALID_BIN_WIDTH: i32 = 3004;
}

/// Log a cache error with structured context
pub fn log_cache_error(err: &CacheError, context: &str) {
    error!(
        "Cache error in {}: code={}, component=SoundCache, message={}",
        context,
        err.code(),
        err.message()
    );
}

/// Errors raised by [`crate::cache::SoundCache`] queries and fixture I/O
///
/// Error code ranges: 3001-3004
#[derive(Debug, Clone, PartialEq)]
pub enum CacheError {
    /// `since(seconds)` was asked for at least the whole retention window.
    /// The cache cannot vouch for coverage it may already have pruned.
    UnsupportedLookback { seconds: f64, window_seconds: f64 },

    /// A fixture line was not a valid cache entry record (1-based line number)
    FixtureParse { line: usize, reason: String },

    /// Underlying reader/writer failed
    FixtureIo { reason: String },

    /// Segmentation was asked to bin with a non-positive width
    InvalidBinWidth { bin_seconds: f64 },
}

impl ErrorCode for CacheError {
    fn code(&self) -> i32 {
        match self {
            CacheError::UnsupportedLookback { .. } => CacheErrorCodes::UNSUPPORTED_LOOKBACK,
            CacheError::FixtureParse { .. } => CacheErrorCodes::FIXTURE_PARSE,
            CacheError::FixtureIo { .. } => CacheErrorCodes::FIXTURE_IO,
            CacheError::InvalidBinWidth { .. } => CacheErrorCodes::INVALID_BIN_WIDTH,
        }
    }

    fn message(&self) -> String {
        match self {
            CacheError::UnsupportedLookback {
                seconds,
                window_seconds,
            } => format!(
                "Lookback of {}s is not supported by a {}s cache window",
                seconds, window_seconds
            ),
            CacheError::FixtureParse { line, reason } => {
                format!("Invalid fixture record on line {}: {}", line, reason)
            }
            CacheError::FixtureIo { reason } => format!("Fixture I/O failed: {}", reason),
            CacheError::InvalidBinWidth { bin_seconds } => {
                format!("Bin width of {}s must be a positive number of seconds", bin_seconds)
            }
        }
    }
}

impl fmt::Display for CacheError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CacheError::{:?} (code {}): {}",
            self,
            self.code(),
            self.message()
        )
    }
}

impl std::error::Error for CacheError {}

impl From<std::io::Error> for CacheError {
    fn from(err: std::io::Error) -> Self {
        CacheError::FixtureIo {
            reason: err.to_string(),
        }
    }
}
