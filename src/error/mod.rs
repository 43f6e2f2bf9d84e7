// Error types for the music analyzer
//
// This module defines custom error types for audio transport and sound cache
// operations, providing structured error handling with numeric error codes.
//
// Neutral outcomes (no estimate yet, silence, unknown key) are not errors and
// are modelled with `Option` by the detectors themselves.

mod audio;
mod cache;

pub use audio::{log_audio_error, AudioError, AudioErrorCodes};
pub use cache::{log_cache_error, CacheError, CacheErrorCodes};

/// Error codes for structured error reporting
///
/// This trait provides a standard way to get error codes and messages
/// from custom error types, enabling consistent logging and CLI exit reports.
pub trait ErrorCode {
    /// Get the numeric error code
    fn code(&self) -> i32;

    /// Get the human-readable error message
    fn message(&self) -> String;
}
