// Audio module - capture hand-off and rolling sample windows

pub mod buffer_pool;
#[cfg(feature = "capture")]
pub mod capture;
pub mod rolling_buffer;

// Re-export commonly used types for convenience
pub use buffer_pool::{
    AudioBuffer, BlockConsumer, BlockProducer, BlockRead, BlockStatus, BufferPool,
    BufferPoolChannels, CapturedBlock, OverflowPolicy, SendOutcome, DEFAULT_BLOCK_SIZE,
    DEFAULT_BUFFER_COUNT,
};
#[cfg(feature = "capture")]
pub use capture::CaptureEngine;
pub use rolling_buffer::RollingAudioBuffer;
