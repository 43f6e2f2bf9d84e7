// BufferPool - bounded capture hand-off with dual SPSC queues
//
// Implements an object pool pattern using two lock-free SPSC (Single Producer Single Consumer)
// ring buffers. The capture side never allocates once the pool is built, and the number of
// blocks in flight can never exceed the pool size, so the hand-off cannot grow unbounded.
//
// Architecture:
// - DATA_QUEUE: capture thread pushes filled blocks, analysis thread consumes
// - POOL_QUEUE: analysis thread returns empty buffers, capture thread recycles
//
// Buffer flow:
// 1. Capture thread pops an empty buffer from POOL_QUEUE
// 2. Capture thread fills it and tags it with a BlockStatus
// 3. Capture thread pushes the block to DATA_QUEUE
// 4. Analysis thread pops the block; faulted blocks are recycled immediately
// 5. Analysis thread processes the samples to completion
// 6. Analysis thread pushes the buffer back to POOL_QUEUE
//
// Overflow: when every buffer is in flight the producer follows its OverflowPolicy.

use rtrb::{Consumer, PopError, Producer, PushError};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Configuration constants for buffer pool
pub const DEFAULT_BUFFER_COUNT: usize = 64;
pub const DEFAULT_BLOCK_SIZE: usize = 882;

/// How long a waiting side sleeps between queue polls
const POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Audio buffer type - pre-allocated vector of f32 samples
pub type AudioBuffer = Vec<f32>;

/// Transport status reported by the capture driver for one block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockStatus {
    Ok,
    /// Driver reported an input overrun while this block was captured
    Overrun,
    /// Block contents are unusable (driver error, malformed frame)
    Invalid,
}

/// One captured block travelling through the data queue
#[derive(Debug)]
pub struct CapturedBlock {
    pub samples: AudioBuffer,
    pub status: BlockStatus,
}

/// Result of a consumer-side read
///
/// A dropped block, an empty block (`Data` with no samples) and a timeout are
/// three different outcomes.
#[derive(Debug, PartialEq)]
pub enum BlockRead {
    /// A healthy block; hand the buffer back with [`BlockConsumer::recycle`]
    Data(AudioBuffer),
    /// The block was flagged by the driver and has already been recycled
    Dropped(BlockStatus),
    /// No block arrived within the timeout
    Timeout,
    /// The producer is gone and the queue is drained
    Disconnected,
}

/// Producer behaviour when no empty buffer is available
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Wait for the consumer to free a buffer (offline and fixture feeding)
    BlockProducer,
    /// Discard the incoming block and count it (real-time callbacks)
    DropIncoming,
}

/// Outcome of a producer-side send
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Queued,
    /// Discarded under [`OverflowPolicy::DropIncoming`]
    Dropped,
    /// The consumer has been dropped
    Disconnected,
}

/// Capture-side half of the pool
pub struct BlockProducer {
    data_producer: Producer<CapturedBlock>,
    pool_consumer: Consumer<AudioBuffer>,
    policy: OverflowPolicy,
    overflow_drops: Arc<AtomicU64>,
}

/// Analysis-side half of the pool
pub struct BlockConsumer {
    data_consumer: Consumer<CapturedBlock>,
    pool_producer: Producer<AudioBuffer>,
    overflow_drops: Arc<AtomicU64>,
    faulted_blocks: u64,
}

/// Split buffer pool channels for producer/consumer separation
pub struct BufferPoolChannels {
    pub producer: BlockProducer,
    pub consumer: BlockConsumer,
}

impl BufferPoolChannels {
    /// Split into the halves owned by the capture and analysis threads
    pub fn split(self) -> (BlockProducer, BlockConsumer) {
        (self.producer, self.consumer)
    }
}

/// Lock-free buffer pool using dual SPSC ring buffers
///
/// # Example
/// ```ignore
/// let (mut producer, mut consumer) = BufferPool::new(16, 882, OverflowPolicy::DropIncoming).split();
///
/// // In capture thread:
/// producer.send(&samples, BlockStatus::Ok);
///
/// // In analysis thread:
/// if let BlockRead::Data(buffer) = consumer.recv_timeout(Duration::from_millis(100)) {
///     // Process buffer
///     consumer.recycle(buffer);
/// }
/// ```
pub struct BufferPool;

impl BufferPool {
    /// Create a new BufferPool with specified buffer count and block size
    ///
    /// # Panics
    /// Panics if buffer_count is 0 or block_size is 0
    #[allow(clippy::new_ret_no_self)]
    pub fn new(buffer_count: usize, block_size: usize, policy: OverflowPolicy) -> BufferPoolChannels {
        assert!(buffer_count > 0, "buffer_count must be greater than 0");
        assert!(block_size > 0, "block_size must be greater than 0");

        let (mut pool_producer, pool_consumer) = rtrb::RingBuffer::new(buffer_count);
        let (data_producer, data_consumer) = rtrb::RingBuffer::new(buffer_count);

        // Pre-allocate all buffers and fill the pool queue
        for _ in 0..buffer_count {
            let buffer = Vec::with_capacity(block_size);
            pool_producer
                .push(buffer)
                .expect("Failed to push buffer to pool queue during initialization");
        }

        let overflow_drops = Arc::new(AtomicU64::new(0));

        BufferPoolChannels {
            producer: BlockProducer {
                data_producer,
                pool_consumer,
                policy,
                overflow_drops: Arc::clone(&overflow_drops),
            },
            consumer: BlockConsumer {
                data_consumer,
                pool_producer,
                overflow_drops,
                faulted_blocks: 0,
            },
        }
    }
}

impl BlockProducer {
    /// Copy `samples` into a pooled buffer and queue it with `status`
    pub fn send(&mut self, samples: &[f32], status: BlockStatus) -> SendOutcome {
        let mut buffer = match self.acquire() {
            Ok(buffer) => buffer,
            Err(outcome) => return outcome,
        };

        buffer.clear();
        buffer.extend_from_slice(samples);

        match self.data_producer.push(CapturedBlock {
            samples: buffer,
            status,
        }) {
            Ok(()) => SendOutcome::Queued,
            Err(PushError::Full(_)) => {
                self.overflow_drops.fetch_add(1, Ordering::Relaxed);
                SendOutcome::Dropped
            }
        }
    }

    /// Queue a healthy block
    pub fn send_block(&mut self, samples: &[f32]) -> SendOutcome {
        self.send(samples, BlockStatus::Ok)
    }

    pub fn policy(&self) -> OverflowPolicy {
        self.policy
    }

    /// Blocks discarded because the pool was exhausted
    pub fn overflow_drops(&self) -> u64 {
        self.overflow_drops.load(Ordering::Relaxed)
    }

    /// Percentage of data queue slots currently holding blocks
    pub fn occupancy_percent(&self) -> f32 {
        let capacity = self.data_producer.buffer().capacity();
        let used = capacity - self.data_producer.slots();
        used as f32 / capacity as f32 * 100.0
    }

    pub fn is_disconnected(&self) -> bool {
        self.data_producer.is_abandoned()
    }

    fn acquire(&mut self) -> Result<AudioBuffer, SendOutcome> {
        loop {
            match self.pool_consumer.pop() {
                Ok(buffer) => return Ok(buffer),
                Err(PopError::Empty) => {
                    if self.data_producer.is_abandoned() {
                        return Err(SendOutcome::Disconnected);
                    }
                    match self.policy {
                        OverflowPolicy::DropIncoming => {
                            self.overflow_drops.fetch_add(1, Ordering::Relaxed);
                            return Err(SendOutcome::Dropped);
                        }
                        OverflowPolicy::BlockProducer => thread::sleep(POLL_INTERVAL),
                    }
                }
            }
        }
    }
}

impl BlockConsumer {
    /// Wait up to `timeout` for the next block
    pub fn recv_timeout(&mut self, timeout: Duration) -> BlockRead {
        let deadline = Instant::now() + timeout;
        loop {
            match self.data_consumer.pop() {
                Ok(block) => {
                    return match block.status {
                        BlockStatus::Ok => BlockRead::Data(block.samples),
                        status => {
                            self.faulted_blocks += 1;
                            self.recycle(block.samples);
                            BlockRead::Dropped(status)
                        }
                    };
                }
                Err(PopError::Empty) => {
                    if self.data_consumer.is_abandoned() {
                        return BlockRead::Disconnected;
                    }
                    let now = Instant::now();
                    if now >= deadline {
                        return BlockRead::Timeout;
                    }
                    thread::sleep(POLL_INTERVAL.min(deadline - now));
                }
            }
        }
    }

    /// Return a processed buffer to the pool
    pub fn recycle(&mut self, buffer: AudioBuffer) {
        if self.pool_producer.push(buffer).is_err() {
            tracing::warn!("[BufferPool] Pool queue full, dropping buffer");
        }
    }

    /// Blocks the producer discarded because the pool was exhausted
    pub fn overflow_drops(&self) -> u64 {
        self.overflow_drops.load(Ordering::Relaxed)
    }

    /// Blocks received with an Overrun/Invalid status
    pub fn faulted_blocks(&self) -> u64 {
        self.faulted_blocks
    }

    /// Blocks waiting in the data queue
    pub fn pending(&self) -> usize {
        self.data_consumer.slots()
    }
}
