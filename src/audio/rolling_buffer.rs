// RollingAudioBuffer - fixed-length window over the most recent samples
//
// The buffer always holds exactly `capacity` samples (zero-filled at start).
// New samples enter at the tail and the oldest samples fall off the head, so
// detectors can analyse "the last N seconds" without tracking positions.

/// Fixed-capacity FIFO window of mono samples
#[derive(Debug, Clone)]
pub struct RollingAudioBuffer {
    samples: Vec<f32>,
}

impl RollingAudioBuffer {
    /// Create a zero-filled buffer holding `capacity` samples (at least one)
    pub fn new(capacity: usize) -> Self {
        Self {
            samples: vec![0.0; capacity.max(1)],
        }
    }

    /// Create a buffer covering `seconds` of audio at `sample_rate`
    pub fn for_duration(seconds: f32, sample_rate: u32) -> Self {
        Self::new((seconds * sample_rate as f32).round() as usize)
    }

    /// Append a block of samples
    ///
    /// If the block is at least as long as the buffer, the buffer becomes the
    /// tail of the block. Otherwise existing content shifts left by the block
    /// length and the block is written at the tail. Empty blocks are ignored.
    pub fn push(&mut self, incoming: &[f32]) {
        let n = incoming.len();
        if n == 0 {
            return;
        }

        let capacity = self.samples.len();
        if n >= capacity {
            self.samples.copy_from_slice(&incoming[n - capacity..]);
        } else {
            self.samples.copy_within(n.., 0);
            self.samples[capacity - n..].copy_from_slice(incoming);
        }
    }

    /// Peak absolute amplitude over the whole window
    pub fn peak(&self) -> f32 {
        self.samples.iter().map(|s| s.abs()).fold(0.0f32, f32::max)
    }

    /// Most recent `count` samples (or the whole buffer if shorter)
    pub fn tail(&self, count: usize) -> &[f32] {
        let start = self.samples.len().saturating_sub(count);
        &self.samples[start..]
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Always false: the window has a fixed, non-zero length
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Reset every sample to zero
    pub fn clear(&mut self) {
        self.samples.fill(0.0);
    }
}
