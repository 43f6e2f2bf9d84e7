// CaptureEngine - cpal microphone input feeding the hand-off queue
//
// The input callback takes the first channel of each frame, stages samples
// into fixed-size blocks and sends every full block through a BlockProducer.
// The callback never blocks: the producer must use OverflowPolicy::DropIncoming.
// Stream errors raise a fault flag so the next delivered block is tagged as
// an overrun instead of being analysed.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::buffer_pool::{BlockProducer, BlockStatus, OverflowPolicy, SendOutcome};
use crate::error::AudioError;

pub struct CaptureEngine {
    /// Input audio stream
    stream: Option<cpal::Stream>,
    device: cpal::Device,
    config: cpal::SupportedStreamConfig,
    /// Set by the error callback, cleared when the next block is sent
    fault: Arc<AtomicBool>,
}

impl CaptureEngine {
    /// Open the default input device
    pub fn open_default() -> Result<Self, AudioError> {
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or_else(|| AudioError::StreamOpenFailed {
                reason: "No default input device found".to_string(),
            })?;

        let config = device
            .default_input_config()
            .map_err(|e| AudioError::StreamOpenFailed {
                reason: format!("Failed to get default input config: {:?}", e),
            })?;

        if config.sample_format() != cpal::SampleFormat::F32 {
            return Err(AudioError::StreamOpenFailed {
                reason: "Only F32 sample format is currently supported for input".to_string(),
            });
        }

        tracing::info!(
            "[CaptureEngine] Input device {:?} at {} Hz, {} channel(s)",
            device.name().unwrap_or_default(),
            config.sample_rate().0,
            config.channels()
        );

        Ok(Self {
            stream: None,
            device,
            config,
            fault: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Sample rate the device delivers
    pub fn sample_rate(&self) -> u32 {
        self.config.sample_rate().0
    }

    pub fn is_running(&self) -> bool {
        self.stream.is_some()
    }

    /// Build and start the input stream
    pub fn start(&mut self, mut producer: BlockProducer, block_size: usize) -> Result<(), AudioError> {
        if self.stream.is_some() {
            return Err(AudioError::StreamFailure {
                reason: "Capture already running".to_string(),
            });
        }
        if producer.policy() != OverflowPolicy::DropIncoming {
            return Err(AudioError::InvalidConfig {
                reason: "Real-time capture requires the drop_incoming overflow policy".to_string(),
            });
        }

        let stream_config: cpal::StreamConfig = self.config.clone().into();
        let channels_count = (stream_config.channels as usize).max(1);
        let block_size = block_size.max(1);

        let data_fault = Arc::clone(&self.fault);
        let err_fault = Arc::clone(&self.fault);
        let mut staging: Vec<f32> = Vec::with_capacity(block_size);

        let err_fn = move |err: cpal::StreamError| {
            err_fault.store(true, Ordering::Relaxed);
            tracing::warn!("[CaptureEngine] Input stream error: {}", err);
        };

        let stream = self
            .device
            .build_input_stream(
                &stream_config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    // De-interleave: take first channel
                    for frame in data.chunks(channels_count) {
                        staging.push(frame.first().copied().unwrap_or(0.0));
                        if staging.len() == block_size {
                            let status = if data_fault.swap(false, Ordering::Relaxed) {
                                BlockStatus::Overrun
                            } else {
                                BlockStatus::Ok
                            };
                            if producer.send(&staging, status) == SendOutcome::Dropped {
                                log::trace!("[CaptureEngine] Hand-off full, block dropped");
                            }
                            staging.clear();
                        }
                    }
                },
                err_fn,
                None,
            )
            .map_err(|e| AudioError::StreamOpenFailed {
                reason: format!("{:?}", e),
            })?;

        stream.play().map_err(|e| AudioError::HardwareError {
            details: format!("Input start failed: {}", e),
        })?;

        self.stream = Some(stream);
        tracing::info!("[CaptureEngine] Capture started ({} samples per block)", block_size);
        Ok(())
    }

    /// Stop capturing; dropping the stream drops the producer, which the
    /// analysis side observes as a disconnect
    pub fn stop(&mut self) {
        if let Some(stream) = self.stream.take() {
            drop(stream);
            tracing::info!("[CaptureEngine] Capture stopped");
        }
    }
}

impl Drop for CaptureEngine {
    fn drop(&mut self) {
        self.stop();
    }
}
