//! Deterministic audio sources for replay, the CLI harness and tests.
//!
//! Sources render PCM up front (synthetic chord progressions, click tracks,
//! silence) or decode it from a WAV file, then hand it out block by block.
//! [`replay_source`] pushes a source through the same hand-off queue and
//! analysis loop the live capture path uses.

use std::f32::consts::PI;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::analysis::{ListenSummary, MusicAnalyzer, PITCH_CLASSES, SILENCE};
use crate::audio::{BlockProducer, BufferPool, OverflowPolicy, SendOutcome};
use crate::cache::NO_CHORD;
use crate::error::AudioError;

/// Default location for fixture assets.
pub const DEFAULT_FIXTURE_ROOT: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/fixtures");

/// Length of one synthetic click in samples
const CLICK_LENGTH: usize = 64;

/// Result of filling a buffer from an [`AudioSource`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceRead {
    /// Buffer contains `frames_written` samples; `finished` indicates end-of-stream.
    Data {
        frames_written: usize,
        finished: bool,
    },
    /// No more samples available (source exhausted).
    Finished,
}

/// Block-wise PCM provider
pub trait AudioSource: Send {
    fn sample_rate(&self) -> u32;
    fn read_into(&mut self, buffer: &mut [f32]) -> SourceRead;
    fn rewind(&mut self);
}

/// Declarative synthetic chord progression.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProgressionSpec {
    /// Chord labels ("C", "F#m", ...); "none" or "silence" render silence
    pub chords: Vec<String>,
    pub seconds_per_chord: f32,
    pub amplitude: f32,
    /// Peak of the uniform noise floor mixed in
    pub noise_level: f32,
    /// Overlay a click on every beat at this tempo
    pub click_bpm: Option<f32>,
    pub seed: u64,
}

impl Default for ProgressionSpec {
    fn default() -> Self {
        Self {
            chords: ["C", "G", "Am", "F"].iter().map(|c| c.to_string()).collect(),
            seconds_per_chord: 2.0,
            amplitude: 0.3,
            noise_level: 0.0,
            click_bpm: None,
            seed: 0x5A5A_FFF0,
        }
    }
}

/// Octave-4 frequencies of the triad named by `label`
///
/// `None` for labels that are not a major ("C#") or minor ("C#m") triad.
pub fn triad_frequencies(label: &str) -> Option<[f32; 3]> {
    let (root, minor) = match label.strip_suffix('m') {
        Some(root) => (root, true),
        None => (label, false),
    };
    let pitch_class = PITCH_CLASSES.iter().position(|name| *name == root)?;
    let third = if minor { 3 } else { 4 };
    let midi = 60 + pitch_class as i32;
    Some([midi, midi + third, midi + 7].map(midi_to_hz))
}

fn midi_to_hz(midi: i32) -> f32 {
    440.0 * 2f32.powf((midi - 69) as f32 / 12.0)
}

/// Pre-rendered PCM played back once.
pub struct SyntheticSource {
    samples: Vec<f32>,
    sample_rate: u32,
    cursor: usize,
}

impl SyntheticSource {
    pub fn from_samples(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
            cursor: 0,
        }
    }

    /// Render a chord progression
    ///
    /// # Errors
    /// `InvalidConfig` for an unknown chord label or a non-positive duration.
    pub fn progression(spec: &ProgressionSpec, sample_rate: u32) -> Result<Self, AudioError> {
        if spec.seconds_per_chord <= 0.0 || sample_rate == 0 {
            return Err(AudioError::InvalidConfig {
                reason: "progression needs seconds_per_chord > 0 and a sample rate".to_string(),
            });
        }

        let per_chord = (spec.seconds_per_chord * sample_rate as f32).round() as usize;
        let mut samples = Vec::with_capacity(per_chord * spec.chords.len());

        for label in &spec.chords {
            if label == NO_CHORD || label == SILENCE {
                samples.extend(std::iter::repeat(0.0).take(per_chord));
                continue;
            }
            let freqs = triad_frequencies(label).ok_or_else(|| AudioError::InvalidConfig {
                reason: format!("unknown chord label '{}'", label),
            })?;
            // Phase runs on across chords so there are no clicks at the joins
            let offset = samples.len();
            samples.extend((0..per_chord).map(|i| {
                let t = (offset + i) as f32 / sample_rate as f32;
                freqs.iter().map(|f| (2.0 * PI * f * t).sin()).sum::<f32>() * spec.amplitude / 3.0
            }));
        }

        if spec.noise_level > 0.0 {
            let mut rng = StdRng::seed_from_u64(spec.seed);
            for sample in samples.iter_mut() {
                *sample += rng.gen_range(-spec.noise_level..spec.noise_level);
            }
        }

        if let Some(bpm) = spec.click_bpm {
            overlay_clicks(&mut samples, bpm, sample_rate, spec.amplitude);
        }

        Ok(Self::from_samples(samples, sample_rate))
    }

    /// Clicks on every beat and nothing in between
    pub fn click_track(bpm: f32, seconds: f32, sample_rate: u32) -> Self {
        let mut samples = vec![0.0; (seconds.max(0.0) * sample_rate as f32) as usize];
        overlay_clicks(&mut samples, bpm, sample_rate, 0.8);
        Self::from_samples(samples, sample_rate)
    }

    pub fn silence(seconds: f32, sample_rate: u32) -> Self {
        Self::from_samples(
            vec![0.0; (seconds.max(0.0) * sample_rate as f32) as usize],
            sample_rate,
        )
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }
}

impl AudioSource for SyntheticSource {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn read_into(&mut self, buffer: &mut [f32]) -> SourceRead {
        copy_block(&self.samples, &mut self.cursor, buffer)
    }

    fn rewind(&mut self) {
        self.cursor = 0;
    }
}

/// Short broadband burst at every beat position. The burst alternates sign
/// so its energy sits near Nyquist, far above the chroma band.
fn overlay_clicks(samples: &mut [f32], bpm: f32, sample_rate: u32, amplitude: f32) {
    if bpm <= 0.0 {
        return;
    }
    let period = ((60.0 * sample_rate as f32 / bpm).round() as usize).max(CLICK_LENGTH + 1);
    for start in (0..samples.len()).step_by(period) {
        let end = (start + CLICK_LENGTH).min(samples.len());
        for (i, sample) in samples[start..end].iter_mut().enumerate() {
            let sign = if i % 2 == 0 { 1.0 } else { -1.0 };
            *sample += sign * amplitude * (-(i as f32) / 16.0).exp();
        }
    }
}

/// PCM decoded from a WAV file; multichannel files are averaged to mono.
pub struct WavSource {
    samples: Vec<f32>,
    sample_rate: u32,
    cursor: usize,
}

impl WavSource {
    pub fn open(path: &Path) -> Result<Self, AudioError> {
        let (samples, sample_rate) = read_wav(path)?;
        tracing::info!(
            "[WavSource] Loaded {} ({} samples @ {} Hz)",
            path.display(),
            samples.len(),
            sample_rate
        );
        Ok(Self {
            samples,
            sample_rate,
            cursor: 0,
        })
    }

    pub fn duration_seconds(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate.max(1) as f64
    }
}

impl AudioSource for WavSource {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn read_into(&mut self, buffer: &mut [f32]) -> SourceRead {
        copy_block(&self.samples, &mut self.cursor, buffer)
    }

    fn rewind(&mut self) {
        self.cursor = 0;
    }
}

fn copy_block(samples: &[f32], cursor: &mut usize, buffer: &mut [f32]) -> SourceRead {
    if *cursor >= samples.len() {
        buffer.fill(0.0);
        return SourceRead::Finished;
    }

    let frames_written = buffer.len().min(samples.len() - *cursor);
    buffer[..frames_written].copy_from_slice(&samples[*cursor..*cursor + frames_written]);
    buffer[frames_written..].fill(0.0);
    *cursor += frames_written;

    SourceRead::Data {
        frames_written,
        finished: *cursor >= samples.len(),
    }
}

/// Write PCM samples as a mono 32-bit float WAV
pub fn write_wav(path: &Path, samples: &[f32], sample_rate: u32) -> Result<(), AudioError> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };
    let to_error = |err: hound::Error| AudioError::StreamFailure {
        reason: format!("failed to write {}: {err}", path.display()),
    };
    let mut writer = hound::WavWriter::create(path, spec).map_err(to_error)?;
    for sample in samples {
        writer.write_sample(*sample).map_err(to_error)?;
    }
    writer.finalize().map_err(to_error)
}

fn read_wav(path: &Path) -> Result<(Vec<f32>, u32), AudioError> {
    let mut reader = hound::WavReader::open(path).map_err(|err| AudioError::StreamFailure {
        reason: format!("failed to open {}: {err}", path.display()),
    })?;
    let spec = reader.spec();
    if spec.channels == 0 {
        return Err(AudioError::StreamFailure {
            reason: format!("{} has zero channels", path.display()),
        });
    }
    let to_error = |err: hound::Error| AudioError::StreamFailure {
        reason: format!("failed to decode {}: {err}", path.display()),
    };

    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<Result<_, _>>()
            .map_err(to_error)?,
        hound::SampleFormat::Int => {
            let max = ((1i64 << (spec.bits_per_sample - 1)) - 1) as f32;
            match spec.bits_per_sample {
                16 => reader
                    .samples::<i16>()
                    .map(|sample| sample.map(|value| value as f32 / max))
                    .collect::<Result<_, _>>()
                    .map_err(to_error)?,
                24 | 32 => reader
                    .samples::<i32>()
                    .map(|sample| sample.map(|value| value as f32 / max))
                    .collect::<Result<_, _>>()
                    .map_err(to_error)?,
                other => {
                    return Err(AudioError::StreamFailure {
                        reason: format!(
                            "unsupported bits per sample {} in {}",
                            other,
                            path.display()
                        ),
                    })
                }
            }
        }
    };

    let channels = spec.channels as usize;
    let samples = if channels == 1 {
        interleaved
    } else {
        interleaved
            .chunks(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32)
            .collect()
    };

    Ok((samples, spec.sample_rate))
}

/// Push a source through `producer` block by block
///
/// Returns the number of blocks queued. Stops early when `running` clears or
/// the consumer goes away.
pub fn feed_source(
    source: &mut dyn AudioSource,
    producer: &mut BlockProducer,
    block_size: usize,
    running: &AtomicBool,
) -> u64 {
    let mut block = vec![0.0; block_size.max(1)];
    let mut sent = 0u64;

    while running.load(Ordering::SeqCst) {
        let (frames, finished) = match source.read_into(&mut block) {
            SourceRead::Data {
                frames_written,
                finished,
            } => (frames_written, finished),
            SourceRead::Finished => break,
        };

        match producer.send_block(&block[..frames]) {
            SendOutcome::Queued => sent += 1,
            SendOutcome::Dropped => {}
            SendOutcome::Disconnected => {
                tracing::warn!("[Feeder] Consumer disconnected after {} blocks", sent);
                break;
            }
        }

        if finished {
            break;
        }
    }

    sent
}

/// Run [`feed_source`] on its own thread; the producer is dropped when the
/// source is exhausted, which ends the analysis loop.
pub fn spawn_feeder(
    mut source: Box<dyn AudioSource>,
    mut producer: BlockProducer,
    block_size: usize,
    running: Arc<AtomicBool>,
) -> JoinHandle<u64> {
    thread::spawn(move || feed_source(source.as_mut(), &mut producer, block_size, &running))
}

/// Replay a source through the hand-off queue into `analyzer`
///
/// The feeder waits for free slots, so nothing is dropped and the result is
/// independent of thread scheduling.
pub fn replay_source(
    analyzer: &mut MusicAnalyzer,
    source: Box<dyn AudioSource>,
) -> Result<ListenSummary, AudioError> {
    let audio = &analyzer.config().audio;
    if source.sample_rate() != audio.sample_rate {
        return Err(AudioError::InvalidConfig {
            reason: format!(
                "source is {} Hz but the analyzer expects {} Hz",
                source.sample_rate(),
                audio.sample_rate
            ),
        });
    }

    let block_size = audio.block_size();
    let (producer, mut consumer) =
        BufferPool::new(audio.queue_capacity, block_size, OverflowPolicy::BlockProducer).split();
    let running = Arc::new(AtomicBool::new(true));
    let feeder = spawn_feeder(source, producer, block_size, Arc::clone(&running));

    let summary = analyzer.run_until_disconnected(&mut consumer, &running);
    let sent = feeder.join().map_err(|_| AudioError::StreamFailure {
        reason: "feeder thread panicked".to_string(),
    })?;
    tracing::debug!("[Replay] Feeder queued {} blocks", sent);

    Ok(summary)
}
