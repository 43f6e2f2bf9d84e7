// MusicAnalyzer - per-block pipeline and the analysis worker loop
//
// Per block:
// 1. Chord window push + (divided) recognition -> debounced chord report
// 2. Reported chord -> key energy; key changes are rate-limited
// 3. Tempo window push + rate-limited BPM update
// 4. Cache entry for the current chord (new report or last reported),
//    unless it is silence
//
// The worker loop pulls blocks from the hand-off queue until the listen
// deadline passes, the running flag clears or the producer disconnects.
// Each dequeued block is processed to completion before the flag is checked.

use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tokio::sync::broadcast;

use super::chord::{ChordRecognizer, SILENCE};
use super::debounce::ChangeRateLimiter;
use super::features::{FeatureExtractor, SpectralFeatureExtractor};
use super::key::{KeyEstimate, KeyEstimator, UNKNOWN_KEY};
use super::tempo::TempoEstimator;
use crate::audio::{BlockConsumer, BlockRead, BlockStatus};
use crate::cache::{CacheEntry, SoundCache};
use crate::clock::{Clock, ManualClock};
use crate::config::AppConfig;
use crate::error::{AudioError, CacheError};
use crate::structure::{Segment, SongStructureAnalyzer};
use crate::telemetry::{self, DiagnosticError, DropReason};

/// Capacity of the pipeline event broadcast channel
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Detections broadcast to subscribers as they happen
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PipelineEvent {
    ChordChanged { chord: String },
    KeyChanged { key: String, confidence: f32 },
    TempoEstimated { bpm: f32 },
}

/// What a single block produced
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BlockOutcome {
    /// Newly stable chord, if any
    pub chord: Option<String>,
    /// Announced key change, if any
    pub key: Option<KeyEstimate>,
    /// Fresh tempo estimate, if the rate limit allowed an update
    pub bpm: Option<f32>,
    /// Entry appended to the cache
    pub cached: Option<CacheEntry>,
}

/// Counters for one listen/run session
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ListenSummary {
    pub blocks_processed: u64,
    pub faulted_blocks: u64,
    pub overflow_drops: u64,
    pub timeouts: u64,
    pub chords_reported: u64,
    pub cache_entries: usize,
}

pub struct MusicAnalyzer {
    config: AppConfig,
    sample_rate: u32,
    expected_block_size: usize,
    extractor: Arc<dyn FeatureExtractor>,
    chord: ChordRecognizer,
    key: KeyEstimator,
    key_limiter: ChangeRateLimiter,
    tempo: TempoEstimator,
    cache: Arc<SoundCache>,
    clock: Arc<dyn Clock>,
    /// Advanced by each block's duration when replaying recorded audio
    stream_clock: Option<Arc<ManualClock>>,
    events: broadcast::Sender<PipelineEvent>,
}

impl MusicAnalyzer {
    /// Live analyzer with the default feature extractor
    pub fn new(
        config: AppConfig,
        cache: Arc<SoundCache>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, AudioError> {
        let extractor = Arc::new(SpectralFeatureExtractor::new(&config.features));
        Self::with_extractor(config, cache, clock, extractor)
    }

    pub fn with_extractor(
        config: AppConfig,
        cache: Arc<SoundCache>,
        clock: Arc<dyn Clock>,
        extractor: Arc<dyn FeatureExtractor>,
    ) -> Result<Self, AudioError> {
        config.validate()?;

        let sample_rate = config.audio.sample_rate;
        let chord = ChordRecognizer::new(
            &config.chord,
            sample_rate,
            config.audio.effective_block_seconds(),
            Arc::clone(&extractor),
        );
        let tempo = TempoEstimator::new(
            &config.tempo,
            sample_rate,
            Arc::clone(&extractor),
            Arc::clone(&clock),
        );
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        tracing::info!(
            "[MusicAnalyzer] {} Hz, {} samples per block, cache window {}s",
            sample_rate,
            config.audio.block_size(),
            cache.window_seconds()
        );

        Ok(Self {
            sample_rate,
            expected_block_size: config.audio.block_size(),
            key: KeyEstimator::new(config.key.decay),
            key_limiter: ChangeRateLimiter::new(config.key.report_interval_seconds),
            chord,
            tempo,
            extractor,
            cache,
            clock,
            stream_clock: None,
            events,
            config,
        })
    }

    /// Analyzer whose clock follows the audio instead of the wall clock
    ///
    /// Cache timestamps start at `start_seconds` and advance by the duration
    /// of each processed block, so recorded audio replays deterministically
    /// at any speed.
    pub fn for_replay(config: AppConfig, start_seconds: f64) -> Result<Self, AudioError> {
        let clock = Arc::new(ManualClock::new(start_seconds));
        let cache = Arc::new(SoundCache::with_clock(
            config.cache.window_seconds,
            clock.clone(),
        ));
        let mut analyzer = Self::new(config, cache, clock.clone())?;
        analyzer.stream_clock = Some(clock);
        Ok(analyzer)
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn cache(&self) -> &Arc<SoundCache> {
        &self.cache
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.events.subscribe()
    }

    pub fn current_key(&self) -> KeyEstimate {
        self.key.estimate()
    }

    pub fn last_chord(&self) -> Option<&str> {
        self.chord.last_reported()
    }

    pub fn last_bpm(&self) -> Option<f32> {
        self.tempo.last_estimate()
    }

    /// Run one block through every detector and the cache
    pub fn process_block(&mut self, block: &[f32]) -> BlockOutcome {
        if let Some(clock) = &self.stream_clock {
            clock.advance(block.len() as f64 / self.sample_rate as f64);
        }
        self.track_block_size(block.len());

        let mut outcome = BlockOutcome::default();

        if let Some(chord) = self.chord.process_block(block) {
            outcome.key = self.update_key(&chord);
            if chord != SILENCE {
                telemetry::hub().record_chord(&chord);
            }
            self.publish(PipelineEvent::ChordChanged {
                chord: chord.clone(),
            });
            outcome.chord = Some(chord);
        }

        self.tempo.push(block);
        outcome.bpm = self.tempo.update();
        if let Some(bpm) = outcome.bpm {
            telemetry::hub().record_tempo(bpm);
            self.publish(PipelineEvent::TempoEstimated { bpm });
        }

        let current = outcome
            .chord
            .clone()
            .or_else(|| self.chord.last_reported().map(str::to_string));
        if let Some(chord) = current.filter(|c| c != SILENCE) {
            let frequency = self
                .extractor
                .dominant_frequency(self.chord.window(), self.sample_rate)
                .unwrap_or(0.0);
            let bpm = outcome.bpm.unwrap_or(0.0);
            outcome.cached = Some(self.cache.add(&chord, frequency as f64, bpm as f64));
        }

        outcome
    }

    /// Pull blocks for `duration` (or until stopped/disconnected)
    pub fn listen(
        &mut self,
        consumer: &mut BlockConsumer,
        duration: Duration,
        running: &AtomicBool,
    ) -> ListenSummary {
        self.drain(consumer, Some(Instant::now() + duration), running)
    }

    /// Pull blocks until the producer disconnects or `running` clears
    pub fn run_until_disconnected(
        &mut self,
        consumer: &mut BlockConsumer,
        running: &AtomicBool,
    ) -> ListenSummary {
        self.drain(consumer, None, running)
    }

    /// Segment the configured lookback of the cache
    pub fn analyze_song_structure(&self) -> Result<Vec<Segment>, CacheError> {
        self.analyze_song_structure_with(
            self.config.structure.lookback_seconds,
            self.config.structure.bin_seconds,
        )
    }

    pub fn analyze_song_structure_with(
        &self,
        lookback_seconds: f64,
        bin_seconds: f64,
    ) -> Result<Vec<Segment>, CacheError> {
        let mut config = self.config.structure.clone();
        config.lookback_seconds = lookback_seconds;
        config.bin_seconds = bin_seconds;
        SongStructureAnalyzer::new(config).analyze(&self.cache)
    }

    /// Listen for `listen_seconds`, then segment what was heard
    pub fn analyze_song_structure_live(
        &mut self,
        consumer: &mut BlockConsumer,
        listen_seconds: f64,
        running: &AtomicBool,
    ) -> Result<(ListenSummary, Vec<Segment>), CacheError> {
        tracing::info!(
            "[MusicAnalyzer] Listening for {}s (analyzing song structure)",
            listen_seconds
        );
        let duration = Duration::from_secs_f64(listen_seconds.max(0.0));
        let summary = self.listen(consumer, duration, running);
        tracing::info!("[MusicAnalyzer] Analyzing song structure...");
        let segments = self.analyze_song_structure()?;
        Ok((summary, segments))
    }

    /// Forget detector state; the cache is left untouched
    pub fn reset(&mut self) {
        self.chord.reset();
        self.key.reset();
        self.key_limiter.clear();
        self.tempo.reset();
    }

    fn drain(
        &mut self,
        consumer: &mut BlockConsumer,
        deadline: Option<Instant>,
        running: &AtomicBool,
    ) -> ListenSummary {
        let poll_timeout = Duration::from_millis(self.config.audio.poll_timeout_ms.max(1));
        let mut summary = ListenSummary::default();
        let mut reported_overflow = consumer.overflow_drops();

        loop {
            if !running.load(Ordering::SeqCst) {
                tracing::debug!("[AnalysisThread] Stop requested");
                break;
            }
            if deadline.is_some_and(|d| Instant::now() >= d) {
                break;
            }

            match consumer.recv_timeout(poll_timeout) {
                BlockRead::Data(buffer) => {
                    let outcome = self.process_block(&buffer);
                    consumer.recycle(buffer);
                    summary.blocks_processed += 1;
                    if outcome.chord.is_some() {
                        summary.chords_reported += 1;
                    }
                    if let Some(key) = &outcome.key {
                        tracing::info!("[AnalysisThread] Key: {} ({:.2})", key.key, key.confidence);
                    }
                    let percent = queue_percent(consumer, self.config.audio.queue_capacity);
                    telemetry::hub().record_buffer_occupancy("analysis_queue", percent);
                }
                BlockRead::Dropped(status) => {
                    summary.faulted_blocks += 1;
                    tracing::warn!("[AnalysisThread] Dropped {:?} block", status);
                    telemetry::hub().record_block_dropped(match status {
                        BlockStatus::Invalid => DropReason::Invalid,
                        _ => DropReason::Overrun,
                    });
                    telemetry::hub().record_error(
                        DiagnosticError::StreamFault,
                        format!("{:?} block after {} processed", status, summary.blocks_processed),
                    );
                }
                BlockRead::Timeout => {
                    summary.timeouts += 1;
                }
                BlockRead::Disconnected => {
                    tracing::debug!("[AnalysisThread] Producer disconnected");
                    break;
                }
            }

            let overflow = consumer.overflow_drops();
            if overflow > reported_overflow {
                tracing::warn!(
                    "[AnalysisThread] {} block(s) dropped on a full queue",
                    overflow - reported_overflow
                );
                for _ in reported_overflow..overflow {
                    telemetry::hub().record_block_dropped(DropReason::Overflow);
                }
                reported_overflow = overflow;
            }
        }

        summary.overflow_drops = consumer.overflow_drops();
        summary.cache_entries = self.cache.len();
        telemetry::hub().record_cache_size(summary.cache_entries);
        tracing::info!(
            "[AnalysisThread] Processed {} blocks, {} chord reports, {} cache entries",
            summary.blocks_processed,
            summary.chords_reported,
            summary.cache_entries
        );
        summary
    }

    fn update_key(&mut self, chord: &str) -> Option<KeyEstimate> {
        let vector = if chord == SILENCE {
            None
        } else {
            self.chord.template_for(chord)
        };
        let estimate = self.key.observe(vector.as_ref());

        if estimate.key == UNKNOWN_KEY
            || !self.key_limiter.should_emit(&estimate.key, self.clock.now())
        {
            return None;
        }

        telemetry::hub().record_key(&estimate.key, estimate.confidence);
        self.publish(PipelineEvent::KeyChanged {
            key: estimate.key.clone(),
            confidence: estimate.confidence,
        });
        Some(estimate)
    }

    fn track_block_size(&mut self, len: usize) {
        if len == 0 || len == self.expected_block_size {
            return;
        }
        tracing::debug!(
            "[MusicAnalyzer] Block size changed {} -> {}, recomputing detection rate",
            self.expected_block_size,
            len
        );
        self.expected_block_size = len;
        self.chord
            .set_update_interval(len as f32 / self.sample_rate as f32);
    }

    fn publish(&self, event: PipelineEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }
}

fn queue_percent(consumer: &BlockConsumer, capacity: usize) -> f32 {
    consumer.pending() as f32 / capacity.max(1) as f32 * 100.0
}

/// Spawn the analysis worker thread
///
/// The analyzer is handed back with the summary so the caller can run
/// structure analysis on everything that was heard.
pub fn spawn_analysis_thread(
    mut analyzer: MusicAnalyzer,
    mut consumer: BlockConsumer,
    running: Arc<AtomicBool>,
) -> JoinHandle<(MusicAnalyzer, ListenSummary)> {
    thread::spawn(move || {
        tracing::info!("[AnalysisThread] Started");
        let summary = analyzer.run_until_disconnected(&mut consumer, &running);
        (analyzer, summary)
    })
}
