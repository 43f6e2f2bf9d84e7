//! Process-wide record of pipeline activity.
//!
//! Detections, queue gauges, dropped blocks and reported errors are kept in a
//! bounded event log (oldest evicted first) and fanned out to any broadcast
//! subscriber. The CLI attaches a [`TelemetrySnapshot`] to its reports.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use once_cell::sync::Lazy;
use serde::Serialize;
use tokio::sync::broadcast;

use crate::error::{log_audio_error, log_cache_error, AudioError, CacheError, ErrorCode};

pub mod events;

pub use events::{DiagnosticError, DropReason, MetricEvent};

/// Queue gauge changes smaller than this many points are not published
const GAUGE_HYSTERESIS: f32 = 2.5;

static HUB: Lazy<TelemetryHub> = Lazy::new(TelemetryHub::default);

/// The hub every pipeline component reports into
pub fn hub() -> &'static TelemetryHub {
    &HUB
}

/// Point-in-time copy of the hub counters and the retained events
#[derive(Debug, Clone, Serialize)]
pub struct TelemetrySnapshot {
    pub recent: Vec<MetricEvent>,
    pub total_events: u64,
    /// Events pushed out of the bounded log
    pub evicted_events: u64,
    pub dropped_blocks: u64,
    pub error_counts: HashMap<DiagnosticError, u64>,
}

struct EventLog {
    events: VecDeque<MetricEvent>,
    capacity: usize,
    evicted: u64,
}

impl EventLog {
    fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            events: VecDeque::with_capacity(capacity),
            capacity,
            evicted: 0,
        }
    }

    fn push(&mut self, event: MetricEvent) {
        if self.events.len() == self.capacity {
            self.events.pop_front();
            self.evicted += 1;
        }
        self.events.push_back(event);
    }
}

pub struct TelemetryHub {
    sender: broadcast::Sender<MetricEvent>,
    log: Mutex<EventLog>,
    gauges: Mutex<HashMap<&'static str, f32>>,
    errors: Mutex<HashMap<DiagnosticError, u64>>,
    total_events: AtomicU64,
    dropped_blocks: AtomicU64,
}

impl TelemetryHub {
    pub fn new(channel_capacity: usize, history_capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(channel_capacity.max(1));
        Self {
            sender,
            log: Mutex::new(EventLog::new(history_capacity)),
            gauges: Mutex::new(HashMap::new()),
            errors: Mutex::new(HashMap::new()),
            total_events: AtomicU64::new(0),
            dropped_blocks: AtomicU64::new(0),
        }
    }

    /// Append to the log and broadcast; having no subscriber is fine
    pub fn publish(&self, event: MetricEvent) {
        self.total_events.fetch_add(1, Ordering::Relaxed);
        lock(&self.log).push(event.clone());
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MetricEvent> {
        self.sender.subscribe()
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        let (recent, evicted_events) = {
            let log = lock(&self.log);
            (log.events.iter().cloned().collect(), log.evicted)
        };
        TelemetrySnapshot {
            recent,
            total_events: self.total_events.load(Ordering::Relaxed),
            evicted_events,
            dropped_blocks: self.dropped_blocks.load(Ordering::Relaxed),
            error_counts: lock(&self.errors).clone(),
        }
    }

    /// Errors of class `code` reported since start-up
    pub fn error_count(&self, code: DiagnosticError) -> u64 {
        lock(&self.errors).get(&code).copied().unwrap_or(0)
    }

    pub fn record_chord(&self, chord: &str) {
        self.publish(MetricEvent::ChordChanged {
            chord: chord.to_string(),
        });
    }

    pub fn record_key(&self, key: &str, confidence: f32) {
        self.publish(MetricEvent::KeyChanged {
            key: key.to_string(),
            confidence,
        });
    }

    pub fn record_tempo(&self, bpm: f32) {
        self.publish(MetricEvent::TempoEstimated { bpm });
    }

    pub fn record_buffer_occupancy(&self, channel: &'static str, percent: f32) {
        let percent = percent.clamp(0.0, 100.0);
        {
            let mut gauges = lock(&self.gauges);
            if let Some(last) = gauges.get(channel) {
                if (last - percent).abs() < GAUGE_HYSTERESIS {
                    return;
                }
            }
            gauges.insert(channel, percent);
        }
        self.publish(MetricEvent::BufferOccupancy {
            channel: channel.to_string(),
            percent,
        });
    }

    pub fn record_block_dropped(&self, reason: DropReason) {
        let total = self.dropped_blocks.fetch_add(1, Ordering::Relaxed) + 1;
        self.publish(MetricEvent::BlockDropped { reason, total });
    }

    pub fn record_cache_size(&self, entries: usize) {
        self.publish(MetricEvent::CacheSize { entries });
    }

    pub fn record_error(&self, code: DiagnosticError, context: impl Into<String>) {
        *lock(&self.errors).entry(code).or_insert(0) += 1;
        self.publish(MetricEvent::Error {
            code,
            context: context.into(),
        });
    }

    /// Log `err` with its code, then publish it
    pub fn record_cache_error(&self, err: &CacheError, context: &str) {
        log_cache_error(err, context);
        self.record_error(
            DiagnosticError::from(err),
            format!("{}: {} ({})", context, err.message(), err.code()),
        );
    }

    /// Log `err` with its code, then publish it
    pub fn record_audio_error(&self, err: &AudioError, context: &str) {
        log_audio_error(err, context);
        self.record_error(
            DiagnosticError::from(err),
            format!("{}: {} ({})", context, err.message(), err.code()),
        );
    }
}

impl Default for TelemetryHub {
    fn default() -> Self {
        Self::new(256, 64)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
