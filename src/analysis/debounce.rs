// Debounce - stability and rate-limit helpers shared by the detectors
//
// StableLabelDebouncer: IDLE -> CANDIDATE(label, count) -> REPORTED(label)
// TickDivider: one detection per N ingestion calls
// IntervalGate: at most one active update per time interval
// ChangeRateLimiter: emit a label only when it changed and the interval elapsed

/// Observable state of a [`StableLabelDebouncer`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DebounceState {
    Idle,
    Candidate { label: String, count: u32 },
    Reported { label: String },
}

/// Requires `smoothing` identical consecutive observations before a label is
/// reported, and never reports the same label twice in a row.
#[derive(Debug, Clone)]
pub struct StableLabelDebouncer {
    smoothing: u32,
    candidate: Option<String>,
    count: u32,
    last_reported: Option<String>,
}

impl StableLabelDebouncer {
    pub fn new(smoothing: u32) -> Self {
        Self {
            smoothing: smoothing.max(1),
            candidate: None,
            count: 0,
            last_reported: None,
        }
    }

    /// Feed one observation; returns the label when it becomes newly stable
    pub fn observe(&mut self, label: &str) -> Option<String> {
        if self.candidate.as_deref() == Some(label) {
            self.count = self.count.saturating_add(1);
        } else {
            self.candidate = Some(label.to_string());
            self.count = 1;
        }

        if self.count >= self.smoothing && self.last_reported.as_deref() != Some(label) {
            self.last_reported = Some(label.to_string());
            return Some(label.to_string());
        }
        None
    }

    pub fn last_reported(&self) -> Option<&str> {
        self.last_reported.as_deref()
    }

    pub fn state(&self) -> DebounceState {
        match (&self.candidate, &self.last_reported) {
            (Some(candidate), Some(reported)) if candidate == reported => DebounceState::Reported {
                label: reported.clone(),
            },
            (Some(candidate), _) => DebounceState::Candidate {
                label: candidate.clone(),
                count: self.count,
            },
            (None, _) => DebounceState::Idle,
        }
    }

    pub fn reset(&mut self) {
        self.candidate = None;
        self.count = 0;
        self.last_reported = None;
    }
}

/// Lets every `every_n`-th tick through
#[derive(Debug, Clone)]
pub struct TickDivider {
    every_n: u64,
    ticks: u64,
}

impl TickDivider {
    pub fn new(every_n: u64) -> Self {
        Self {
            every_n: every_n.max(1),
            ticks: 0,
        }
    }

    /// `max(1, round((1 / target_hz) / tick_seconds))`
    pub fn from_rates(target_hz: f32, tick_seconds: f32) -> Self {
        Self::new(Self::divisor(target_hz, tick_seconds))
    }

    pub fn divisor(target_hz: f32, tick_seconds: f32) -> u64 {
        if target_hz <= 0.0 || tick_seconds <= 0.0 {
            return 1;
        }
        ((1.0 / target_hz) / tick_seconds).round().max(1.0) as u64
    }

    /// Count one tick; true when this tick should run a detection
    pub fn tick(&mut self) -> bool {
        self.ticks += 1;
        self.ticks % self.every_n == 0
    }

    pub fn every_n(&self) -> u64 {
        self.every_n
    }

    pub fn set_every_n(&mut self, every_n: u64) {
        self.every_n = every_n.max(1);
    }

    pub fn reset(&mut self) {
        self.ticks = 0;
    }
}

/// Opens at most once per `interval` seconds; the first call always opens
#[derive(Debug, Clone)]
pub struct IntervalGate {
    interval: f64,
    last_open: Option<f64>,
}

impl IntervalGate {
    pub fn new(interval_seconds: f64) -> Self {
        Self {
            interval: interval_seconds.max(0.0),
            last_open: None,
        }
    }

    pub fn try_open(&mut self, now: f64) -> bool {
        match self.last_open {
            Some(last) if now - last < self.interval => false,
            _ => {
                self.last_open = Some(now);
                true
            }
        }
    }

    pub fn reset(&mut self) {
        self.last_open = None;
    }
}

/// Emits a label only if it differs from the last emitted one and at least
/// `interval` seconds passed since that emission
#[derive(Debug, Clone)]
pub struct ChangeRateLimiter {
    last_label: Option<String>,
    last_at: Option<f64>,
    interval: f64,
}

impl ChangeRateLimiter {
    pub fn new(interval_seconds: f64) -> Self {
        Self {
            last_label: None,
            last_at: None,
            interval: interval_seconds.max(0.0),
        }
    }

    pub fn should_emit(&mut self, label: &str, now: f64) -> bool {
        let changed = self.last_label.as_deref() != Some(label);
        let past_rate_limit = self
            .last_at
            .map(|ts| now - ts > self.interval)
            .unwrap_or(true);

        if changed && past_rate_limit {
            self.last_label = Some(label.to_string());
            self.last_at = Some(now);
            true
        } else {
            false
        }
    }

    pub fn last_label(&self) -> Option<&str> {
        self.last_label.as_deref()
    }

    pub fn clear(&mut self) {
        self.last_label = None;
        self.last_at = None;
    }
}
