//! Time sources for timestamps and rate limiting
//!
//! The cache and the tempo estimator both need "now" in seconds. Live capture
//! uses [`SystemClock`] (wall-clock anchored, monotonic afterwards); replays
//! and tests drive a [`ManualClock`] so time advances with the audio instead
//! of with the CPU.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

/// Source of the current time in seconds
pub trait Clock: Send + Sync {
    fn now(&self) -> f64;
}

impl<C: Clock + ?Sized> Clock for Arc<C> {
    fn now(&self) -> f64 {
        (**self).now()
    }
}

/// Wall-clock seconds since the UNIX epoch, sampled once and then advanced
/// with a monotonic [`Instant`] so timestamps never go backwards.
#[derive(Debug, Clone)]
pub struct SystemClock {
    epoch_offset: f64,
    anchor: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        let epoch_offset = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs_f64();
        Self {
            epoch_offset,
            anchor: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> f64 {
        self.epoch_offset + self.anchor.elapsed().as_secs_f64()
    }
}

/// Externally driven clock (stores the f64 bit pattern atomically)
#[derive(Debug, Default)]
pub struct ManualClock {
    bits: AtomicU64,
}

impl ManualClock {
    pub fn new(start_seconds: f64) -> Self {
        Self {
            bits: AtomicU64::new(start_seconds.to_bits()),
        }
    }

    pub fn set(&self, seconds: f64) {
        self.bits.store(seconds.to_bits(), Ordering::SeqCst);
    }

    /// Move the clock forward; negative steps are ignored
    pub fn advance(&self, seconds: f64) {
        if seconds <= 0.0 {
            return;
        }
        let _ = self
            .bits
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |bits| {
                Some((f64::from_bits(bits) + seconds).to_bits())
            });
    }
}

impl Clock for ManualClock {
    fn now(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::SeqCst))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_clock_is_monotonic() {
        let clock = SystemClock::new();
        let a = clock.now();
        let b = clock.now();
        assert!(b >= a);
        assert!(a > 1_000_000_000.0, "expected epoch-based seconds, got {a}");
    }

    #[test]
    fn manual_clock_advances_and_ignores_negative_steps() {
        let clock = ManualClock::new(10.0);
        clock.advance(0.5);
        assert_eq!(clock.now(), 10.5);
        clock.advance(-3.0);
        assert_eq!(clock.now(), 10.5);
        clock.set(2.0);
        assert_eq!(clock.now(), 2.0);
    }

    #[test]
    fn arc_clock_delegates() {
        let clock = Arc::new(ManualClock::new(4.0));
        let shared: Arc<dyn Clock> = clock.clone();
        clock.advance(1.0);
        assert_eq!(shared.now(), 5.0);
    }
}
