//! Time-windowed store of pipeline observations
//!
//! [`SoundCache`] keeps one [`CacheEntry`] per analysed block that carried a
//! chord. Every operation first prunes entries older than
//! `now - window_seconds`, so callers never see data outside the retention
//! window. All state sits behind a single `Mutex`; [`SoundCache::since`]
//! copies its result inside one critical section, which makes it safe to run
//! structure analysis while the analysis thread keeps writing.

pub mod fixture;

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::clock::{Clock, SystemClock};
use crate::error::CacheError;

/// Retention window used when none is configured (10 minutes)
pub const DEFAULT_WINDOW_SECONDS: f64 = 600.0;

/// Chord sentinel for entries without a recognised chord
pub const NO_CHORD: &str = "none";

/// One observation: chord label, dominant frequency, tempo and cache time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub chord: String,
    pub frequency: f64,
    pub bpm: f64,
    pub timestamp: f64,
}

impl CacheEntry {
    pub fn new(chord: impl Into<String>, frequency: f64, bpm: f64, timestamp: f64) -> Self {
        Self {
            chord: chord.into(),
            frequency,
            bpm,
            timestamp,
        }
    }
}

pub struct SoundCache {
    entries: Mutex<VecDeque<CacheEntry>>,
    window_seconds: f64,
    clock: Arc<dyn Clock>,
}

impl Default for SoundCache {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW_SECONDS)
    }
}

impl SoundCache {
    /// Cache timestamped by the system clock
    pub fn new(window_seconds: f64) -> Self {
        Self::with_clock(window_seconds, Arc::new(SystemClock::new()))
    }

    pub fn with_clock(window_seconds: f64, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(VecDeque::new()),
            window_seconds,
            clock,
        }
    }

    /// Cache pre-filled with recorded entries (sorted by timestamp)
    pub fn from_entries(
        window_seconds: f64,
        clock: Arc<dyn Clock>,
        mut entries: Vec<CacheEntry>,
    ) -> Self {
        entries.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));
        Self {
            entries: Mutex::new(entries.into()),
            window_seconds,
            clock,
        }
    }

    pub fn window_seconds(&self) -> f64 {
        self.window_seconds
    }

    /// Timestamp `chord` now and append it
    ///
    /// Timestamps never go backwards: an entry is stamped no earlier than the
    /// newest entry already stored.
    pub fn add(&self, chord: &str, frequency: f64, bpm: f64) -> CacheEntry {
        let now = self.clock.now();
        let mut entries = self.lock();
        let timestamp = entries.back().map_or(now, |last| now.max(last.timestamp));
        let entry = CacheEntry::new(chord, frequency, bpm, timestamp);
        entries.push_back(entry.clone());
        self.prune(&mut entries, now);
        entry
    }

    /// Append an entry carrying its own timestamp
    ///
    /// Entries older than the newest stored one are clamped forward so the
    /// store stays ordered.
    pub fn push_entry(&self, mut entry: CacheEntry) {
        let now = self.clock.now();
        let mut entries = self.lock();
        if let Some(last) = entries.back() {
            entry.timestamp = entry.timestamp.max(last.timestamp);
        }
        entries.push_back(entry);
        self.prune(&mut entries, now);
    }

    /// Append the entries of a recorded fixture file, returning how many
    /// were read
    pub fn extend_from_fixture<P: AsRef<std::path::Path>>(&self, path: P) -> Result<usize, CacheError> {
        let mut recorded = fixture::load_entries(path)?;
        recorded.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));
        let count = recorded.len();
        for entry in recorded {
            self.push_entry(entry);
        }
        Ok(count)
    }

    /// Occurrences of `chord` inside the window
    pub fn chord_count(&self, chord: &str) -> usize {
        self.pruned().iter().filter(|e| e.chord == chord).count()
    }

    /// Entry with the highest frequency (earliest on ties)
    pub fn max_frequency(&self) -> Option<CacheEntry> {
        let entries = self.pruned();
        let mut best: Option<&CacheEntry> = None;
        for entry in entries.iter() {
            if best.map_or(true, |b| entry.frequency > b.frequency) {
                best = Some(entry);
            }
        }
        best.cloned()
    }

    /// Up to `n` entries by descending frequency; equal frequencies keep
    /// their chronological order
    pub fn top_frequencies(&self, n: usize) -> Vec<CacheEntry> {
        let mut sorted: Vec<CacheEntry> = self.pruned().iter().cloned().collect();
        sorted.sort_by(|a, b| b.frequency.total_cmp(&a.frequency));
        sorted.truncate(n);
        sorted
    }

    /// Entries with `timestamp >= now - seconds`
    ///
    /// # Errors
    /// [`CacheError::UnsupportedLookback`] when `seconds >= window_seconds`:
    /// the cache may already have pruned part of that range.
    pub fn since(&self, seconds: f64) -> Result<Vec<CacheEntry>, CacheError> {
        let now = self.clock.now();
        let mut entries = self.lock();
        self.prune(&mut entries, now);

        if seconds >= self.window_seconds {
            return Err(CacheError::UnsupportedLookback {
                seconds,
                window_seconds: self.window_seconds,
            });
        }

        let cutoff = now - seconds;
        Ok(entries
            .iter()
            .filter(|e| e.timestamp >= cutoff)
            .cloned()
            .collect())
    }

    /// The `n` most recent entries, oldest first
    pub fn last_n(&self, n: usize) -> Vec<CacheEntry> {
        let entries = self.pruned();
        let skip = entries.len().saturating_sub(n);
        entries.iter().skip(skip).cloned().collect()
    }

    /// Snapshot of every entry inside the window
    pub fn entries(&self) -> Vec<CacheEntry> {
        self.pruned().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.pruned().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<CacheEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn pruned(&self) -> MutexGuard<'_, VecDeque<CacheEntry>> {
        let now = self.clock.now();
        let mut entries = self.lock();
        self.prune(&mut entries, now);
        entries
    }

    fn prune(&self, entries: &mut VecDeque<CacheEntry>, now: f64) {
        let cutoff = now - self.window_seconds;
        while entries.front().is_some_and(|e| e.timestamp < cutoff) {
            entries.pop_front();
        }
    }
}

impl fmt::Display for SoundCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entries = self.pruned();
        let (oldest, newest) = match (entries.front(), entries.back()) {
            (Some(first), Some(last)) => (first.timestamp, last.timestamp),
            _ => return write!(f, "SoundCache(window={}s) -> EMPTY", self.window_seconds),
        };

        let mut chords: Vec<(&str, usize)> = Vec::new();
        let mut max_freq = 0.0f64;
        for entry in entries.iter() {
            match chords.iter_mut().find(|(chord, _)| *chord == entry.chord) {
                Some((_, count)) => *count += 1,
                None => chords.push((&entry.chord, 1)),
            }
            max_freq = max_freq.max(entry.frequency);
        }
        chords.sort_by(|a, b| b.1.cmp(&a.1));
        let top: Vec<String> = chords
            .iter()
            .take(3)
            .map(|(chord, count)| format!("{chord} x{count}"))
            .collect();

        writeln!(f, "SoundCache(window={}s)", self.window_seconds)?;
        writeln!(f, "Entries: {}", entries.len())?;
        writeln!(f, "Time span: {:.2}s", newest - oldest)?;
        writeln!(f, "Max frequency: {:.2} Hz", max_freq)?;
        writeln!(f, "Top chords: {}", top.join(", "))?;
        write!(f, "Last 5 entries:")?;
        let skip = entries.len().saturating_sub(5);
        for entry in entries.iter().skip(skip) {
            write!(
                f,
                "\n  {:6} | {:7.2} Hz | {:6.1} BPM",
                entry.chord, entry.frequency, entry.bpm
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn cache(window: f64) -> (SoundCache, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(1000.0));
        (SoundCache::with_clock(window, clock.clone()), clock)
    }

    #[test]
    fn test_add_and_count() {
        let (cache, clock) = cache(600.0);
        cache.add("C", 261.6, 120.0);
        clock.advance(1.0);
        cache.add("G", 392.0, 120.0);
        clock.advance(1.0);
        cache.add("C", 523.2, 121.0);

        assert_eq!(cache.len(), 3);
        assert_eq!(cache.chord_count("C"), 2);
        assert_eq!(cache.chord_count("Am"), 0);
    }

    #[test]
    fn test_window_pruning() {
        let (cache, clock) = cache(10.0);
        cache.add("C", 0.0, 0.0);
        clock.advance(5.0);
        cache.add("G", 0.0, 0.0);

        clock.advance(5.5);
        // First entry is now 10.5s old
        assert_eq!(cache.entries().len(), 1);
        assert_eq!(cache.entries()[0].chord, "G");

        clock.advance(100.0);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_since_rejects_full_window() {
        let (cache, clock) = cache(10.0);
        cache.add("C", 0.0, 0.0);
        clock.advance(3.0);
        cache.add("G", 0.0, 0.0);

        assert_eq!(
            cache.since(10.0),
            Err(CacheError::UnsupportedLookback {
                seconds: 10.0,
                window_seconds: 10.0
            })
        );
        assert!(cache.since(25.0).is_err());

        let recent = cache.since(2.0).unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].chord, "G");
        assert_eq!(cache.since(3.0).unwrap().len(), 2);
    }

    #[test]
    fn test_top_frequencies_stable() {
        let (cache, clock) = cache(600.0);
        for (chord, freq) in [("a", 100.0), ("b", 300.0), ("c", 200.0), ("d", 300.0)] {
            cache.add(chord, freq, 0.0);
            clock.advance(0.1);
        }
        let top: Vec<String> = cache.top_frequencies(3).into_iter().map(|e| e.chord).collect();
        assert_eq!(top, vec!["b", "d", "c"]);
        assert_eq!(cache.top_frequencies(10).len(), 4);
        assert_eq!(cache.max_frequency().unwrap().chord, "b");
    }

    #[test]
    fn test_last_n_chronological() {
        let (cache, clock) = cache(600.0);
        for chord in ["C", "G", "Am", "F"] {
            cache.add(chord, 0.0, 0.0);
            clock.advance(0.5);
        }
        let last: Vec<String> = cache.last_n(2).into_iter().map(|e| e.chord).collect();
        assert_eq!(last, vec!["Am", "F"]);
        assert_eq!(cache.last_n(10).len(), 4);
    }

    #[test]
    fn test_timestamps_non_decreasing() {
        let (cache, clock) = cache(600.0);
        cache.add("C", 0.0, 0.0);
        clock.set(990.0);
        let entry = cache.add("G", 0.0, 0.0);
        assert_eq!(entry.timestamp, 1000.0);
    }

    #[test]
    fn test_empty_queries() {
        let (cache, _) = cache(600.0);
        assert_eq!(cache.max_frequency(), None);
        assert!(cache.top_frequencies(3).is_empty());
        assert!(cache.since(10.0).unwrap().is_empty());
        assert_eq!(cache.to_string(), "SoundCache(window=600s) -> EMPTY");
    }

    #[test]
    fn test_summary() {
        let (cache, clock) = cache(600.0);
        cache.add("C", 261.63, 120.0);
        clock.advance(2.0);
        cache.add("C", 440.0, 120.0);
        clock.advance(2.0);
        cache.add("G", 392.0, 118.0);

        let summary = cache.to_string();
        assert!(summary.contains("Entries: 3"));
        assert!(summary.contains("Time span: 4.00s"));
        assert!(summary.contains("Max frequency: 440.00 Hz"));
        assert!(summary.contains("Top chords: C x2, G x1"));
    }

    #[test]
    fn test_concurrent_writer_and_reader() {
        let clock = Arc::new(ManualClock::new(0.0));
        let cache = Arc::new(SoundCache::with_clock(600.0, clock.clone()));

        let writer = {
            let cache = Arc::clone(&cache);
            std::thread::spawn(move || {
                for i in 0..500 {
                    clock.advance(0.01);
                    cache.add(if i % 2 == 0 { "C" } else { "G" }, 0.0, 0.0);
                }
            })
        };

        for _ in 0..50 {
            let snapshot = cache.since(100.0).unwrap();
            assert!(snapshot.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
        }
        writer.join().unwrap();
        assert_eq!(cache.len(), 500);
    }

    #[test]
    fn test_extend_from_fixture() {
        let path = std::env::temp_dir().join(format!("sound_cache_extend_{}.jsonl", std::process::id()));
        fixture::save_entries(
            &path,
            &[
                CacheEntry::new("G", 392.0, 0.0, 999.0),
                CacheEntry::new("C", 261.63, 0.0, 998.0),
            ],
        )
        .unwrap();

        let (cache, _clock) = cache(600.0);
        let read = cache.extend_from_fixture(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(read, 2);
        let entries = cache.entries();
        assert_eq!(entries[0].chord, "C");
        assert_eq!(entries[1].chord, "G");
        assert!(cache.extend_from_fixture("does/not/exist.jsonl").is_err());
    }
}
