//! Counters for the sound cache and the playback loop
//!
//! Cache metrics live inside the cache's lock and are copied out on read.
//! Playback metrics are shared between the worker and observers, so they
//! use atomics.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Tracks cache performance metrics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheMetrics {
    hits: u64,
    misses: u64,
    evictions: u64,
}

impl CacheMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a cache hit
    pub fn record_hit(&mut self) {
        self.hits += 1;
    }

    /// Record a cache miss
    pub fn record_miss(&mut self) {
        self.misses += 1;
    }

    /// Record cache evictions
    pub fn record_eviction(&mut self, count: u64) {
        self.evictions += count;
    }

    /// Get cache hit rate as percentage
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            (self.hits as f64 / total as f64) * 100.0
        }
    }

    pub fn hits(&self) -> u64 {
        self.hits
    }

    pub fn misses(&self) -> u64 {
        self.misses
    }

    pub fn evictions(&self) -> u64 {
        self.evictions
    }
}

/// Counters updated by the playback worker
#[derive(Debug, Default)]
pub struct PlaybackMetrics {
    cycles: AtomicU64,
    skips: AtomicU64,
    playback_failures: AtomicU64,
}

impl PlaybackMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// A main clip was played and its wait started
    pub fn record_cycle(&self) {
        self.cycles.fetch_add(1, Ordering::Relaxed);
    }

    /// A missing file was skipped
    pub fn record_skip(&self) {
        self.skips.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.playback_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn cycles(&self) -> u64 {
        self.cycles.load(Ordering::Relaxed)
    }

    pub fn skips(&self) -> u64 {
        self.skips.load(Ordering::Relaxed)
    }

    pub fn playback_failures(&self) -> u64 {
        self.playback_failures.load(Ordering::Relaxed)
    }
}

/// Periodic summary of scheduler and cache counters
#[derive(Debug, Default)]
pub struct MetricsReporter {
    last_report: Option<Instant>,
}

impl MetricsReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Log a summary if enough time has passed (every 60 seconds)
    pub fn maybe_log_summary(&mut self, playback: &PlaybackMetrics, cache: CacheMetrics) {
        let should_log = match self.last_report {
            None => true,
            Some(last) => last.elapsed() >= Duration::from_secs(60),
        };

        if should_log && playback.cycles() > 0 {
            tracing::debug!(
                cycles = playback.cycles(),
                skips = playback.skips(),
                playback_failures = playback.playback_failures(),
                cache_hit_rate_pct = %cache.hit_rate(),
                cache_hits = cache.hits(),
                cache_misses = cache.misses(),
                cache_evictions = cache.evictions(),
                "Playback metrics summary"
            );
            self.last_report = Some(Instant::now());
        }
    }
}
