//! Cache Metrics Collection
//!
//! Lock-free counters for hits, misses, errors and latency, plus a per-minute
//! tally of slow operations kept for the last hour. Recording never fails and
//! never blocks the calling operation for longer than a shard lock.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use parking_lot::RwLock;
use serde::Serialize;

/// Operations slower than this count as slow
pub const SLOW_OPERATION_THRESHOLD: Duration = Duration::from_millis(10);

/// Slow-operation buckets older than this are pruned
const SLOW_BUCKET_RETENTION_SECS: i64 = 3600;

/// Cache metrics collector
#[derive(Debug)]
pub struct CacheMetrics {
    hits: AtomicU64,
    misses: AtomicU64,
    errors: AtomicU64,
    total_latency_nanos: AtomicU64,
    operation_count: AtomicU64,
    /// Minute-truncated unix timestamp → slow operation count
    slow_operations: DashMap<i64, u64>,
    /// Start of the current measurement window
    started_at: RwLock<Instant>,
}

impl Default for CacheMetrics {
    fn default() -> Self {
        Self {
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            total_latency_nanos: AtomicU64::new(0),
            operation_count: AtomicU64::new(0),
            slow_operations: DashMap::new(),
            started_at: RwLock::new(Instant::now()),
        }
    }
}

impl CacheMetrics {
    /// Create a new metrics collector
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Record the latency of one operation
    pub fn record_latency(&self, latency: Duration) {
        let nanos = latency.as_nanos().min(u64::MAX as u128) as u64;
        self.total_latency_nanos.fetch_add(nanos, Ordering::Relaxed);
        self.operation_count.fetch_add(1, Ordering::Relaxed);

        if latency > SLOW_OPERATION_THRESHOLD {
            let now = chrono::Utc::now().timestamp();
            let bucket = now - now.rem_euclid(60);
            *self.slow_operations.entry(bucket).or_insert(0) += 1;
        }

        self.prune_slow_operations();
    }

    fn prune_slow_operations(&self) {
        let cutoff = chrono::Utc::now().timestamp() - SLOW_BUCKET_RETENTION_SECS;
        self.slow_operations.retain(|bucket, _| *bucket >= cutoff);
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    pub fn errors(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }

    pub fn operation_count(&self) -> u64 {
        self.operation_count.load(Ordering::Relaxed)
    }

    /// Hit rate as a percentage (0 when nothing was recorded)
    pub fn hit_rate(&self) -> f64 {
        let hits = self.hits() as f64;
        let total = hits + self.misses() as f64;
        if total == 0.0 {
            0.0
        } else {
            hits / total * 100.0
        }
    }

    /// Mean latency in milliseconds (0 when nothing was recorded)
    pub fn average_latency_ms(&self) -> f64 {
        let count = self.operation_count();
        if count == 0 {
            return 0.0;
        }
        self.total_latency_nanos.load(Ordering::Relaxed) as f64 / count as f64 / 1e6
    }

    /// Slow operations within the retention window
    pub fn slow_operations(&self) -> u64 {
        self.slow_operations.iter().map(|bucket| *bucket.value()).sum()
    }

    /// Time since creation or the last reset
    pub fn uptime(&self) -> Duration {
        self.started_at.read().elapsed()
    }

    /// Get snapshot of all metrics
    pub fn snapshot(&self) -> MetricsSnapshot {
        let uptime = self.uptime();
        let operations = self.operation_count();
        let operations_per_second = if uptime.as_secs_f64() > 0.0 {
            operations as f64 / uptime.as_secs_f64()
        } else {
            0.0
        };

        MetricsSnapshot {
            hits: self.hits(),
            misses: self.misses(),
            errors: self.errors(),
            hit_rate: self.hit_rate(),
            average_latency_ms: self.average_latency_ms(),
            operation_count: operations,
            slow_operations: self.slow_operations(),
            uptime_seconds: uptime.as_secs_f64(),
            operations_per_second,
        }
    }

    /// Reset all metrics and restart the uptime clock
    pub fn reset(&self) {
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        self.errors.store(0, Ordering::Relaxed);
        self.total_latency_nanos.store(0, Ordering::Relaxed);
        self.operation_count.store(0, Ordering::Relaxed);
        self.slow_operations.clear();
        *self.started_at.write() = Instant::now();
    }
}

/// Snapshot of cache metrics
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub errors: u64,
    /// Percentage, 0-100
    pub hit_rate: f64,
    pub average_latency_ms: f64,
    pub operation_count: u64,
    /// Slow operations in the last hour
    pub slow_operations: u64,
    pub uptime_seconds: f64,
    pub operations_per_second: f64,
}

/// Records an operation's latency when dropped
pub struct LatencyTracker<'a> {
    metrics: &'a CacheMetrics,
    start: Instant,
}

impl<'a> LatencyTracker<'a> {
    /// Start tracking latency
    pub fn start(metrics: &'a CacheMetrics) -> Self {
        Self {
            metrics,
            start: Instant::now(),
        }
    }

    /// Get elapsed duration
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

impl Drop for LatencyTracker<'_> {
    fn drop(&mut self) {
        self.metrics.record_latency(self.start.elapsed());
    }
}

// =============================================================================
// Tests
// =============================================================================
