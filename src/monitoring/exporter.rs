//! Prometheus exposition
//!
//! Gauges live in a private registry and are refreshed from the cache's
//! snapshots right before rendering, so scrapes always see current values and
//! `reset_metrics` is reflected without counter resets confusing `rate()`.

use prometheus::{Encoder, Gauge, IntGauge, Opts, Registry, TextEncoder};

use crate::cache::{CircuitState, TieredCache};
use crate::error::{Error, Result};

/// Prometheus exporter for one cache instance
pub struct PrometheusExporter {
    registry: Registry,
    hits: IntGauge,
    misses: IntGauge,
    errors: IntGauge,
    operations: IntGauge,
    slow_operations: IntGauge,
    hit_rate: Gauge,
    average_latency_ms: Gauge,
    operations_per_second: Gauge,
    breaker_state: IntGauge,
    breaker_failures: IntGauge,
    fast_tier_entries: IntGauge,
    fast_tier_expired_pending: IntGauge,
    fast_tier_reclaimed: IntGauge,
}

impl PrometheusExporter {
    /// Create an exporter whose metric names start with `namespace_`
    pub fn new(namespace: &str) -> Result<Self> {
        let registry = Registry::new();

        let int_gauge = |name: &str, help: &str| -> Result<IntGauge> {
            let gauge = IntGauge::with_opts(Opts::new(name, help).namespace(namespace))?;
            registry.register(Box::new(gauge.clone()))?;
            Ok(gauge)
        };
        let gauge = |name: &str, help: &str| -> Result<Gauge> {
            let gauge = Gauge::with_opts(Opts::new(name, help).namespace(namespace))?;
            registry.register(Box::new(gauge.clone()))?;
            Ok(gauge)
        };

        Ok(Self {
            hits: int_gauge("hits", "Cache hits since the last metrics reset")?,
            misses: int_gauge("misses", "Cache misses since the last metrics reset")?,
            errors: int_gauge("errors", "Remote tier errors since the last metrics reset")?,
            operations: int_gauge("operations", "Timed cache operations since the last reset")?,
            slow_operations: int_gauge("slow_operations", "Operations over 10ms in the last hour")?,
            hit_rate: gauge("hit_rate_percent", "Hit rate percentage")?,
            average_latency_ms: gauge("average_latency_ms", "Mean operation latency")?,
            operations_per_second: gauge("operations_per_second", "Throughput since last reset")?,
            breaker_state: int_gauge(
                "circuit_breaker_state",
                "Remote tier breaker state (0 closed, 1 half-open, 2 open)",
            )?,
            breaker_failures: int_gauge(
                "circuit_breaker_failures",
                "Consecutive remote tier failures",
            )?,
            fast_tier_entries: int_gauge("fast_tier_entries", "Entries held in the fast tier")?,
            fast_tier_expired_pending: int_gauge(
                "fast_tier_expired_pending",
                "Expired fast tier entries awaiting a sweep",
            )?,
            fast_tier_reclaimed: int_gauge(
                "fast_tier_reclaimed",
                "Fast tier entries reclaimed by sweeps",
            )?,
            registry,
        })
    }

    /// Copy the cache's current state into the gauges
    pub fn refresh(&self, cache: &TieredCache) {
        let metrics = cache.metrics();
        self.hits.set(metrics.hits as i64);
        self.misses.set(metrics.misses as i64);
        self.errors.set(metrics.errors as i64);
        self.operations.set(metrics.operation_count as i64);
        self.slow_operations.set(metrics.slow_operations as i64);
        self.hit_rate.set(metrics.hit_rate);
        self.average_latency_ms.set(metrics.average_latency_ms);
        self.operations_per_second.set(metrics.operations_per_second);

        let breaker = cache.circuit_breaker_state();
        self.breaker_state.set(match breaker.state {
            CircuitState::Closed => 0,
            CircuitState::HalfOpen => 1,
            CircuitState::Open => 2,
        });
        self.breaker_failures.set(i64::from(breaker.failure_count));

        let fast_tier = cache.memory_cache_stats();
        self.fast_tier_entries.set(fast_tier.entries as i64);
        self.fast_tier_expired_pending
            .set(fast_tier.expired_pending as i64);
        self.fast_tier_reclaimed.set(fast_tier.reclaimed as i64);
    }

    /// Render the registry in Prometheus text format
    pub fn render(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| Error::Internal(format!("non-UTF-8 metrics: {}", e)))
    }

    /// Refresh from `cache` and render
    pub fn scrape(&self, cache: &TieredCache) -> Result<String> {
        self.refresh(cache);
        self.render()
    }

    /// Content type for the rendered text
    pub fn content_type(&self) -> &'static str {
        prometheus::TEXT_FORMAT
    }
}

// =============================================================================
// Tests
// =============================================================================
