//! Health Checks
//!
//! Liveness and readiness probes built from the remote tier ping, the breaker
//! state and the fast tier statistics.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::cache::{CircuitState, TieredCache};

/// Health status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HealthStatus {
    /// Both tiers working
    Healthy,
    /// Serving, but the remote tier is being bypassed or probed
    Degraded,
    /// Remote tier unreachable
    Unhealthy,
}

impl HealthStatus {
    /// Check if status is healthy or degraded (operational)
    pub fn is_operational(&self) -> bool {
        matches!(self, HealthStatus::Healthy | HealthStatus::Degraded)
    }

    pub fn is_healthy(&self) -> bool {
        *self == HealthStatus::Healthy
    }

    fn severity(&self) -> u8 {
        match self {
            HealthStatus::Healthy => 0,
            HealthStatus::Degraded => 1,
            HealthStatus::Unhealthy => 2,
        }
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "Healthy"),
            HealthStatus::Degraded => write!(f, "Degraded"),
            HealthStatus::Unhealthy => write!(f, "Unhealthy"),
        }
    }
}

/// Health check result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckResult {
    /// Check name
    pub name: String,
    pub status: HealthStatus,
    pub message: Option<String>,
    /// Duration of check
    pub duration_ms: u64,
}

impl HealthCheckResult {
    pub fn healthy(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: HealthStatus::Healthy,
            message: None,
            duration_ms: 0,
        }
    }

    pub fn degraded(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: HealthStatus::Degraded,
            message: Some(message.into()),
            duration_ms: 0,
        }
    }

    pub fn unhealthy(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: HealthStatus::Unhealthy,
            message: Some(message.into()),
            duration_ms: 0,
        }
    }

    /// Attach an informational message without changing the status
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration_ms = duration.as_millis() as u64;
        self
    }
}

/// Overall health response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Worst status among the checks
    pub status: HealthStatus,
    pub checks: Vec<HealthCheckResult>,
    pub version: String,
    pub uptime_seconds: u64,
}

impl HealthResponse {
    pub fn new(checks: Vec<HealthCheckResult>, uptime: Duration) -> Self {
        let status = checks
            .iter()
            .map(|c| c.status)
            .max_by_key(HealthStatus::severity)
            .unwrap_or(HealthStatus::Healthy);

        Self {
            status,
            checks,
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_seconds: uptime.as_secs(),
        }
    }
}

/// Health checks for one cache instance
pub struct HealthCheck {
    cache: Arc<TieredCache>,
    start_time: Instant,
    /// Flipped once warm-up has finished
    ready: AtomicBool,
}

impl HealthCheck {
    pub fn new(cache: Arc<TieredCache>) -> Self {
        Self {
            cache,
            start_time: Instant::now(),
            ready: AtomicBool::new(false),
        }
    }

    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Relaxed)
    }

    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::Relaxed);
    }

    /// Ping the remote tier (bypasses the breaker)
    pub async fn remote_check(&self) -> HealthCheckResult {
        let started = Instant::now();
        let name = format!("remote:{}", self.cache.store_name());
        let result = match self.cache.health_check().await {
            Ok(()) => HealthCheckResult::healthy(name),
            Err(e) => HealthCheckResult::unhealthy(name, e.to_string()),
        };
        result.with_duration(started.elapsed())
    }

    pub fn breaker_check(&self) -> HealthCheckResult {
        let snapshot = self.cache.circuit_breaker_state();
        match snapshot.state {
            CircuitState::Closed => HealthCheckResult::healthy("circuit_breaker"),
            CircuitState::Open => HealthCheckResult::degraded(
                "circuit_breaker",
                format!(
                    "open for {:.0}s after {} failures",
                    snapshot.seconds_in_state, snapshot.failure_count
                ),
            ),
            CircuitState::HalfOpen => HealthCheckResult::degraded(
                "circuit_breaker",
                format!("half-open, {} trial successes", snapshot.success_count),
            ),
        }
    }

    pub fn fast_tier_check(&self) -> HealthCheckResult {
        let stats = self.cache.memory_cache_stats();
        HealthCheckResult::healthy("fast_tier").with_message(format!(
            "{} entries, {} awaiting sweep",
            stats.entries, stats.expired_pending
        ))
    }

    /// Liveness: the process is up and the cache answers
    pub fn liveness(&self) -> HealthResponse {
        HealthResponse::new(vec![self.fast_tier_check()], self.uptime())
    }

    /// Readiness: warm-up done and every check passes
    pub async fn readiness(&self) -> HealthResponse {
        let ready = if self.is_ready() {
            HealthCheckResult::healthy("readiness")
        } else {
            HealthCheckResult::unhealthy("readiness", "warm-up in progress")
        };

        let checks = vec![
            ready,
            self.remote_check().await,
            self.breaker_check(),
            self.fast_tier_check(),
        ];
        HealthResponse::new(checks, self.uptime())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::category;
    use crate::store::InMemoryStore;

    fn setup() -> (Arc<InMemoryStore>, HealthCheck) {
        let store = Arc::new(InMemoryStore::new());
        let cache = Arc::new(TieredCache::with_defaults(store.clone()));
        (store, HealthCheck::new(cache))
    }

    #[test]
    fn test_health_status() {
        assert!(HealthStatus::Healthy.is_healthy());
        assert!(HealthStatus::Degraded.is_operational());
        assert!(!HealthStatus::Degraded.is_healthy());
        assert!(!HealthStatus::Unhealthy.is_operational());
        assert_eq!(format!("{}", HealthStatus::Degraded), "Degraded");
    }

    #[test]
    fn test_health_response_takes_worst() {
        let checks = vec![
            HealthCheckResult::healthy("a"),
            HealthCheckResult::unhealthy("b", "down"),
            HealthCheckResult::degraded("c", "slow"),
        ];

        let response = HealthResponse::new(checks, Duration::from_secs(60));
        assert_eq!(response.status, HealthStatus::Unhealthy);
        assert_eq!(response.uptime_seconds, 60);
    }

    #[tokio::test]
    async fn test_readiness_requires_warmup() {
        let (_store, health) = setup();

        let response = health.readiness().await;
        assert_eq!(response.status, HealthStatus::Unhealthy);

        health.set_ready(true);
        let response = health.readiness().await;
        assert_eq!(response.status, HealthStatus::Healthy);
        assert_eq!(response.checks.len(), 4);
    }

    #[tokio::test]
    async fn test_open_breaker_degrades() {
        let (store, health) = setup();
        health.set_ready(true);

        store.set_unavailable(true);
        for _ in 0..5 {
            let _ = health.cache.get("product:1", category::PRODUCT).await;
        }
        store.set_unavailable(false);

        let response = health.readiness().await;
        assert_eq!(response.status, HealthStatus::Degraded);
        assert!(response.status.is_operational());
    }

    #[tokio::test]
    async fn test_unreachable_remote_is_unhealthy() {
        let (store, health) = setup();
        health.set_ready(true);
        store.set_unavailable(true);

        let check = health.remote_check().await;
        assert_eq!(check.status, HealthStatus::Unhealthy);
        assert_eq!(check.name, "remote:memory");

        // Liveness does not depend on the remote tier
        assert_eq!(health.liveness().status, HealthStatus::Healthy);
    }

    #[test]
    fn test_serialization() {
        let result = HealthCheckResult::degraded("circuit_breaker", "open");
        let json = serde_json::to_string(&result).unwrap();
        assert!(json.contains("Degraded"));

        let deserialized: HealthCheckResult = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized.status, HealthStatus::Degraded);
    }
}
