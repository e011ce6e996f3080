//! Circuit Breaker
//!
//! Guards calls to the remote tier. Three states:
//!
//! ```text
//! Closed ──(failure_threshold consecutive failures)──▶ Open
//! Open ──(reset_timeout elapsed, next request)──▶ HalfOpen
//! HalfOpen ──(half_open_success_threshold successes)──▶ Closed
//! HalfOpen ──(any failure)──▶ Open
//! ```
//!
//! Recovery is deliberately asymmetric: one failed trial reopens the circuit,
//! several consecutive successes are needed to close it.
//!
//! All state lives behind one `RwLock`. The Open → HalfOpen flip is checked
//! under the read lock and re-validated under the write lock so concurrent
//! callers cannot transition twice.

use std::future::Future;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::error::{Error, Result};

/// Circuit breaker states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CircuitState {
    /// Normal operation - all calls pass through
    Closed,
    /// Failing fast - calls are rejected without touching the remote tier
    Open,
    /// Trial mode - calls pass through and decide the next state
    HalfOpen,
}

impl CircuitState {
    /// Stable lowercase name
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half-open",
        }
    }
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Circuit breaker configuration
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures (while closed) that open the circuit
    pub failure_threshold: u32,
    /// Time the circuit stays open before a trial request is allowed
    pub reset_timeout: Duration,
    /// Consecutive half-open successes that close the circuit
    pub half_open_success_threshold: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout: Duration::from_secs(30),
            half_open_success_threshold: 2,
        }
    }
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    failure_count: u32,
    success_count: u32,
    last_state_change: Instant,
}

/// Circuit breaker
#[derive(Debug)]
pub struct CircuitBreaker {
    /// Component name for logging and errors
    name: String,
    config: CircuitBreakerConfig,
    inner: RwLock<BreakerState>,
}

impl CircuitBreaker {
    /// Create a closed circuit breaker
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        let name = name.into();
        info!(
            component = %name,
            failure_threshold = config.failure_threshold,
            reset_timeout_ms = config.reset_timeout.as_millis() as u64,
            half_open_success_threshold = config.half_open_success_threshold,
            "Circuit breaker initialized"
        );

        Self {
            name,
            config,
            inner: RwLock::new(BreakerState {
                state: CircuitState::Closed,
                failure_count: 0,
                success_count: 0,
                last_state_change: Instant::now(),
            }),
        }
    }

    /// Current state
    pub fn state(&self) -> CircuitState {
        self.inner.read().state
    }

    /// Component name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Configuration
    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Decide whether a request may reach the remote tier
    pub fn allow_request(&self) -> bool {
        {
            let inner = self.inner.read();
            match inner.state {
                CircuitState::Closed | CircuitState::HalfOpen => return true,
                CircuitState::Open => {
                    if inner.last_state_change.elapsed() < self.config.reset_timeout {
                        return false;
                    }
                }
            }
        }

        // Re-check under the write lock; another caller may have flipped it
        let mut inner = self.inner.write();
        if inner.state == CircuitState::Open
            && inner.last_state_change.elapsed() >= self.config.reset_timeout
        {
            inner.state = CircuitState::HalfOpen;
            inner.success_count = 0;
            inner.last_state_change = Instant::now();
            info!(
                component = %self.name,
                success_threshold = self.config.half_open_success_threshold,
                "Circuit breaker half-open (testing recovery)"
            );
        }

        inner.state != CircuitState::Open
    }

    /// Record the outcome of a request that was allowed through
    pub fn record_result(&self, success: bool) {
        let mut inner = self.inner.write();

        match (inner.state, success) {
            (CircuitState::Closed, true) => {
                inner.failure_count = 0;
            }
            (CircuitState::Closed, false) => {
                inner.failure_count += 1;
                debug!(
                    component = %self.name,
                    failure_count = inner.failure_count,
                    "Remote call failed"
                );
                if inner.failure_count >= self.config.failure_threshold {
                    inner.state = CircuitState::Open;
                    inner.success_count = 0;
                    inner.last_state_change = Instant::now();
                    error!(
                        component = %self.name,
                        consecutive_failures = inner.failure_count,
                        reset_timeout_ms = self.config.reset_timeout.as_millis() as u64,
                        "Circuit breaker opened (failing fast)"
                    );
                }
            }
            (CircuitState::HalfOpen, true) => {
                inner.success_count += 1;
                if inner.success_count >= self.config.half_open_success_threshold {
                    inner.state = CircuitState::Closed;
                    inner.failure_count = 0;
                    inner.success_count = 0;
                    inner.last_state_change = Instant::now();
                    info!(component = %self.name, "Circuit breaker closed (recovered)");
                }
            }
            (CircuitState::HalfOpen, false) => {
                inner.state = CircuitState::Open;
                inner.failure_count = self.config.failure_threshold;
                inner.success_count = 0;
                inner.last_state_change = Instant::now();
                warn!(component = %self.name, "Trial request failed, circuit reopened");
            }
            (CircuitState::Open, _) => {
                // Late result from a call admitted before the circuit opened
            }
        }
    }

    /// Run `operation` under breaker protection
    ///
    /// Returns [`Error::CircuitOpen`] without invoking `operation` when the
    /// circuit denies the request; otherwise records the outcome and returns
    /// the operation's own result.
    pub async fn execute<T, F, Fut>(&self, operation: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if !self.allow_request() {
            return Err(Error::CircuitOpen {
                component: self.name.clone(),
            });
        }

        let result = operation().await;
        self.record_result(result.is_ok());
        result
    }

    /// Administrative reset back to closed
    pub fn reset(&self) {
        let mut inner = self.inner.write();
        inner.state = CircuitState::Closed;
        inner.failure_count = 0;
        inner.success_count = 0;
        inner.last_state_change = Instant::now();
        warn!(component = %self.name, "Circuit breaker manually reset");
    }

    /// Snapshot for dashboards
    pub fn snapshot(&self) -> CircuitBreakerSnapshot {
        let inner = self.inner.read();
        CircuitBreakerSnapshot {
            name: self.name.clone(),
            state: inner.state,
            failure_count: inner.failure_count,
            success_count: inner.success_count,
            seconds_in_state: inner.last_state_change.elapsed().as_secs_f64(),
        }
    }
}

/// Point-in-time view of a circuit breaker
#[derive(Debug, Clone, Serialize)]
pub struct CircuitBreakerSnapshot {
    /// Component name
    pub name: String,
    /// Current state
    pub state: CircuitState,
    /// Consecutive failures
    pub failure_count: u32,
    /// Consecutive half-open successes
    pub success_count: u32,
    /// Seconds since the last transition
    pub seconds_in_state: f64,
}

// =============================================================================
// Tests
// =============================================================================
