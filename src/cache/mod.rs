//! Two-Tier Cache Engine
//!
//! Read-through, write-through caching in front of a shared remote store.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                           TieredCache                                │
//! ├──────────────────────────────────────────────────────────────────────┤
//! │  FastTier (in-process)   │  CircuitBreaker  │  RemoteStore (shared)  │
//! │  ┌────────────────────┐  │  ┌────────────┐  │  ┌──────────────────┐  │
//! │  │ RwLock<HashMap>    │  │  │ Closed     │  │  │ Redis / memory   │  │
//! │  │ TTL ≤ 30s          │◀─┼──│ Open       │──┼─▶│ TTL by category  │  │
//! │  │ periodic sweep     │  │  │ HalfOpen   │  │  │                  │  │
//! │  └────────────────────┘  │  └────────────┘  │  └──────────────────┘  │
//! │                                                                      │
//! │  TtlPolicy · CacheMetrics · KeyLockRegistry (stampede protection)   │
//! └──────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Guarantees
//!
//! - A `set` that fails remotely never touches the fast tier
//! - `get_or_set` runs at most one resolver per key at a time per instance
//! - Remote outages surface as typed errors, never panics

use std::time::Duration;

pub mod breaker;
pub mod entry;
mod fast_tier;
mod key_lock;
mod metrics;
pub mod policy;
mod tiered;
mod warmup;

#[cfg(test)]
mod proptest;

pub use breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerSnapshot, CircuitState};
pub use entry::CacheEntry;
pub use fast_tier::{FastTier, FastTierConfig, FastTierStats};
pub use key_lock::{KeyLockGuard, KeyLockRegistry};
pub use metrics::{CacheMetrics, LatencyTracker, MetricsSnapshot, SLOW_OPERATION_THRESHOLD};
pub use policy::{category, TtlPolicy, TtlPolicyConfig, DEFAULT_TTL};
pub use tiered::{CacheConfig, TieredCache};
pub use warmup::{Warmup, WarmupConfig, WarmupKey, WarmupResolver, WarmupResult};

/// Interval between fast tier expiry sweeps
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(300);

/// Longest a value may live in the fast tier
pub const DEFAULT_FAST_TIER_MAX_TTL: Duration = Duration::from_secs(30);

/// Keys deleted per remote round trip during pattern invalidation
pub const DELETE_BATCH_SIZE: usize = 100;
