//! tiercache - Two-Tier Read-Through / Write-Through Cache
//!
//! Shields a backing data store from load and from its own outages with an
//! in-process fast tier in front of a shared remote tier (Redis or any
//! [`store::RemoteStore`]).
//!
//! # Architecture
//!
//! ```text
//! caller ─▶ TieredCache ─▶ FastTier ──hit──▶ value
//!                │
//!                └─miss─▶ CircuitBreaker ─▶ RemoteStore
//!                              │
//!                              └─open─▶ Error::CircuitOpen (no network call)
//! ```
//!
//! # Features
//!
//! - Fast tier with lazy expiry and a cancellable background sweep
//! - Category-based TTL policy
//! - Circuit breaker with cautious half-open recovery
//! - Per-key stampede protection in `get_or_set`
//! - Lock-free metrics with slow-operation tracking
//! - Bounded-concurrency warm-up with retry
//! - Health probes and Prometheus exposition
//!
//! # Modules
//!
//! - [`cache`] - Tiers, breaker, policy, metrics, orchestration and warm-up
//! - [`config`] - Settings file format and duration parsing
//! - [`error`] - Error types
//! - [`monitoring`] - Health checks and Prometheus exporter
//! - [`store`] - Remote tier trait and implementations

pub mod cache;
pub mod config;
pub mod error;
pub mod monitoring;
pub mod store;

// Re-export commonly used types
pub use cache::{
    category, CacheConfig, CircuitBreakerConfig, CircuitState, FastTierConfig, MetricsSnapshot,
    TieredCache, TtlPolicyConfig, Warmup, WarmupConfig, WarmupKey, WarmupResult,
};
pub use config::CacheSettings;
pub use error::{Error, Result};
pub use store::{InMemoryStore, RemoteStore};

#[cfg(feature = "redis-store")]
pub use store::{RedisStore, RedisStoreConfig};
