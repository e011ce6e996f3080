//! Tiered Cache - Fast Tier + Remote Tier Orchestration
//!
//! Reads go fast tier → remote tier (through the breaker) and backfill the
//! fast tier with a shortened TTL. Writes go remote first, then local, so the
//! tiers never disagree about a value the caller believes was persisted.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerSnapshot};
use super::fast_tier::{FastTier, FastTierConfig, FastTierStats};
use super::key_lock::KeyLockRegistry;
use super::metrics::{CacheMetrics, LatencyTracker, MetricsSnapshot};
use super::policy::{TtlPolicy, TtlPolicyConfig};
use super::DELETE_BATCH_SIZE;
use crate::error::{Error, Result};
use crate::store::RemoteStore;

/// Cache configuration
#[derive(Debug, Clone, Default)]
pub struct CacheConfig {
    /// Fast tier configuration
    pub fast_tier: FastTierConfig,
    /// Remote tier breaker configuration
    pub circuit_breaker: CircuitBreakerConfig,
    /// Category TTLs
    pub ttl: TtlPolicyConfig,
}

/// Two-tier cache
pub struct TieredCache {
    /// Shared remote tier
    store: Arc<dyn RemoteStore>,
    /// In-process tier
    fast_tier: Arc<FastTier>,
    /// Guards every remote call except health checks
    breaker: CircuitBreaker,
    /// Category → TTL
    policy: TtlPolicy,
    /// Operation metrics
    metrics: CacheMetrics,
    /// Per-key locks for `get_or_set`
    key_locks: KeyLockRegistry,
    /// Stops the sweep task
    cancel: CancellationToken,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl TieredCache {
    /// Create a cache in front of `store`
    ///
    /// Starts the fast tier sweeper when called inside a tokio runtime.
    pub fn new(store: Arc<dyn RemoteStore>, config: CacheConfig) -> Self {
        let fast_tier = Arc::new(FastTier::with_config(config.fast_tier));
        let breaker = CircuitBreaker::new(store.name(), config.circuit_breaker);
        let cancel = CancellationToken::new();

        let sweeper = match tokio::runtime::Handle::try_current() {
            Ok(_) => Some(fast_tier.spawn_sweeper(cancel.child_token())),
            Err(_) => {
                warn!("No tokio runtime, fast tier relies on lazy expiration only");
                None
            }
        };

        info!(
            store = store.name(),
            sweep_interval_secs = fast_tier.config().sweep_interval.as_secs(),
            fast_tier_max_ttl_secs = fast_tier.config().max_ttl.as_secs(),
            "Tiered cache initialized"
        );

        Self {
            store,
            fast_tier,
            breaker,
            policy: TtlPolicy::with_config(config.ttl),
            metrics: CacheMetrics::new(),
            key_locks: KeyLockRegistry::new(),
            cancel,
            sweeper: Mutex::new(sweeper),
        }
    }

    /// Create with default configuration
    pub fn with_defaults(store: Arc<dyn RemoteStore>) -> Self {
        Self::new(store, CacheConfig::default())
    }

    /// Fast tier TTL for a category: the policy TTL capped at the fast tier maximum
    fn fast_tier_ttl(&self, remote_ttl: Duration) -> Duration {
        let cap = self.fast_tier.config().max_ttl;
        if remote_ttl.is_zero() {
            cap
        } else {
            remote_ttl.min(cap)
        }
    }

    fn record_failure(&self, key: &str, operation: &str, error: &Error) {
        self.metrics.record_error();
        if error.is_circuit_open() {
            debug!(key, operation, "Remote tier skipped, circuit open");
        } else {
            warn!(key, operation, error = %error, "Remote tier operation failed");
        }
    }

    // =========================================================================
    // Raw byte operations
    // =========================================================================

    /// Get a value
    ///
    /// Returns [`Error::NotFound`] on a miss in both tiers.
    pub async fn get(&self, key: &str, category: &str) -> Result<Bytes> {
        let _latency = LatencyTracker::start(&self.metrics);
        self.get_inner(key, category).await
    }

    async fn get_inner(&self, key: &str, category: &str) -> Result<Bytes> {
        if let Some(value) = self.fast_tier.get(key) {
            self.metrics.record_hit();
            debug!(key, tier = "fast", "Cache hit");
            return Ok(value);
        }

        match self.breaker.execute(|| self.store.get(key)).await {
            Ok(Some(value)) => {
                let ttl = self.fast_tier_ttl(self.policy.ttl(category));
                self.fast_tier.set(key, value.clone(), ttl);
                self.metrics.record_hit();
                debug!(key, tier = "remote", "Cache hit");
                Ok(value)
            }
            Ok(None) => {
                self.metrics.record_miss();
                debug!(key, "Cache miss");
                Err(Error::NotFound {
                    key: key.to_string(),
                })
            }
            Err(e) => {
                self.record_failure(key, "get", &e);
                Err(e)
            }
        }
    }

    /// Store a value in both tiers using the category's TTL
    pub async fn set(&self, key: &str, value: Bytes, category: &str) -> Result<()> {
        let _latency = LatencyTracker::start(&self.metrics);
        self.set_inner(key, value, category).await
    }

    async fn set_inner(&self, key: &str, value: Bytes, category: &str) -> Result<()> {
        let ttl = self.policy.ttl(category);

        let remote = self
            .breaker
            .execute(|| self.store.set(key, value.clone(), ttl))
            .await;
        if let Err(e) = remote {
            self.record_failure(key, "set", &e);
            return Err(e);
        }

        self.fast_tier.set(key, value, self.fast_tier_ttl(ttl));
        debug!(key, category, ttl_secs = ttl.as_secs(), "Cache set");
        Ok(())
    }

    /// Remove a key from both tiers
    ///
    /// The fast tier entry is dropped even when the remote delete fails.
    pub async fn delete(&self, key: &str) -> Result<()> {
        let _latency = LatencyTracker::start(&self.metrics);

        self.fast_tier.delete(key);

        if let Err(e) = self.breaker.execute(|| self.store.delete(key)).await {
            self.record_failure(key, "delete", &e);
            return Err(e);
        }

        debug!(key, "Cache delete");
        Ok(())
    }

    /// Remove every key matching a glob pattern from both tiers
    ///
    /// Returns the number of keys removed.
    #[instrument(skip(self))]
    pub async fn delete_by_pattern(&self, pattern: &str) -> Result<usize> {
        let _latency = LatencyTracker::start(&self.metrics);

        let keys = match self.breaker.execute(|| self.store.scan_keys(pattern)).await {
            Ok(keys) => keys,
            Err(e) => {
                self.record_failure(pattern, "scan", &e);
                return Err(e);
            }
        };

        for batch in keys.chunks(DELETE_BATCH_SIZE) {
            for key in batch {
                self.fast_tier.delete(key);
            }
            if let Err(e) = self.breaker.execute(|| self.store.delete_many(batch)).await {
                self.record_failure(pattern, "delete_many", &e);
                return Err(e);
            }
        }

        // Keys that only ever lived locally
        let local_only = self.fast_tier.delete_matching(pattern);

        info!(
            pattern,
            remote = keys.len(),
            local_only,
            "Pattern invalidation complete"
        );
        Ok(keys.len() + local_only)
    }

    // =========================================================================
    // Typed operations
    // =========================================================================

    /// Get and decode a JSON value
    pub async fn get_object<T: DeserializeOwned>(&self, key: &str, category: &str) -> Result<T> {
        let _latency = LatencyTracker::start(&self.metrics);
        self.get_object_inner(key, category).await
    }

    async fn get_object_inner<T: DeserializeOwned>(&self, key: &str, category: &str) -> Result<T> {
        let bytes = self.get_inner(key, category).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Encode a value as JSON and store it
    pub async fn set_object<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        category: &str,
    ) -> Result<()> {
        let _latency = LatencyTracker::start(&self.metrics);
        self.set_object_inner(key, value, category).await
    }

    async fn set_object_inner<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        category: &str,
    ) -> Result<()> {
        let bytes = Bytes::from(serde_json::to_vec(value)?);
        self.set_inner(key, bytes, category).await
    }

    /// Get a value, resolving and caching it on a miss
    ///
    /// Concurrent callers for the same missing key wait on a per-key lock, so
    /// `resolver` runs at most once at a time per key. A cache read failure is
    /// treated as a miss; a failed write-back is logged and the resolved value
    /// is still returned.
    pub async fn get_or_set<T, F, Fut>(&self, key: &str, category: &str, resolver: F) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        let _latency = LatencyTracker::start(&self.metrics);

        if let Some(value) = self.lookup(key, category).await {
            return Ok(value);
        }

        let _guard = self.key_locks.acquire(key).await;

        // Another caller may have resolved it while we waited
        if let Some(value) = self.lookup(key, category).await {
            return Ok(value);
        }

        let value = resolver().await.map_err(Error::Resolver)?;

        if let Err(e) = self.set_object_inner(key, &value, category).await {
            warn!(key, error = %e, "Failed to cache resolved value");
        }

        Ok(value)
    }

    async fn lookup<T: DeserializeOwned>(&self, key: &str, category: &str) -> Option<T> {
        match self.get_object_inner(key, category).await {
            Ok(value) => Some(value),
            Err(e) if e.is_not_found() => None,
            Err(e) => {
                debug!(key, error = %e, "Cache read failed, treating as miss");
                None
            }
        }
    }

    // =========================================================================
    // Operations
    // =========================================================================

    /// Ping the remote tier directly, bypassing the breaker
    pub async fn health_check(&self) -> Result<()> {
        let _latency = LatencyTracker::start(&self.metrics);
        self.store.ping().await
    }

    /// Metrics snapshot
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Reset metrics
    pub fn reset_metrics(&self) {
        self.metrics.reset();
    }

    /// Breaker snapshot
    pub fn circuit_breaker_state(&self) -> CircuitBreakerSnapshot {
        self.breaker.snapshot()
    }

    /// Force the breaker closed
    pub fn reset_circuit_breaker(&self) {
        self.breaker.reset();
    }

    /// Fast tier statistics
    pub fn memory_cache_stats(&self) -> FastTierStats {
        self.fast_tier.stats()
    }

    /// Fast tier
    pub fn fast_tier(&self) -> &FastTier {
        &self.fast_tier
    }

    /// TTL policy
    pub fn ttl_policy(&self) -> &TtlPolicy {
        &self.policy
    }

    /// Remote tier breaker
    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    /// Remote store backend name
    pub fn store_name(&self) -> &'static str {
        self.store.name()
    }

    /// Keys currently being resolved by `get_or_set`
    pub fn pending_resolutions(&self) -> usize {
        self.key_locks.len()
    }

    /// Stop the sweep task and wait for it to exit
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let handle = self.sweeper.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(error = %e, "Fast tier sweeper ended abnormally");
            }
        }
        info!("Tiered cache shut down");
    }
}

impl Drop for TieredCache {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

// =============================================================================
// Tests
// =============================================================================
