//! Fast Tier - In-Process Hot Cache
//!
//! Volatile key/value map sitting in front of the remote tier.
//!
//! # Design
//!
//! - Single `RwLock` over a `HashMap`: concurrent readers, exclusive writers
//! - Lazy expiration: `get`/`has` ignore expired entries without removing them
//! - Active sweep: a background task periodically drops expired entries
//! - No error conditions; a miss is a normal, silent outcome

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::RwLock;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use super::entry::{now_nanos, CacheEntry};
use super::DEFAULT_SWEEP_INTERVAL;
use crate::store::glob_match;

/// Fast tier configuration
#[derive(Debug, Clone)]
pub struct FastTierConfig {
    /// Interval between active expiry sweeps
    pub sweep_interval: Duration,
    /// Upper bound on how long a value lives in the fast tier
    pub max_ttl: Duration,
}

impl Default for FastTierConfig {
    fn default() -> Self {
        Self {
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            max_ttl: super::DEFAULT_FAST_TIER_MAX_TTL,
        }
    }
}

/// In-process cache tier
pub struct FastTier {
    /// Entry storage
    entries: RwLock<HashMap<String, CacheEntry>>,
    /// Configuration
    config: FastTierConfig,
    /// Completed sweep count
    sweeps: AtomicU64,
    /// Entries reclaimed by sweeps
    reclaimed: AtomicU64,
}

impl FastTier {
    /// Create a new fast tier with default configuration
    pub fn new() -> Self {
        Self::with_config(FastTierConfig::default())
    }

    /// Create a new fast tier with custom configuration
    pub fn with_config(config: FastTierConfig) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            config,
            sweeps: AtomicU64::new(0),
            reclaimed: AtomicU64::new(0),
        }
    }

    /// Store a value; `ttl` of zero never expires
    pub fn set(&self, key: impl Into<String>, value: Bytes, ttl: Duration) {
        let entry = CacheEntry::new(value, ttl);
        self.entries.write().insert(key.into(), entry);
    }

    /// Get a live value
    pub fn get(&self, key: &str) -> Option<Bytes> {
        let now = now_nanos();
        let entries = self.entries.read();
        entries
            .get(key)
            .filter(|e| !e.is_expired_at(now))
            .map(|e| e.value().clone())
    }

    /// Check for a live value
    pub fn has(&self, key: &str) -> bool {
        let now = now_nanos();
        self.entries
            .read()
            .get(key)
            .is_some_and(|e| !e.is_expired_at(now))
    }

    /// Remove a key; returns true if something was stored under it
    pub fn delete(&self, key: &str) -> bool {
        self.entries.write().remove(key).is_some()
    }

    /// Remove all keys matching a glob pattern
    pub fn delete_matching(&self, pattern: &str) -> usize {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|key, _| !glob_match(pattern, key));
        before - entries.len()
    }

    /// Remove all entries
    pub fn clear(&self) {
        self.entries.write().clear();
    }

    /// Number of stored entries, including expired ones not yet swept
    pub fn count(&self) -> usize {
        self.entries.read().len()
    }

    /// Check if the tier holds no entries
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Get configuration
    pub fn config(&self) -> &FastTierConfig {
        &self.config
    }

    /// Drop every expired entry; returns the number removed
    pub fn sweep(&self) -> usize {
        let now = now_nanos();
        let removed = {
            let mut entries = self.entries.write();
            let before = entries.len();
            entries.retain(|_, e| !e.is_expired_at(now));
            before - entries.len()
        };

        self.sweeps.fetch_add(1, Ordering::Relaxed);
        self.reclaimed.fetch_add(removed as u64, Ordering::Relaxed);
        trace!(removed, "Fast tier sweep complete");
        removed
    }

    /// Spawn the periodic sweep task; it stops when `cancel` fires
    pub fn spawn_sweeper(self: &Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        let tier = Arc::clone(self);
        let period = self.config.sweep_interval;

        tokio::spawn(async move {
            let mut tick = interval_at(Instant::now() + period, period);
            tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        debug!("Fast tier sweeper stopped");
                        break;
                    }
                    _ = tick.tick() => {
                        tier.sweep();
                    }
                }
            }
        })
    }
}

impl Default for FastTier {
    fn default() -> Self {
        Self::new()
    }
}

/// Fast tier statistics
#[derive(Debug, Clone, Serialize)]
pub struct FastTierStats {
    /// Stored entries, including expired ones awaiting a sweep
    pub entries: usize,
    /// Entries already expired but not yet swept
    pub expired_pending: usize,
    /// Sweep interval in seconds
    pub sweep_interval_secs: u64,
    /// Fast tier TTL cap in seconds
    pub max_ttl_secs: u64,
    /// Completed sweeps
    pub sweeps: u64,
    /// Entries reclaimed by sweeps
    pub reclaimed: u64,
}

impl FastTier {
    /// Get tier statistics
    pub fn stats(&self) -> FastTierStats {
        let now = now_nanos();
        let (entries, expired_pending) = {
            let entries = self.entries.read();
            let expired = entries.values().filter(|e| e.is_expired_at(now)).count();
            (entries.len(), expired)
        };

        FastTierStats {
            entries,
            expired_pending,
            sweep_interval_secs: self.config.sweep_interval.as_secs(),
            max_ttl_secs: self.config.max_ttl.as_secs(),
            sweeps: self.sweeps.load(Ordering::Relaxed),
            reclaimed: self.reclaimed.load(Ordering::Relaxed),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
