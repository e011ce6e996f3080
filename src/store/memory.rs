//! In-memory remote store
//!
//! Stands in for the remote tier in tests and single-node runs. Every trait
//! call is counted, and failures can be injected to drive the breaker.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use serde::Serialize;

use super::{glob_match, RemoteStore};
use crate::cache::entry::{now_nanos, CacheEntry};
use crate::error::{Error, Result};

/// Writes between opportunistic purges of expired entries
const PURGE_EVERY_SETS: u64 = 1024;

/// `DashMap`-backed remote store
pub struct InMemoryStore {
    data: DashMap<String, CacheEntry>,
    gets: AtomicU64,
    sets: AtomicU64,
    deletes: AtomicU64,
    scans: AtomicU64,
    pings: AtomicU64,
    /// Calls that still have to fail
    pending_failures: AtomicU64,
    /// Fail every call while set
    unavailable: AtomicBool,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self {
            data: DashMap::new(),
            gets: AtomicU64::new(0),
            sets: AtomicU64::new(0),
            deletes: AtomicU64::new(0),
            scans: AtomicU64::new(0),
            pings: AtomicU64::new(0),
            pending_failures: AtomicU64::new(0),
            unavailable: AtomicBool::new(false),
        }
    }
}

impl InMemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` calls fail with a remote error
    pub fn fail_next(&self, n: u64) {
        self.pending_failures.store(n, Ordering::SeqCst);
    }

    /// Fail every call until cleared
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Live keys currently stored
    pub fn len(&self) -> usize {
        let now = now_nanos();
        self.data.iter().filter(|e| !e.is_expired_at(now)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Check for a live key without counting a call
    pub fn contains(&self, key: &str) -> bool {
        let now = now_nanos();
        self.data.get(key).is_some_and(|e| !e.is_expired_at(now))
    }

    /// Per-operation call counts
    pub fn calls(&self) -> StoreCallCounts {
        StoreCallCounts {
            gets: self.gets.load(Ordering::Relaxed),
            sets: self.sets.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
            scans: self.scans.load(Ordering::Relaxed),
            pings: self.pings.load(Ordering::Relaxed),
        }
    }

    /// Drop every expired entry, returning how many were removed
    pub fn purge_expired(&self) -> usize {
        let now = now_nanos();
        let before = self.data.len();
        self.data.retain(|_, e| !e.is_expired_at(now));
        before.saturating_sub(self.data.len())
    }

    fn check_failure(&self, operation: &str) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(Error::remote(operation, "store unavailable"));
        }

        let consumed = self
            .pending_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if consumed {
            return Err(Error::remote(operation, "injected failure"));
        }

        Ok(())
    }
}

/// Call counts per store operation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StoreCallCounts {
    pub gets: u64,
    pub sets: u64,
    /// Single and batch deletes
    pub deletes: u64,
    pub scans: u64,
    pub pings: u64,
}

#[async_trait]
impl RemoteStore for InMemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Bytes>> {
        self.gets.fetch_add(1, Ordering::Relaxed);
        self.check_failure("GET")?;

        let now = now_nanos();
        let live = self
            .data
            .get(key)
            .map(|e| (!e.is_expired_at(now)).then(|| CacheEntry::value(&e).clone()));

        match live {
            Some(Some(value)) => Ok(Some(value)),
            Some(None) => {
                self.data.remove_if(key, |_, e| e.is_expired_at(now));
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> Result<()> {
        let count = self.sets.fetch_add(1, Ordering::Relaxed) + 1;
        self.check_failure("SET")?;

        if count % PURGE_EVERY_SETS == 0 {
            self.purge_expired();
        }
        self.data.insert(key.to_string(), CacheEntry::new(value, ttl));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.deletes.fetch_add(1, Ordering::Relaxed);
        self.check_failure("DEL")?;

        self.data.remove(key);
        Ok(())
    }

    async fn delete_many(&self, keys: &[String]) -> Result<()> {
        self.deletes.fetch_add(1, Ordering::Relaxed);
        self.check_failure("DEL")?;

        for key in keys {
            self.data.remove(key);
        }
        Ok(())
    }

    async fn scan_keys(&self, pattern: &str) -> Result<Vec<String>> {
        self.scans.fetch_add(1, Ordering::Relaxed);
        self.check_failure("SCAN")?;

        self.purge_expired();
        let now = now_nanos();
        Ok(self
            .data
            .iter()
            .filter(|e| !e.is_expired_at(now) && glob_match(pattern, e.key()))
            .map(|e| e.key().clone())
            .collect())
    }

    async fn ping(&self) -> Result<()> {
        self.pings.fetch_add(1, Ordering::Relaxed);
        self.check_failure("PING")
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

// =============================================================================
// Tests
// =============================================================================
