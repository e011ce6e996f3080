//! Remote Tier Stores
//!
//! The shared, out-of-process key-value store behind the fast tier. The cache
//! only needs byte-level get/set/delete with TTL plus glob scanning, so any
//! backend that can provide those plugs in through [`RemoteStore`].
//!
//! # Implementations
//!
//! - [`InMemoryStore`]: process-local store with call counters and failure
//!   injection, used for tests and single-node deployments
//! - `RedisStore` (feature `redis-store`): Redis, Dragonfly or Valkey via a
//!   multiplexed connection manager

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::Result;

pub mod memory;
mod pattern;

#[cfg(feature = "redis-store")]
pub mod redis;

pub use memory::{InMemoryStore, StoreCallCounts};
pub use pattern::glob_match;

#[cfg(feature = "redis-store")]
pub use self::redis::{RedisStore, RedisStoreConfig};

/// Remote key-value store consumed by the tiered cache
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Fetch a value; `Ok(None)` means the key does not exist
    async fn get(&self, key: &str) -> Result<Option<Bytes>>;

    /// Store a value; a zero `ttl` stores without expiry
    async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> Result<()>;

    /// Remove a key (absent keys are not an error)
    async fn delete(&self, key: &str) -> Result<()>;

    /// Remove several keys in one round trip
    async fn delete_many(&self, keys: &[String]) -> Result<()>;

    /// List keys matching a Redis-style glob pattern
    async fn scan_keys(&self, pattern: &str) -> Result<Vec<String>>;

    /// Liveness probe
    async fn ping(&self) -> Result<()>;

    /// Backend name for logs and health reports
    fn name(&self) -> &'static str;
}
