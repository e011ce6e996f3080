//! Cache Warm-Up
//!
//! Pre-populates the cache from (category, key) pairs before traffic arrives.
//! Workers run under a fixed-size semaphore; one key's failure never aborts
//! the batch.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::BoxFuture;
use futures::FutureExt;
use serde::{Serialize, Serializer};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::tiered::TieredCache;

/// Resolves a key to the value that should be cached for it
pub type WarmupResolver =
    Arc<dyn Fn(String) -> BoxFuture<'static, anyhow::Result<serde_json::Value>> + Send + Sync>;

/// Warm-up configuration
#[derive(Debug, Clone)]
pub struct WarmupConfig {
    /// Run nothing when false
    pub enabled: bool,
    /// Simultaneous workers
    pub concurrency: usize,
    /// Category → keys to load
    pub keys: HashMap<String, Vec<String>>,
    /// Extra passes over failed keys in `run_with_retry`
    pub retry_attempts: u32,
    /// Pause between passes
    pub retry_delay: Duration,
    /// Deadline for a single resolver call
    pub resolve_timeout: Duration,
}

impl Default for WarmupConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            concurrency: 10,
            keys: HashMap::new(),
            retry_attempts: 3,
            retry_delay: Duration::from_secs(1),
            resolve_timeout: Duration::from_secs(10),
        }
    }
}

/// Summary of a warm-up run
#[derive(Debug, Clone, Default, Serialize)]
pub struct WarmupResult {
    /// Keys resolved and stored
    pub success_count: usize,
    /// Keys that were already cached
    pub skipped_count: usize,
    /// Keys that still failed at the end of the run
    pub error_count: usize,
    /// Wall-clock duration
    pub duration: Duration,
    /// (category, key) → last error message
    #[serde(serialize_with = "serialize_errors")]
    pub errors: HashMap<WarmupKey, String>,
    /// Passes executed (1 + retries)
    pub attempts: u32,
}

impl WarmupResult {
    /// Last error recorded for a key in a category
    pub fn error(&self, category: &str, key: &str) -> Option<&str> {
        self.errors
            .get(&WarmupKey::new(category, key))
            .map(String::as_str)
    }
}

fn serialize_errors<S: Serializer>(
    errors: &HashMap<WarmupKey, String>,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.collect_map(errors.iter().map(|(k, v)| (k.to_string(), v)))
}

/// A key to load, scoped by its category
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WarmupKey {
    pub category: String,
    pub key: String,
}

impl WarmupKey {
    pub fn new(category: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            key: key.into(),
        }
    }
}

impl fmt::Display for WarmupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.category, self.key)
    }
}

enum Outcome {
    Loaded,
    Skipped,
    Failed(String),
}

/// Warm-up job
pub struct Warmup {
    config: WarmupConfig,
    resolvers: HashMap<String, WarmupResolver>,
}

impl Warmup {
    pub fn new(config: WarmupConfig) -> Self {
        Self {
            config,
            resolvers: HashMap::new(),
        }
    }

    /// Register the resolver for a category
    pub fn with_resolver<F, Fut, V>(mut self, category: impl Into<String>, resolver: F) -> Self
    where
        F: Fn(String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<V>> + Send + 'static,
        V: Serialize,
    {
        let wrapped: WarmupResolver = Arc::new(move |key: String| {
            let fut = resolver(key);
            async move { Ok::<_, anyhow::Error>(serde_json::to_value(fut.await?)?) }.boxed()
        });
        self.resolvers.insert(category.into(), wrapped);
        self
    }

    pub fn config(&self) -> &WarmupConfig {
        &self.config
    }

    fn targets(&self) -> Vec<WarmupKey> {
        self.config
            .keys
            .iter()
            .flat_map(|(category, keys)| {
                keys.iter()
                    .map(move |key| WarmupKey::new(category.clone(), key.clone()))
            })
            .collect()
    }

    /// Load every configured key once
    #[instrument(skip_all, fields(run_id = %Uuid::new_v4()))]
    pub async fn run(&self, cache: &Arc<TieredCache>) -> WarmupResult {
        if !self.config.enabled {
            info!("Cache warm-up disabled");
            return WarmupResult::default();
        }

        let started = Instant::now();
        let targets = self.targets();
        let mut result = self.run_targets(cache, targets).await;
        result.duration = started.elapsed();
        result.attempts = 1;

        info!(
            loaded = result.success_count,
            skipped = result.skipped_count,
            failed = result.error_count,
            duration_ms = result.duration.as_millis() as u64,
            "Cache warm-up complete"
        );
        result
    }

    /// Load every configured key, retrying the failed ones
    #[instrument(skip_all, fields(run_id = %Uuid::new_v4()))]
    pub async fn run_with_retry(&self, cache: &Arc<TieredCache>) -> WarmupResult {
        if !self.config.enabled {
            info!("Cache warm-up disabled");
            return WarmupResult::default();
        }

        let started = Instant::now();
        let mut pending = self.targets();
        let mut total = WarmupResult::default();

        for attempt in 0..=self.config.retry_attempts {
            if attempt > 0 {
                debug!(attempt, remaining = pending.len(), "Retrying failed warm-up keys");
                tokio::time::sleep(self.config.retry_delay).await;
            }

            let pass = self.run_targets(cache, pending.clone()).await;
            total.success_count += pass.success_count;
            total.skipped_count += pass.skipped_count;
            total.attempts = attempt + 1;

            let failed: HashSet<&WarmupKey> = pass.errors.keys().collect();
            pending.retain(|t| failed.contains(t));
            total.errors = pass.errors;
            if pending.is_empty() {
                break;
            }
        }

        total.error_count = total.errors.len();
        total.duration = started.elapsed();

        if total.error_count > 0 {
            warn!(
                failed = total.error_count,
                attempts = total.attempts,
                "Cache warm-up finished with failures"
            );
        } else {
            info!(
                loaded = total.success_count,
                skipped = total.skipped_count,
                attempts = total.attempts,
                duration_ms = total.duration.as_millis() as u64,
                "Cache warm-up complete"
            );
        }
        total
    }

    async fn run_targets(&self, cache: &Arc<TieredCache>, targets: Vec<WarmupKey>) -> WarmupResult {
        let semaphore = Arc::new(Semaphore::new(self.config.concurrency.max(1)));
        let mut workers = JoinSet::new();

        for target in targets {
            let cache = Arc::clone(cache);
            let semaphore = Arc::clone(&semaphore);
            let resolver = self.resolvers.get(&target.category).cloned();
            let timeout = self.config.resolve_timeout;

            workers.spawn(async move {
                let outcome = match semaphore.acquire_owned().await {
                    Ok(_permit) => {
                        // A panicking resolver fails its own key only
                        AssertUnwindSafe(warm_one(&cache, &target, resolver, timeout))
                            .catch_unwind()
                            .await
                            .unwrap_or_else(|panic| {
                                warn!(key = %target, "Warm-up worker panicked");
                                Outcome::Failed(format!(
                                    "resolver panicked: {}",
                                    panic_message(panic.as_ref())
                                ))
                            })
                    }
                    Err(_) => Outcome::Failed("worker pool closed".to_string()),
                };
                (target, outcome)
            });
        }

        let mut result = WarmupResult::default();
        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok((_, Outcome::Loaded)) => result.success_count += 1,
                Ok((_, Outcome::Skipped)) => result.skipped_count += 1,
                Ok((target, Outcome::Failed(reason))) => {
                    result.errors.insert(target, reason);
                }
                // Only reachable on runtime shutdown; panics are caught above
                Err(e) => warn!(error = %e, "Warm-up worker aborted"),
            }
        }
        result.error_count = result.errors.len();
        result
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

async fn warm_one(
    cache: &TieredCache,
    target: &WarmupKey,
    resolver: Option<WarmupResolver>,
    timeout: Duration,
) -> Outcome {
    let Some(resolver) = resolver else {
        return Outcome::Failed(format!("no resolver for category {}", target.category));
    };

    if cache.get(&target.key, &target.category).await.is_ok() {
        return Outcome::Skipped;
    }

    let value = match tokio::time::timeout(timeout, resolver(target.key.clone())).await {
        Ok(Ok(value)) => value,
        Ok(Err(e)) => return Outcome::Failed(format!("{:#}", e)),
        Err(_) => return Outcome::Failed(format!("resolver timed out after {:?}", timeout)),
    };

    match cache.set_object(&target.key, &value, &target.category).await {
        Ok(()) => {
            debug!(key = %target.key, category = %target.category, "Warmed");
            Outcome::Loaded
        }
        Err(e) => Outcome::Failed(e.to_string()),
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::policy::category;
    use crate::cache::CacheConfig;
    use crate::store::InMemoryStore;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn cache() -> (Arc<InMemoryStore>, Arc<TieredCache>) {
        let store = Arc::new(InMemoryStore::new());
        let cache = Arc::new(TieredCache::new(store.clone(), CacheConfig::default()));
        (store, cache)
    }

    fn config(keys: Vec<(&str, Vec<&str>)>) -> WarmupConfig {
        WarmupConfig {
            keys: keys
                .into_iter()
                .map(|(c, ks)| (c.to_string(), ks.into_iter().map(String::from).collect()))
                .collect(),
            retry_delay: Duration::from_millis(5),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_disabled_is_noop() {
        let (store, cache) = cache();
        let warmup = Warmup::new(WarmupConfig {
            enabled: false,
            ..config(vec![(category::PRODUCT, vec!["product:1"])])
        })
        .with_resolver(category::PRODUCT, |_key| async { Ok(1) });

        let result = warmup.run(&cache).await;
        assert_eq!(result.success_count, 0);
        assert_eq!(store.calls().sets, 0);
    }

    #[tokio::test]
    async fn test_loads_all_keys() {
        let (store, cache) = cache();
        let warmup = Warmup::new(config(vec![
            (category::PRODUCT, vec!["product:1", "product:2"]),
            (category::REFERENCE, vec!["reference:brands"]),
        ]))
        .with_resolver(category::PRODUCT, |key| async move { Ok(format!("value-{}", key)) })
        .with_resolver(category::REFERENCE, |_key| async { Ok(vec!["acme", "globex"]) });

        let result = warmup.run(&cache).await;

        assert_eq!(result.success_count, 3);
        assert_eq!(result.error_count, 0);
        assert_eq!(store.len(), 3);

        let value: String = cache.get_object("product:2", category::PRODUCT).await.unwrap();
        assert_eq!(value, "value-product:2");
    }

    #[tokio::test]
    async fn test_skips_cached_keys() {
        let (_store, cache) = cache();
        cache
            .set_object("product:1", &"cached", category::PRODUCT)
            .await
            .unwrap();

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let warmup = Warmup::new(config(vec![(category::PRODUCT, vec!["product:1", "product:2"])]))
            .with_resolver(category::PRODUCT, move |_key| {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Ok("fresh") }
            });

        let result = warmup.run(&cache).await;

        assert_eq!(result.skipped_count, 1);
        assert_eq!(result.success_count, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failures_are_isolated() {
        let (_store, cache) = cache();
        let warmup = Warmup::new(config(vec![
            (category::PRODUCT, vec!["product:1", "product:bad"]),
            ("unregistered", vec!["mystery:1"]),
        ]))
        .with_resolver(category::PRODUCT, |key| async move {
            if key.ends_with("bad") {
                anyhow::bail!("upstream 500");
            }
            Ok(1)
        });

        let result = warmup.run(&cache).await;

        assert_eq!(result.success_count, 1);
        assert_eq!(result.error_count, 2);
        assert_eq!(result.error(category::PRODUCT, "product:bad"), Some("upstream 500"));
        assert!(result
            .error("unregistered", "mystery:1")
            .is_some_and(|e| e.contains("no resolver")));
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let (_store, cache) = cache();
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let keys: Vec<String> = (0..20).map(|i| format!("product:{}", i)).collect();
        let mut cfg = WarmupConfig {
            concurrency: 3,
            ..Default::default()
        };
        cfg.keys.insert(category::PRODUCT.to_string(), keys);

        let (a, p) = (Arc::clone(&active), Arc::clone(&peak));
        let warmup = Warmup::new(cfg).with_resolver(category::PRODUCT, move |_key| {
            let (active, peak) = (Arc::clone(&a), Arc::clone(&p));
            async move {
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                active.fetch_sub(1, Ordering::SeqCst);
                Ok(0)
            }
        });

        let result = warmup.run(&cache).await;
        assert_eq!(result.success_count, 20);
        assert!(peak.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test]
    async fn test_retry_recovers_flaky_keys() {
        let (_store, cache) = cache();
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&attempts);

        let warmup = Warmup::new(config(vec![(category::INVENTORY, vec!["inventory:1"])]))
            .with_resolver(category::INVENTORY, move |_key| {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        anyhow::bail!("flaky");
                    }
                    Ok(12)
                }
            });

        let result = warmup.run_with_retry(&cache).await;

        assert_eq!(result.success_count, 1);
        assert_eq!(result.error_count, 0);
        assert_eq!(result.attempts, 3);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_gives_up() {
        let (_store, cache) = cache();
        let warmup = Warmup::new(WarmupConfig {
            retry_attempts: 2,
            ..config(vec![(category::USER, vec!["user:1"])])
        })
        .with_resolver(category::USER, |_key| async {
            Err::<u32, _>(anyhow::anyhow!("always down"))
        });

        let result = warmup.run_with_retry(&cache).await;

        assert_eq!(result.attempts, 3);
        assert_eq!(result.error_count, 1);
        assert_eq!(result.error(category::USER, "user:1"), Some("always down"));
    }

    #[tokio::test]
    async fn test_resolver_timeout() {
        let (_store, cache) = cache();
        let warmup = Warmup::new(WarmupConfig {
            resolve_timeout: Duration::from_millis(10),
            ..config(vec![(category::PRODUCT, vec!["product:slow"])])
        })
        .with_resolver(category::PRODUCT, |_key| async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok(0)
        });

        let result = warmup.run(&cache).await;
        assert!(result
            .error(category::PRODUCT, "product:slow")
            .is_some_and(|e| e.contains("timed out")));
    }

    #[tokio::test]
    async fn test_panicking_resolver_is_recorded_and_retried() {
        let (_store, cache) = cache();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);

        let warmup = Warmup::new(WarmupConfig {
            retry_attempts: 1,
            ..config(vec![(category::PRODUCT, vec!["product:1", "product:boom"])])
        })
        .with_resolver(category::PRODUCT, move |key: String| {
            if key.ends_with("boom") {
                counter.fetch_add(1, Ordering::SeqCst);
            }
            async move {
                if key.ends_with("boom") {
                    panic!("resolver exploded");
                }
                Ok(1)
            }
        });

        let result = warmup.run_with_retry(&cache).await;

        assert_eq!(result.success_count, 1);
        assert_eq!(result.error_count, 1);
        assert_eq!(result.attempts, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(result
            .error(category::PRODUCT, "product:boom")
            .is_some_and(|e| e.contains("resolver exploded")));
    }

    #[tokio::test]
    async fn test_same_key_in_two_categories_tracked_separately() {
        let (_store, cache) = cache();
        let calls = Arc::new(AtomicUsize::new(0));
        let (c1, c2) = (Arc::clone(&calls), Arc::clone(&calls));

        let warmup = Warmup::new(WarmupConfig {
            retry_attempts: 1,
            ..config(vec![
                (category::PRODUCT, vec!["shared:1"]),
                (category::REFERENCE, vec!["shared:1"]),
            ])
        })
        .with_resolver(category::PRODUCT, move |_key| {
            c1.fetch_add(1, Ordering::SeqCst);
            async { Err::<u32, _>(anyhow::anyhow!("product down")) }
        })
        .with_resolver(category::REFERENCE, move |_key| {
            c2.fetch_add(1, Ordering::SeqCst);
            async { Err::<u32, _>(anyhow::anyhow!("reference down")) }
        });

        let result = warmup.run_with_retry(&cache).await;

        assert_eq!(result.error_count, 2);
        assert_eq!(result.error(category::PRODUCT, "shared:1"), Some("product down"));
        assert_eq!(result.error(category::REFERENCE, "shared:1"), Some("reference down"));
        // Each pair runs once per pass
        assert_eq!(calls.load(Ordering::SeqCst), 4);

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["errors"]["reference/shared:1"], "reference down");
    }
}
