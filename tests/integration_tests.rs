//! tiercache Integration Tests
//!
//! End-to-end scenarios through the public API:
//! - Read-through / write-through across both tiers
//! - Stampede protection and circuit breaking
//! - Warm-up, configuration and monitoring

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use tiercache::cache::category;
use tiercache::store::{InMemoryStore, RemoteStore};
use tiercache::{CacheConfig, CircuitBreakerConfig, CircuitState, Error, TieredCache};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct User {
    id: u64,
    name: String,
}

fn setup(config: CacheConfig) -> (Arc<InMemoryStore>, Arc<TieredCache>) {
    let store = Arc::new(InMemoryStore::new());
    let cache = Arc::new(TieredCache::new(store.clone(), config));
    (store, cache)
}

// =============================================================================
// Read-Through / Write-Through
// =============================================================================

mod tiering_tests {
    use super::*;

    #[tokio::test]
    async fn test_write_through_then_local_read() {
        let (store, cache) = setup(CacheConfig::default());

        cache
            .set("product:1", Bytes::from_static(b"lamp"), category::PRODUCT)
            .await
            .unwrap();

        assert!(store.contains("product:1"));
        let value = cache.get("product:1", category::PRODUCT).await.unwrap();
        assert_eq!(value.as_ref(), b"lamp");
        assert_eq!(store.calls().gets, 0);
    }

    #[tokio::test]
    async fn test_shared_remote_between_instances() {
        let store = Arc::new(InMemoryStore::new());
        let writer = TieredCache::with_defaults(store.clone());
        let reader = TieredCache::with_defaults(store.clone());

        let user = User {
            id: 42,
            name: "Ada".to_string(),
        };
        writer.set_object("user:42", &user, category::USER).await.unwrap();

        let read: User = reader.get_object("user:42", category::USER).await.unwrap();
        assert_eq!(read, user);
        assert_eq!(store.calls().gets, 1);

        // Second read is served by the reader's fast tier
        let _: User = reader.get_object("user:42", category::USER).await.unwrap();
        assert_eq!(store.calls().gets, 1);
    }

    #[tokio::test]
    async fn test_entries_expire_in_both_tiers() {
        let mut config = CacheConfig::default();
        config
            .ttl
            .categories
            .insert("flash".to_string(), Duration::from_millis(150));
        let (store, cache) = setup(config);

        cache
            .set("flash:1", Bytes::from_static(b"deal"), "flash")
            .await
            .unwrap();
        assert!(cache.get("flash:1", "flash").await.is_ok());

        tokio::time::sleep(Duration::from_millis(250)).await;

        let result = cache.get("flash:1", "flash").await;
        assert_matches!(result, Err(Error::NotFound { .. }));
        assert_eq!(store.get("flash:1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_delete_by_pattern_clears_both_tiers() {
        let (store, cache) = setup(CacheConfig::default());

        for id in 1..=3 {
            cache
                .set(&format!("product:{}", id), Bytes::from_static(b"p"), category::PRODUCT)
                .await
                .unwrap();
        }
        cache
            .set("user:1", Bytes::from_static(b"u"), category::USER)
            .await
            .unwrap();

        let deleted = cache.delete_by_pattern("product:*").await.unwrap();
        assert_eq!(deleted, 3);

        for id in 1..=3 {
            let key = format!("product:{}", id);
            assert!(!store.contains(&key));
            assert!(!cache.fast_tier().has(&key));
            assert_matches!(
                cache.get(&key, category::PRODUCT).await,
                Err(Error::NotFound { .. })
            );
        }
        assert!(cache.get("user:1", category::USER).await.is_ok());
    }
}

// =============================================================================
// Stampede Protection & Circuit Breaking
// =============================================================================

mod resilience_tests {
    use super::*;

    #[tokio::test]
    async fn test_concurrent_get_or_set_resolves_once() {
        let (_store, cache) = setup(CacheConfig::default());
        let calls = Arc::new(AtomicUsize::new(0));

        let load = |cache: Arc<TieredCache>, calls: Arc<AtomicUsize>| async move {
            cache
                .get_or_set("user:42", category::USER, || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    Ok::<_, anyhow::Error>(User {
                        id: 42,
                        name: "Ada".to_string(),
                    })
                })
                .await
        };

        let (a, b, c) = tokio::join!(
            load(cache.clone(), calls.clone()),
            load(cache.clone(), calls.clone()),
            load(cache.clone(), calls.clone()),
        );

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let a = a.unwrap();
        assert_eq!(a, b.unwrap());
        assert_eq!(a, c.unwrap());
        assert_eq!(cache.pending_resolutions(), 0);
    }

    #[tokio::test]
    async fn test_breaker_opens_and_short_circuits() {
        let (store, cache) = setup(CacheConfig::default());
        store.set_unavailable(true);

        for _ in 0..5 {
            let result = cache.get("product:1", category::PRODUCT).await;
            assert_matches!(result, Err(Error::Remote { .. }));
        }
        assert_eq!(cache.circuit_breaker_state().state, CircuitState::Open);

        let result = cache.get("product:1", category::PRODUCT).await;
        assert_matches!(result, Err(Error::CircuitOpen { .. }));
        assert_eq!(store.calls().gets, 5);
    }

    #[tokio::test]
    async fn test_breaker_recovers_after_reset_timeout() {
        let (store, cache) = setup(CacheConfig {
            circuit_breaker: CircuitBreakerConfig {
                failure_threshold: 2,
                reset_timeout: Duration::from_millis(100),
                half_open_success_threshold: 2,
            },
            ..Default::default()
        });

        store.set_unavailable(true);
        for _ in 0..2 {
            let _ = cache.get("product:1", category::PRODUCT).await;
        }
        assert_eq!(cache.circuit_breaker_state().state, CircuitState::Open);

        store.set_unavailable(false);
        tokio::time::sleep(Duration::from_millis(150)).await;

        // Misses are successful remote calls
        for _ in 0..2 {
            assert_matches!(
                cache.get("product:1", category::PRODUCT).await,
                Err(Error::NotFound { .. })
            );
        }
        assert_eq!(cache.circuit_breaker_state().state, CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_fast_tier_serves_while_remote_is_down() {
        let (store, cache) = setup(CacheConfig::default());
        cache
            .set("product:9", Bytes::from_static(b"cached"), category::PRODUCT)
            .await
            .unwrap();

        store.set_unavailable(true);

        let value = cache.get("product:9", category::PRODUCT).await.unwrap();
        assert_eq!(value.as_ref(), b"cached");
        assert_eq!(cache.circuit_breaker_state().failure_count, 0);
    }
}

// =============================================================================
// Warm-up, Configuration & Monitoring
// =============================================================================

mod operations_tests {
    use super::*;
    use tiercache::monitoring::{HealthCheck, HealthStatus, PrometheusExporter};
    use tiercache::{CacheSettings, Warmup, WarmupConfig};

    #[tokio::test]
    async fn test_warmup_populates_cache() {
        let (store, cache) = setup(CacheConfig::default());

        let mut config = WarmupConfig::default();
        config.keys.insert(
            category::USER.to_string(),
            vec!["user:1".to_string(), "user:2".to_string()],
        );
        let warmup = Warmup::new(config).with_resolver(category::USER, |key: String| async move {
            let id = key.trim_start_matches("user:").parse::<u64>()?;
            Ok::<_, anyhow::Error>(User {
                id,
                name: format!("user-{}", id),
            })
        });

        let result = warmup.run(&cache).await;
        assert_eq!(result.success_count, 2);
        assert_eq!(result.error_count, 0);
        assert!(store.contains("user:1"));

        let user: User = cache.get_object("user:2", category::USER).await.unwrap();
        assert_eq!(user.name, "user-2");
    }

    #[tokio::test]
    async fn test_settings_drive_cache_behaviour() {
        let yaml = r#"
circuit_breaker:
  failure_threshold: 2
ttl:
  categories:
    flash: 100ms
"#;
        let settings = CacheSettings::from_yaml_str(yaml).unwrap();
        let (store, cache) = setup(settings.cache_config().unwrap());

        assert_eq!(cache.ttl_policy().ttl("flash"), Duration::from_millis(100));

        store.set_unavailable(true);
        for _ in 0..2 {
            let _ = cache.get("product:1", category::PRODUCT).await;
        }
        assert_eq!(cache.circuit_breaker_state().state, CircuitState::Open);
    }

    #[tokio::test]
    async fn test_readiness_tracks_remote_and_warmup() {
        let (store, cache) = setup(CacheConfig::default());
        let health = HealthCheck::new(cache.clone());

        assert_eq!(health.readiness().await.status, HealthStatus::Unhealthy);

        health.set_ready(true);
        assert_eq!(health.readiness().await.status, HealthStatus::Healthy);

        store.set_unavailable(true);
        assert_eq!(health.readiness().await.status, HealthStatus::Unhealthy);
        assert_eq!(health.liveness().status, HealthStatus::Healthy);
    }

    #[tokio::test]
    async fn test_prometheus_scrape_reflects_traffic() {
        let (_store, cache) = setup(CacheConfig::default());
        let exporter = PrometheusExporter::new("tiercache").unwrap();

        cache
            .set("product:1", Bytes::from_static(b"x"), category::PRODUCT)
            .await
            .unwrap();
        cache.get("product:1", category::PRODUCT).await.unwrap();
        let _ = cache.get("product:2", category::PRODUCT).await;

        let text = exporter.scrape(&cache).unwrap();
        assert!(text.contains("tiercache_hits 1"));
        assert!(text.contains("tiercache_misses 1"));
        assert!(text.contains("tiercache_circuit_breaker_state 0"));
        assert!(text.contains("tiercache_fast_tier_entries 1"));
    }
}
