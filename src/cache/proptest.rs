//! Property-Based Tests for the cache building blocks
//!
//! # Test Properties
//!
//! 1. **Hit Rate**: hits / (hits + misses) × 100, 0 when idle
//! 2. **Breaker Threshold**: opens on exactly the N-th consecutive failure
//! 3. **Glob Matching**: literals match themselves, `prefix*` matches any suffix
//! 4. **Duration Parsing**: `N<unit>` parses to the expected duration
//! 5. **TTL Lookup**: unknown categories fall back to the default

#![cfg(test)]

use std::time::Duration;

use proptest::prelude::*;

use super::breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
use super::metrics::CacheMetrics;
use super::policy::{TtlPolicy, DEFAULT_TTL};
use crate::config::parse_duration;
use crate::store::glob_match;

// =============================================================================
// Property Strategies
// =============================================================================

/// Keys without glob metacharacters
fn literal_key_strategy() -> impl Strategy<Value = String> {
    "[a-z0-9:_-]{0,24}"
}

// =============================================================================
// Metrics Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    #[test]
    fn prop_hit_rate_formula(hits in 0u64..500, misses in 0u64..500) {
        let metrics = CacheMetrics::new();
        for _ in 0..hits {
            metrics.record_hit();
        }
        for _ in 0..misses {
            metrics.record_miss();
        }

        let rate = metrics.hit_rate();
        if hits + misses == 0 {
            prop_assert_eq!(rate, 0.0);
        } else {
            let expected = hits as f64 / (hits + misses) as f64 * 100.0;
            prop_assert!((rate - expected).abs() < 1e-9);
            prop_assert!((0.0..=100.0).contains(&rate));
        }
    }
}

// =============================================================================
// Circuit Breaker Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(50))]

    #[test]
    fn prop_breaker_opens_at_threshold(threshold in 1u32..20) {
        let breaker = CircuitBreaker::new(
            "prop",
            CircuitBreakerConfig {
                failure_threshold: threshold,
                reset_timeout: Duration::from_secs(60),
                half_open_success_threshold: 2,
            },
        );

        for _ in 0..threshold - 1 {
            breaker.record_result(false);
            prop_assert_eq!(breaker.state(), CircuitState::Closed);
        }

        breaker.record_result(false);
        prop_assert_eq!(breaker.state(), CircuitState::Open);
        prop_assert!(!breaker.allow_request());
    }

    #[test]
    fn prop_success_resets_failure_streak(threshold in 2u32..20, failures in 1u32..20) {
        let breaker = CircuitBreaker::new(
            "prop",
            CircuitBreakerConfig {
                failure_threshold: threshold,
                ..Default::default()
            },
        );

        let failures = failures.min(threshold - 1);
        for _ in 0..failures {
            breaker.record_result(false);
        }
        breaker.record_result(true);
        for _ in 0..threshold - 1 {
            breaker.record_result(false);
        }

        prop_assert_eq!(breaker.state(), CircuitState::Closed);
    }
}

// =============================================================================
// Pattern Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn prop_literal_matches_itself(key in literal_key_strategy()) {
        prop_assert!(glob_match(&key, &key));
    }

    #[test]
    fn prop_prefix_star_matches_any_suffix(
        prefix in literal_key_strategy(),
        suffix in ".{0,24}",
    ) {
        let pattern = format!("{}*", prefix);
        let key = format!("{}{}", prefix, suffix);
        prop_assert!(glob_match(&pattern, &key));
    }

    #[test]
    fn prop_star_matches_everything(key in ".{0,32}") {
        prop_assert!(glob_match("*", &key));
    }
}

// =============================================================================
// Duration Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    #[test]
    fn prop_parse_duration_units(n in 1u64..100_000) {
        prop_assert_eq!(parse_duration(&format!("{}s", n)).ok(), Some(Duration::from_secs(n)));
        prop_assert_eq!(parse_duration(&format!("{}m", n)).ok(), Some(Duration::from_secs(n * 60)));
        prop_assert_eq!(parse_duration(&format!("{}ms", n)).ok(), Some(Duration::from_millis(n)));
    }

    #[test]
    fn prop_unknown_category_uses_default(category in "zz[a-z]{1,12}") {
        let policy = TtlPolicy::new();
        prop_assert_eq!(policy.ttl(&category), DEFAULT_TTL);
    }
}
