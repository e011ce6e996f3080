//! Configuration file support
//!
//! Settings are read from YAML (or JSON, by extension) with human-readable
//! durations and converted into the runtime config structs:
//!
//! ```yaml
//! fast_tier:
//!   sweep_interval: 5m
//!   max_ttl: 30s
//! circuit_breaker:
//!   failure_threshold: 5
//!   reset_timeout: 30s
//!   half_open_success_threshold: 2
//! ttl:
//!   default: 5m
//!   categories:
//!     product: 10m
//!     reference: never
//! warmup:
//!   enabled: true
//!   concurrency: 10
//!   keys:
//!     reference: ["reference:brands", "reference:tax"]
//! remote:
//!   url: redis://localhost:6379
//!   command_timeout: 2s
//! ```

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cache::{
    CacheConfig, CircuitBreakerConfig, FastTierConfig, TtlPolicyConfig, WarmupConfig,
};
use crate::error::{Error, Result};

/// TTL value meaning "never expires"
const NEVER: &str = "never";

/// Parse a duration string like "30s", "5m", "1h30m", "250ms" or "1d"
///
/// A trailing bare number is taken as seconds. Zero is rejected.
pub fn parse_duration(s: &str) -> Result<Duration> {
    let s = s.trim();
    if s.is_empty() {
        return Err(Error::DurationParse("empty duration string".to_string()));
    }

    let mut total_ms: u64 = 0;
    let mut num_buf = String::new();
    let mut chars = s.chars().peekable();

    while let Some(c) = chars.next() {
        if c.is_ascii_digit() {
            num_buf.push(c);
            continue;
        }

        let num: u64 = num_buf
            .parse()
            .map_err(|_| Error::DurationParse(format!("invalid number in duration: {}", s)))?;
        num_buf.clear();

        let unit = c.to_ascii_lowercase();
        let millis = unit == 'm' && chars.peek().is_some_and(|n| n.eq_ignore_ascii_case(&'s'));
        if millis {
            chars.next();
        }

        let multiplier_ms = match unit {
            _ if millis => 1,
            'h' => 3_600_000,
            'm' => 60_000,
            's' => 1_000,
            'd' => 86_400_000,
            _ => {
                return Err(Error::DurationParse(format!(
                    "unknown duration unit: {}",
                    c
                )))
            }
        };

        total_ms = num
            .checked_mul(multiplier_ms)
            .and_then(|ms| total_ms.checked_add(ms))
            .ok_or_else(|| Error::DurationParse(format!("duration overflows: {}", s)))?;
    }

    // Handle case where string ends with a number (assume seconds)
    if !num_buf.is_empty() {
        let num: u64 = num_buf
            .parse()
            .map_err(|_| Error::DurationParse(format!("invalid number in duration: {}", s)))?;
        total_ms = num
            .checked_mul(1_000)
            .and_then(|ms| total_ms.checked_add(ms))
            .ok_or_else(|| Error::DurationParse(format!("duration overflows: {}", s)))?;
    }

    if total_ms == 0 {
        return Err(Error::DurationParse(
            "duration must be greater than 0".to_string(),
        ));
    }

    Ok(Duration::from_millis(total_ms))
}

/// Parse a TTL; `never` maps to zero (no expiry)
pub fn parse_ttl(s: &str) -> Result<Duration> {
    if s.trim().eq_ignore_ascii_case(NEVER) {
        Ok(Duration::ZERO)
    } else {
        parse_duration(s)
    }
}

// =============================================================================
// File format
// =============================================================================

/// Top-level settings file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheSettings {
    pub fast_tier: FastTierSettings,
    pub circuit_breaker: CircuitBreakerSettings,
    pub ttl: TtlSettings,
    pub warmup: WarmupSettings,
    pub remote: RemoteSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FastTierSettings {
    pub sweep_interval: String,
    pub max_ttl: String,
}

impl Default for FastTierSettings {
    fn default() -> Self {
        Self {
            sweep_interval: "5m".to_string(),
            max_ttl: "30s".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CircuitBreakerSettings {
    pub failure_threshold: u32,
    pub reset_timeout: String,
    pub half_open_success_threshold: u32,
}

impl Default for CircuitBreakerSettings {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout: "30s".to_string(),
            half_open_success_threshold: 2,
        }
    }
}

/// Category TTLs; entries here are merged over the built-in table
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TtlSettings {
    pub default: String,
    pub categories: HashMap<String, String>,
}

impl Default for TtlSettings {
    fn default() -> Self {
        Self {
            default: "5m".to_string(),
            categories: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WarmupSettings {
    pub enabled: bool,
    pub concurrency: usize,
    pub retry_attempts: u32,
    pub retry_delay: String,
    pub resolve_timeout: String,
    pub keys: HashMap<String, Vec<String>>,
}

impl Default for WarmupSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            concurrency: 10,
            retry_attempts: 3,
            retry_delay: "1s".to_string(),
            resolve_timeout: "10s".to_string(),
            keys: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RemoteSettings {
    /// Remote store URL; the in-memory store is used when absent
    pub url: Option<String>,
    pub command_timeout: String,
}

impl Default for RemoteSettings {
    fn default() -> Self {
        Self {
            url: None,
            command_timeout: "2s".to_string(),
        }
    }
}

impl CacheSettings {
    /// Load from a file; `.json` files are read as JSON, anything else as YAML
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;

        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        if is_json {
            Self::from_json_str(&content)
        } else {
            Self::from_yaml_str(&content)
        }
    }

    pub fn from_yaml_str(content: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    pub fn from_json_str(content: &str) -> Result<Self> {
        serde_json::from_str(content)
            .map_err(|e| Error::Config(format!("invalid JSON settings: {}", e)))
    }

    /// Build the runtime cache configuration
    pub fn cache_config(&self) -> Result<CacheConfig> {
        let fast_tier = FastTierConfig {
            sweep_interval: parse_duration(&self.fast_tier.sweep_interval)?,
            max_ttl: parse_duration(&self.fast_tier.max_ttl)?,
        };

        let cb = &self.circuit_breaker;
        if cb.failure_threshold == 0 {
            return Err(Error::Config(
                "circuit_breaker.failure_threshold must be greater than 0".to_string(),
            ));
        }
        if cb.half_open_success_threshold == 0 {
            return Err(Error::Config(
                "circuit_breaker.half_open_success_threshold must be greater than 0".to_string(),
            ));
        }
        let circuit_breaker = CircuitBreakerConfig {
            failure_threshold: cb.failure_threshold,
            reset_timeout: parse_duration(&cb.reset_timeout)?,
            half_open_success_threshold: cb.half_open_success_threshold,
        };

        let mut ttl = TtlPolicyConfig {
            default_ttl: parse_ttl(&self.ttl.default)?,
            ..Default::default()
        };
        for (category, value) in &self.ttl.categories {
            let parsed = parse_ttl(value)
                .map_err(|e| Error::Config(format!("ttl.categories.{}: {}", category, e)))?;
            ttl.categories.insert(category.clone(), parsed);
        }

        Ok(CacheConfig {
            fast_tier,
            circuit_breaker,
            ttl,
        })
    }

    /// Build the warm-up configuration
    pub fn warmup_config(&self) -> Result<WarmupConfig> {
        let w = &self.warmup;
        if w.concurrency == 0 {
            return Err(Error::Config(
                "warmup.concurrency must be greater than 0".to_string(),
            ));
        }

        Ok(WarmupConfig {
            enabled: w.enabled,
            concurrency: w.concurrency,
            keys: w.keys.clone(),
            retry_attempts: w.retry_attempts,
            retry_delay: parse_duration(&w.retry_delay)?,
            resolve_timeout: parse_duration(&w.resolve_timeout)?,
        })
    }

    /// Per-command timeout for the remote store
    pub fn remote_command_timeout(&self) -> Result<Duration> {
        parse_duration(&self.remote.command_timeout)
    }

    /// Validate every section
    pub fn validate(&self) -> Result<()> {
        self.cache_config()?;
        self.warmup_config()?;
        self.remote_command_timeout()?;
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
