//! TTL Policy
//!
//! Maps logical data categories to time-to-live values. The table is filled at
//! configuration time and read concurrently afterwards; `set_ttl` exists for
//! operator overrides.

use std::collections::HashMap;
use std::time::Duration;

use parking_lot::RwLock;

/// Well-known data categories
pub mod category {
    /// Single product lookups
    pub const PRODUCT: &str = "product";
    /// Paginated product listings
    pub const PRODUCT_LIST: &str = "product_list";
    /// Stock levels (change often)
    pub const INVENTORY: &str = "inventory";
    /// User profile lookups
    pub const USER: &str = "user";
    /// Session-scoped data
    pub const SESSION: &str = "session";
    /// Long-lived reference data (categories, brands, tax tables)
    pub const REFERENCE: &str = "reference";
}

/// Default TTL for unknown categories (5 minutes)
pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

/// TTL policy configuration
#[derive(Debug, Clone)]
pub struct TtlPolicyConfig {
    /// TTL for categories without an entry
    pub default_ttl: Duration,
    /// Per-category TTLs
    pub categories: HashMap<String, Duration>,
}

impl Default for TtlPolicyConfig {
    fn default() -> Self {
        let categories = [
            (category::PRODUCT, Duration::from_secs(600)),
            (category::PRODUCT_LIST, Duration::from_secs(120)),
            (category::INVENTORY, Duration::from_secs(60)),
            (category::USER, Duration::from_secs(900)),
            (category::SESSION, Duration::from_secs(1800)),
            (category::REFERENCE, Duration::from_secs(3600)),
        ]
        .into_iter()
        .map(|(name, ttl)| (name.to_string(), ttl))
        .collect();

        Self {
            default_ttl: DEFAULT_TTL,
            categories,
        }
    }
}

/// Category → TTL lookup
#[derive(Debug)]
pub struct TtlPolicy {
    default_ttl: Duration,
    table: RwLock<HashMap<String, Duration>>,
}

impl TtlPolicy {
    /// Create a policy with the built-in category table
    pub fn new() -> Self {
        Self::with_config(TtlPolicyConfig::default())
    }

    /// Create a policy from configuration
    pub fn with_config(config: TtlPolicyConfig) -> Self {
        Self {
            default_ttl: config.default_ttl,
            table: RwLock::new(config.categories),
        }
    }

    /// TTL for a category, falling back to the default
    pub fn ttl(&self, category: &str) -> Duration {
        self.table
            .read()
            .get(category)
            .copied()
            .unwrap_or(self.default_ttl)
    }

    /// Override the TTL for a category
    pub fn set_ttl(&self, category: impl Into<String>, ttl: Duration) {
        self.table.write().insert(category.into(), ttl);
    }

    /// The fallback TTL
    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Copy of the current table
    pub fn categories(&self) -> HashMap<String, Duration> {
        self.table.read().clone()
    }
}

impl Default for TtlPolicy {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Tests
// =============================================================================
