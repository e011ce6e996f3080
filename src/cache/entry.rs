//! Cache Entry Types
//!
//! Fast-tier entries carry their value and an absolute expiry deadline.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use bytes::Bytes;

/// Current wall-clock time in nanoseconds since the Unix epoch
#[inline]
pub(crate) fn now_nanos() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as i64
}

/// Fast-tier cache entry
#[derive(Clone, Debug)]
pub struct CacheEntry {
    /// Cached bytes (zero-copy clone)
    value: Bytes,
    /// Absolute expiry in nanoseconds since epoch (0 = never expires)
    expires_at_nanos: i64,
}

impl CacheEntry {
    /// Create an entry that expires after `ttl` (zero = never)
    pub fn new(value: Bytes, ttl: Duration) -> Self {
        let expires_at_nanos = if ttl.is_zero() {
            0
        } else {
            now_nanos().saturating_add(ttl.as_nanos().min(i64::MAX as u128) as i64)
        };
        Self {
            value,
            expires_at_nanos,
        }
    }

    /// Create an entry that never expires
    pub fn permanent(value: Bytes) -> Self {
        Self::new(value, Duration::ZERO)
    }

    /// Get the value (zero-copy)
    #[inline]
    pub fn value(&self) -> &Bytes {
        &self.value
    }

    /// Expiry deadline (0 = never)
    #[inline]
    pub fn expires_at_nanos(&self) -> i64 {
        self.expires_at_nanos
    }

    /// Check if the entry has expired as of `now`
    #[inline]
    pub fn is_expired_at(&self, now: i64) -> bool {
        self.expires_at_nanos != 0 && now > self.expires_at_nanos
    }

    /// Check if the entry has expired
    #[inline]
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(now_nanos())
    }

    /// Get value size in bytes
    #[inline]
    pub fn size(&self) -> usize {
        self.value.len()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_ttl_never_expires() {
        let entry = CacheEntry::new(Bytes::from_static(b"data"), Duration::ZERO);
        assert_eq!(entry.expires_at_nanos(), 0);
        assert!(!entry.is_expired_at(i64::MAX));
    }

    #[test]
    fn test_entry_expiry() {
        let entry = CacheEntry::new(Bytes::from_static(b"data"), Duration::from_secs(60));
        let deadline = entry.expires_at_nanos();

        assert!(!entry.is_expired());
        assert!(!entry.is_expired_at(deadline));
        assert!(entry.is_expired_at(deadline + 1));
    }

    #[test]
    fn test_entry_value() {
        let entry = CacheEntry::permanent(Bytes::from_static(b"Hello, World!"));
        assert_eq!(entry.value().as_ref(), b"Hello, World!");
        assert_eq!(entry.size(), 13);
    }

    #[test]
    fn test_huge_ttl_saturates() {
        let entry = CacheEntry::new(Bytes::new(), Duration::from_secs(u64::MAX));
        assert_eq!(entry.expires_at_nanos(), i64::MAX);
        assert!(!entry.is_expired());
    }
}
