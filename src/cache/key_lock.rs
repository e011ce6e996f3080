//! Per-key locks for stampede protection
//!
//! Entries are created on demand and carry a count of interested callers
//! (holder plus waiters). Whoever leaves last removes the entry, including a
//! waiter whose `acquire` future is dropped before it gets the lock, so the
//! registry only holds keys that are being resolved.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

#[derive(Debug)]
struct Slot {
    lock: Arc<Mutex<()>>,
    /// Callers holding or waiting for `lock`
    users: usize,
}

/// Concurrent registry of key → mutex
#[derive(Debug, Default)]
pub struct KeyLockRegistry {
    locks: DashMap<String, Slot>,
}

impl KeyLockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `key`
    ///
    /// Cancel-safe: dropping the returned future releases the caller's
    /// interest in the key.
    pub async fn acquire(&self, key: &str) -> KeyLockGuard<'_> {
        // Registered under the shard lock, which is released before awaiting
        let lock = {
            let mut slot = self.locks.entry(key.to_string()).or_insert_with(|| Slot {
                lock: Arc::new(Mutex::new(())),
                users: 0,
            });
            slot.users += 1;
            Arc::clone(&slot.lock)
        };

        let mut guard = KeyLockGuard {
            registry: &self.locks,
            key: key.to_string(),
            held: None,
        };
        guard.held = Some(lock.lock_owned().await);
        guard
    }

    /// Number of keys with a live lock entry
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

/// Holds (or waits for) a key's lock; deregisters on drop
#[derive(Debug)]
pub struct KeyLockGuard<'a> {
    registry: &'a DashMap<String, Slot>,
    key: String,
    held: Option<OwnedMutexGuard<()>>,
}

impl Drop for KeyLockGuard<'_> {
    fn drop(&mut self) {
        self.held.take();
        if let Entry::Occupied(mut entry) = self.registry.entry(std::mem::take(&mut self.key)) {
            entry.get_mut().users -= 1;
            if entry.get().users == 0 {
                entry.remove();
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
