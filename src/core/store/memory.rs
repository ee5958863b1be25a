use super::{CounterStore, StoreError};
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

#[cfg(feature = "ahash")]
use ahash::AHashMap as HashMap;
#[cfg(not(feature = "ahash"))]
use std::collections::HashMap;

// Configuration constants
const DEFAULT_CAPACITY: usize = 1000;
const DEFAULT_CLEANUP_INTERVAL_SECS: u64 = 60;

static GLOBAL: Lazy<Arc<MemoryStore>> = Lazy::new(|| Arc::new(MemoryStore::new()));

struct Entry {
    value: i64,
    expires_at: Option<SystemTime>,
}

impl Entry {
    fn is_expired(&self, now: SystemTime) -> bool {
        matches!(self.expires_at, Some(exp) if exp <= now)
    }
}

struct Inner {
    data: HashMap<String, Entry>,
    next_cleanup: SystemTime,
}

/// In-process implementation of the shared counter store.
///
/// Behaves like a single-node atomic counter service: increments are
/// linearizable per key, TTLs arm absolute expiry times, and expired
/// entries read as absent. One instance shared across limiters, elections,
/// and refreshers gives the same semantics the fleet would get from an
/// external store, which makes it both the process-default backend and the
/// deterministic test double for multi-node scenarios.
///
/// Expired entries are swept from memory at most once per cleanup interval,
/// on write paths; reads only mask them.
///
/// # Example
///
/// ```
/// use fleetgate::MemoryStore;
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// let store = Arc::new(
///     MemoryStore::builder()
///         .capacity(100_000)
///         .cleanup_interval(Duration::from_secs(300))
///         .build(),
/// );
/// ```
pub struct MemoryStore {
    inner: Mutex<Inner>,
    cleanup_interval: Duration,
}

/// Builder for configuring a [`MemoryStore`].
pub struct MemoryStoreBuilder {
    capacity: usize,
    cleanup_interval: Duration,
}

impl MemoryStore {
    /// Create a store with default capacity and cleanup interval.
    pub fn new() -> Self {
        Self::with_config(
            DEFAULT_CAPACITY,
            Duration::from_secs(DEFAULT_CLEANUP_INTERVAL_SECS),
        )
    }

    /// Create a new builder for configuring a [`MemoryStore`].
    pub fn builder() -> MemoryStoreBuilder {
        MemoryStoreBuilder {
            capacity: DEFAULT_CAPACITY,
            cleanup_interval: Duration::from_secs(DEFAULT_CLEANUP_INTERVAL_SECS),
        }
    }

    /// The process-default store, used by components built without an
    /// explicit backend handle.
    pub fn global() -> Arc<MemoryStore> {
        GLOBAL.clone()
    }

    fn with_config(capacity: usize, cleanup_interval: Duration) -> Self {
        MemoryStore {
            inner: Mutex::new(Inner {
                data: HashMap::with_capacity(capacity),
                next_cleanup: SystemTime::now() + cleanup_interval,
            }),
            cleanup_interval,
        }
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.inner.lock().data.len()
    }

    fn maybe_clean_expired(inner: &mut Inner, interval: Duration, now: SystemTime) {
        if now >= inner.next_cleanup {
            inner.data.retain(|_, entry| !entry.is_expired(now));
            inner.next_cleanup = now + interval;
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CounterStore for MemoryStore {
    fn increment(&self, key: &str, now: SystemTime) -> Result<i64, StoreError> {
        let mut inner = self.inner.lock();
        Self::maybe_clean_expired(&mut inner, self.cleanup_interval, now);

        if let Some(entry) = inner.data.get_mut(key) {
            if !entry.is_expired(now) {
                entry.value += 1;
                return Ok(entry.value);
            }
        }

        // Absent or expired: the increment restarts from zero.
        inner.data.insert(
            key.to_string(),
            Entry {
                value: 1,
                expires_at: None,
            },
        );
        Ok(1)
    }

    fn set_expiry(&self, key: &str, ttl: Duration, now: SystemTime) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        if let Some(entry) = inner.data.get_mut(key) {
            if !entry.is_expired(now) {
                entry.expires_at = Some(now + ttl);
            }
        }
        Ok(())
    }

    fn get(&self, key: &str, now: SystemTime) -> Result<Option<i64>, StoreError> {
        let inner = self.inner.lock();
        match inner.data.get(key) {
            Some(entry) if !entry.is_expired(now) => Ok(Some(entry.value)),
            _ => Ok(None),
        }
    }

    fn multi_get(
        &self,
        keys: &[String],
        now: SystemTime,
    ) -> Result<Vec<Option<i64>>, StoreError> {
        let inner = self.inner.lock();
        Ok(keys
            .iter()
            .map(|key| match inner.data.get(key.as_str()) {
                Some(entry) if !entry.is_expired(now) => Some(entry.value),
                _ => None,
            })
            .collect())
    }

    fn set(&self, key: &str, value: i64, now: SystemTime) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        Self::maybe_clean_expired(&mut inner, self.cleanup_interval, now);
        inner.data.insert(
            key.to_string(),
            Entry {
                value,
                expires_at: None,
            },
        );
        Ok(())
    }
}

impl MemoryStoreBuilder {
    /// Set the expected number of live keys.
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Set how often expired entries are swept from memory.
    pub fn cleanup_interval(mut self, interval: Duration) -> Self {
        self.cleanup_interval = interval;
        self
    }

    /// Build the store with the configured settings.
    pub fn build(self) -> MemoryStore {
        MemoryStore::with_config(self.capacity, self.cleanup_interval)
    }
}
