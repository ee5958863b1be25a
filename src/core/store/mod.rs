use std::time::{Duration, SystemTime};

use thiserror::Error;


mod memory;
mod ring;

pub use memory::{MemoryStore, MemoryStoreBuilder};
pub use ring::RingStore;

/// Errors surfaced by counter store backends.
///
/// Backend failures propagate to the caller of `check`/`try_acquire`; the
/// core never retries and never silently treats a failed read as zero.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backend does not implement this operation
    #[error("operation not supported by this backend: {0}")]
    Unsupported(&'static str),
    /// The counter key does not carry the expected `_<bucket>` suffix
    #[error("malformed counter key: {0}")]
    InvalidKey(String),
    /// The backing service failed (network, protocol, server-side error)
    #[error("backend failure: {0}")]
    Backend(String),
}

/// Minimal atomic counter store consumed by the limiter, the leader
/// election, and the refresher.
///
/// Two families of implementation exist: a shared store visible to the
/// whole fleet ([`MemoryStore`] in-process, or any remote service with
/// atomic increment semantics) and a node-local ring buffer
/// ([`RingStore`]). Every method takes the caller's `now` so that expiry
/// behavior is deterministic under test; remote backends are free to
/// ignore it.
///
/// Correctness of leader election and cross-node counting rests on
/// `increment` being atomic and linearizable per key.
pub trait CounterStore: Send + Sync {
    /// Atomically increment `key` and return the post-increment value.
    ///
    /// Absent keys start from zero, so the first increment returns 1.
    fn increment(&self, key: &str, now: SystemTime) -> Result<i64, StoreError>;

    /// Arm a best-effort TTL on `key`. Called only right after a key's
    /// first write.
    fn set_expiry(&self, key: &str, ttl: Duration, now: SystemTime) -> Result<(), StoreError>;

    /// Read a single value; `None` for absent or expired keys.
    fn get(&self, key: &str, now: SystemTime) -> Result<Option<i64>, StoreError>;

    /// Read a batch of values, position-aligned with `keys`; absent or
    /// expired keys yield `None`.
    fn multi_get(&self, keys: &[String], now: SystemTime)
        -> Result<Vec<Option<i64>>, StoreError>;

    /// Overwrite `key` with `value`, without expiry.
    fn set(&self, key: &str, value: i64, now: SystemTime) -> Result<(), StoreError>;
}
