//! Epoch-scoped leader election over a shared atomic counter
//!
//! One external key exists per `(name, epoch)`; the first node whose
//! atomic increment returns 1 is that epoch's leader. There is no renewal
//! and no release: leadership simply lapses when the epoch does, and the
//! key expires with it.

use super::clock::EpochClock;
use super::store::{CounterStore, StoreError};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

/// Elects at most one leader per fixed time period across every node
/// sharing the same store and name.
///
/// The guarantee rests entirely on the store's increment being atomic and
/// linearizable per key. Losers get no signal beyond `false`; no leader
/// identity is recorded anywhere.
///
/// # Example
///
/// ```
/// use fleetgate::{EpochElection, MemoryStore};
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// let store = Arc::new(MemoryStore::new());
/// let election = EpochElection::new("cache-rebuild", Duration::from_secs(60), store);
/// if election.try_acquire().unwrap() {
///     // this node acts for the fleet this minute
/// }
/// ```
pub struct EpochElection {
    name: String,
    period: Duration,
    store: Arc<dyn CounterStore>,
    clock: EpochClock,
}

impl EpochElection {
    /// Create an election scoped to `name`, with one leadership grant per
    /// `period`, coordinated through `store`.
    ///
    /// The store must be shared by every contending node; a node-local
    /// backend would elect every node.
    pub fn new(name: &str, period: Duration, store: Arc<dyn CounterStore>) -> Self {
        Self::with_clock(name, period, store, EpochClock::default())
    }

    /// Same as [`new`](Self::new) with an explicit epoch clock.
    pub fn with_clock(
        name: &str,
        period: Duration,
        store: Arc<dyn CounterStore>,
        clock: EpochClock,
    ) -> Self {
        EpochElection {
            name: name.to_string(),
            period,
            store,
            clock,
        }
    }

    /// Attempt to become the current epoch's leader.
    pub fn try_acquire(&self) -> Result<bool, StoreError> {
        self.try_acquire_at(SystemTime::now())
    }

    /// Attempt to become the leader of the epoch containing `now`.
    ///
    /// The winner arms the epoch key's expiry so it vanishes once the
    /// epoch can no longer be contended.
    pub fn try_acquire_at(&self, now: SystemTime) -> Result<bool, StoreError> {
        let epoch = self.clock.bucket_index(now, self.period);
        let key = format!("_COORD_{}_{}", self.name, epoch);

        if self.store.increment(&key, now)? != 1 {
            // Someone in the fleet got here first this epoch.
            return Ok(false);
        }

        let ttl = Duration::from_secs(self.period.as_secs().max(1));
        self.store.set_expiry(&key, ttl, now)?;
        Ok(true)
    }

    /// The election's name, as embedded in its coordination keys.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The epoch length.
    pub fn period(&self) -> Duration {
        self.period
    }
}
