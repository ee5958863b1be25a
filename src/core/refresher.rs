//! Coordinated periodic refresh: at most one rebuild per epoch, fleet-wide
//!
//! Composes [`EpochElection`] with a [`Scheduler`] and an optional version
//! oracle. Each tick, the elected node compares the externally persisted
//! version against the oracle and invokes the rebuild callback only when
//! something actually changed.

use super::clock::EpochClock;
use super::election::EpochElection;
use super::scheduler::Scheduler;
use super::store::{CounterStore, StoreError};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

type RebuildFn = dyn Fn(u64, u64) + Send + Sync;
type VersionFn = dyn Fn() -> u64 + Send + Sync;

struct Shared {
    name: String,
    election: EpochElection,
    store: Arc<dyn CounterStore>,
    rebuild: Arc<RebuildFn>,
    version_oracle: Option<Arc<VersionFn>>,
}

/// Rebuilds a shared resource at most once per interval across a fleet.
///
/// Every node runs one refresher under the same name and store; per epoch,
/// exactly one node wins the election, and only that node considers a
/// rebuild. With a version oracle configured, the rebuild additionally
/// runs only when the oracle's value differs from the last version
/// persisted in the store; without one, the winner rebuilds every epoch.
///
/// # Example
///
/// ```
/// use fleetgate::{CoordinatedRefresher, MemoryStore};
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// let store = Arc::new(MemoryStore::new());
/// let refresher = CoordinatedRefresher::builder(
///     "product-index",
///     Duration::from_secs(300),
///     store,
///     |old, new| {
///         // rebuild the cache for versions (old, new]
///         let _ = (old, new);
///     },
/// )
/// .version_oracle(|| 7)
/// .build();
///
/// refresher.start();
/// refresher.stop();
/// refresher.wait();
/// ```
pub struct CoordinatedRefresher {
    shared: Arc<Shared>,
    scheduler: Scheduler,
}

/// Builder for configuring a [`CoordinatedRefresher`].
pub struct CoordinatedRefresherBuilder {
    name: String,
    interval: Duration,
    store: Arc<dyn CounterStore>,
    rebuild: Arc<RebuildFn>,
    version_oracle: Option<Arc<VersionFn>>,
    clock: EpochClock,
}

impl CoordinatedRefresher {
    /// Create a builder for a refresher named `name`, ticking every
    /// `interval`, coordinating through `store`.
    ///
    /// `rebuild` receives `(old_version, new_version)`; both are zero when
    /// no version oracle is configured.
    pub fn builder<F>(
        name: &str,
        interval: Duration,
        store: Arc<dyn CounterStore>,
        rebuild: F,
    ) -> CoordinatedRefresherBuilder
    where
        F: Fn(u64, u64) + Send + Sync + 'static,
    {
        CoordinatedRefresherBuilder {
            name: name.to_string(),
            interval,
            store,
            rebuild: Arc::new(rebuild),
            version_oracle: None,
            clock: EpochClock::default(),
        }
    }

    /// Start the background tick loop. Returns `false` if already running.
    pub fn start(&self) -> bool {
        self.scheduler.start()
    }

    /// Signal the tick loop to exit; non-blocking.
    pub fn stop(&self) {
        self.scheduler.stop()
    }

    /// Block until the tick loop has exited.
    pub fn wait(&self) {
        self.scheduler.wait()
    }

    /// Run one refresh round at the current wall-clock time.
    pub fn tick(&self) -> Result<bool, StoreError> {
        self.tick_at(SystemTime::now())
    }

    /// Run one refresh round as of `now`. Returns `Ok(true)` when the
    /// rebuild callback was invoked.
    ///
    /// Losing the election is silent. On a won epoch the persisted
    /// version is read (absent reads as 0), the oracle is consulted, and
    /// on a difference the rebuild runs before the new version is
    /// persisted — a rebuild that aborts is retried by a later epoch
    /// rather than recorded as done.
    pub fn tick_at(&self, now: SystemTime) -> Result<bool, StoreError> {
        self.shared.tick_at(now)
    }
}

impl Shared {
    fn version_key(&self) -> String {
        format!("_VERSION_{}", self.name)
    }

    fn tick_at(&self, now: SystemTime) -> Result<bool, StoreError> {
        if !self.election.try_acquire_at(now)? {
            return Ok(false);
        }

        let (old_version, new_version) = match &self.version_oracle {
            Some(oracle) => {
                let key = self.version_key();
                let old = self.store.get(&key, now)?.unwrap_or(0) as u64;
                let new = oracle();
                if new == old {
                    tracing::debug!(name = %self.name, version = new, "version unchanged, skipping rebuild");
                    return Ok(false);
                }
                (old, new)
            }
            None => (0, 0),
        };

        (self.rebuild)(old_version, new_version);

        if self.version_oracle.is_some() {
            self.store.set(&self.version_key(), new_version as i64, now)?;
        }
        tracing::info!(
            name = %self.name,
            old_version,
            new_version,
            "rebuild completed"
        );
        Ok(true)
    }
}

impl CoordinatedRefresherBuilder {
    /// Supply the current-version oracle; rebuilds then run only when its
    /// value differs from the version persisted in the store.
    pub fn version_oracle<F>(mut self, oracle: F) -> Self
    where
        F: Fn() -> u64 + Send + Sync + 'static,
    {
        self.version_oracle = Some(Arc::new(oracle));
        self
    }

    /// Override the epoch clock (start-of-time constant).
    pub fn clock(mut self, clock: EpochClock) -> Self {
        self.clock = clock;
        self
    }

    /// Build the refresher and wire its scheduler.
    pub fn build(self) -> CoordinatedRefresher {
        let shared = Arc::new(Shared {
            name: self.name.clone(),
            election: EpochElection::with_clock(
                &self.name,
                self.interval,
                self.store.clone(),
                self.clock,
            ),
            store: self.store,
            rebuild: self.rebuild,
            version_oracle: self.version_oracle,
        });

        // A store outage during a scheduled tick is logged and retried on
        // the next tick; it must not kill the loop.
        let tick_target = shared.clone();
        let scheduler = Scheduler::new(self.interval, move || {
            if let Err(err) = tick_target.tick_at(SystemTime::now()) {
                tracing::warn!(name = %tick_target.name, error = %err, "refresh tick failed");
            }
        });

        CoordinatedRefresher { shared, scheduler }
    }
}
