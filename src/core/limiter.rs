//! Approximate sliding-window rate limiter
//!
//! The window is divided into a fixed number of sub-buckets; each check
//! increments the current bucket and sums the surviving history. The
//! approximation error is bounded by one bucket width (one tenth of the
//! span at the default bucket count) in exchange for O(buckets) storage
//! per key and nothing beyond atomic increment + batch read from the
//! backend.

use super::clock::EpochClock;
use super::store::{CounterStore, MemoryStore, RingStore, StoreError};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

/// Sub-buckets per span unless overridden at construction.
pub const DEFAULT_BUCKETS: usize = 10;

/// Approximate sliding-window rate limiter over a [`CounterStore`].
///
/// Immutable after construction; checks on distinct limiter instances
/// never contend with each other. With a shared backend the quota applies
/// fleet-wide per key; with the local ring backend each node counts only
/// its own traffic.
///
/// Every check records one hit for its key, whether or not the call is
/// allowed.
///
/// # Example
///
/// ```
/// use fleetgate::SlidingWindowLimiter;
/// use std::time::Duration;
///
/// // At most 10 hits per rolling 200ms, counted on this node only.
/// let limiter = SlidingWindowLimiter::local("login", Duration::from_millis(200), 10);
/// assert!(limiter.check("user:42").unwrap());
/// ```
pub struct SlidingWindowLimiter {
    prefix: String,
    span: Duration,
    quota: i64,
    buckets: usize,
    store: Arc<dyn CounterStore>,
    clock: EpochClock,
}

/// Builder for configuring a [`SlidingWindowLimiter`].
///
/// # Example
///
/// ```
/// use fleetgate::{MemoryStore, SlidingWindowLimiter};
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// let store = Arc::new(MemoryStore::new());
/// let limiter = SlidingWindowLimiter::builder("api", Duration::from_secs(60), 1000)
///     .store(store)
///     .buckets(20)
///     .build();
/// ```
pub struct SlidingWindowLimiterBuilder {
    name: String,
    span: Duration,
    quota: i64,
    buckets: usize,
    store: Option<Arc<dyn CounterStore>>,
    local: bool,
    clock: EpochClock,
}

impl SlidingWindowLimiter {
    /// Create a builder for a limiter named `name` allowing `quota` hits
    /// per rolling `span`.
    pub fn builder(name: &str, span: Duration, quota: i64) -> SlidingWindowLimiterBuilder {
        SlidingWindowLimiterBuilder {
            name: name.to_string(),
            span,
            quota,
            buckets: DEFAULT_BUCKETS,
            store: None,
            local: false,
            clock: EpochClock::default(),
        }
    }

    /// Limiter backed by an explicit shared store: the quota is enforced
    /// across every node using the same store and name.
    pub fn shared(name: &str, span: Duration, quota: i64, store: Arc<dyn CounterStore>) -> Self {
        Self::builder(name, span, quota).store(store).build()
    }

    /// Limiter backed by an in-process ring buffer: zero network cost, no
    /// cross-node visibility.
    pub fn local(name: &str, span: Duration, quota: i64) -> Self {
        Self::builder(name, span, quota).local().build()
    }

    /// Check one hit for `key` at the current wall-clock time.
    pub fn check(&self, key: &str) -> Result<bool, StoreError> {
        self.check_at(key, SystemTime::now())
    }

    /// Check one hit for `key` as of `now`.
    ///
    /// The hit is recorded in the bucket containing `now` before the
    /// history is read, so a request is always counted in its own sum.
    /// Returns `Ok(true)` while the rolling sum stays within quota;
    /// `Ok(false)` is not an error, just a decision, accompanied by a
    /// structured warning. Backend failures surface as [`StoreError`].
    pub fn check_at(&self, key: &str, now: SystemTime) -> Result<bool, StoreError> {
        let width = self.bucket_width();
        let tag = self.clock.bucket_index(now, width);

        let current_key = self.bucket_key(key, tag);
        let mut observed = self.store.increment(&current_key, now)?;
        if observed == 1 {
            // First write of this bucket: bound its lifetime to the last
            // instant it can still contribute to a live window.
            self.store.set_expiry(&current_key, self.bucket_ttl(), now)?;
        }

        let history: Vec<String> = (1..self.buckets as i64)
            .map(|i| self.bucket_key(key, tag - i))
            .collect();
        for count in self.store.multi_get(&history, now)? {
            observed += count.unwrap_or(0);
        }

        if observed <= self.quota {
            Ok(true)
        } else {
            tracing::warn!(
                prefix = %self.prefix,
                key,
                bucket = tag,
                observed,
                quota = self.quota,
                "rate limit exceeded"
            );
            Ok(false)
        }
    }

    /// The configured rolling window span.
    pub fn span(&self) -> Duration {
        self.span
    }

    /// The configured quota per span.
    pub fn quota(&self) -> i64 {
        self.quota
    }

    fn bucket_width(&self) -> Duration {
        Duration::from_millis(((self.span.as_millis() as u64) / self.buckets as u64).max(1))
    }

    fn bucket_ttl(&self) -> Duration {
        // ceil(span_ms / 1000) seconds, at least one second.
        Duration::from_secs((self.span.as_millis() as u64).div_ceil(1000).max(1))
    }

    fn bucket_key(&self, key: &str, tag: i64) -> String {
        format!("{}{}_{}", self.prefix, key, tag)
    }
}

impl SlidingWindowLimiterBuilder {
    /// Use an explicit shared store handle.
    pub fn store(mut self, store: Arc<dyn CounterStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Use an in-process ring buffer sized to the bucket count.
    pub fn local(mut self) -> Self {
        self.local = true;
        self
    }

    /// Override the number of sub-buckets the span is divided into.
    ///
    /// More buckets give a finer approximation at the cost of one extra
    /// key read per check per bucket. Clamped to at least 1.
    pub fn buckets(mut self, buckets: usize) -> Self {
        self.buckets = buckets.max(1);
        self
    }

    /// Override the epoch clock (start-of-time constant).
    pub fn clock(mut self, clock: EpochClock) -> Self {
        self.clock = clock;
        self
    }

    /// Build the limiter.
    ///
    /// Without an explicit store, a local builder gets its own
    /// [`RingStore`]; otherwise the process-default [`MemoryStore`] is
    /// used, mirroring the "default connection pool" fallback of the
    /// shared backend.
    pub fn build(self) -> SlidingWindowLimiter {
        let store = match (self.store, self.local) {
            (Some(store), _) => store,
            (None, true) => Arc::new(RingStore::new(self.buckets)) as Arc<dyn CounterStore>,
            (None, false) => MemoryStore::global(),
        };
        SlidingWindowLimiter {
            prefix: format!("_LIMIT_{}_", self.name),
            span: self.span,
            quota: self.quota,
            buckets: self.buckets,
            store,
            clock: self.clock,
        }
    }
}
