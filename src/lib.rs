//! # fleetgate
//!
//! Epoch-bucketed rate limiting and coordination primitives for fleets of
//! stateless nodes sharing one atomic counter store.
//!
//! ## Overview
//!
//! Everything here is built on one idea: divide wall-clock time into fixed
//! epochs with a shared start-of-time constant, and keep bounded counters
//! keyed by epoch in a store that only needs atomic increment, best-effort
//! expiry, and batch reads. On top of that, the crate provides:
//!
//! - [`SlidingWindowLimiter`] — "is this key still within quota for its
//!   rolling window?", approximated with sub-bucket counting
//! - [`EpochElection`] — "am I the one node allowed to act this epoch?"
//! - [`Scheduler`] — a background loop with bounded shutdown latency
//! - [`CoordinatedRefresher`] — "rebuild the shared cache at most once per
//!   epoch, only when the version changed, only on the elected node"
//!
//! ## Quick Start
//!
//! ```
//! use fleetgate::SlidingWindowLimiter;
//! use std::time::Duration;
//!
//! // Allow each key 100 hits per rolling minute, counted on this node.
//! let limiter = SlidingWindowLimiter::local("api", Duration::from_secs(60), 100);
//!
//! if limiter.check("user:123").unwrap() {
//!     // handle the request
//! } else {
//!     // reject: over quota
//! }
//! ```
//!
//! ## Backends
//!
//! Both the limiter and the coordination primitives run against the
//! [`CounterStore`] trait:
//!
//! - [`MemoryStore`] — in-process shared store with atomic increments and
//!   TTL expiry. One instance shared across components behaves like an
//!   external counter service, which also makes multi-node scenarios
//!   deterministic under test.
//! - [`RingStore`] — node-local fixed ring of bucket slots; zero network
//!   cost, no cross-node visibility. Limiter-only.
//!
//! A remote store (e.g. a redis-like service) plugs in by implementing
//! [`CounterStore`]; connection management is deliberately out of scope.
//!
//! ## Fleet coordination
//!
//! ```
//! use fleetgate::{CoordinatedRefresher, MemoryStore};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let store = Arc::new(MemoryStore::new());
//!
//! // Every node runs this; per 5-minute epoch, exactly one node whose
//! // version oracle reports a change rebuilds the cache.
//! let refresher = CoordinatedRefresher::builder(
//!     "catalog",
//!     Duration::from_secs(300),
//!     store,
//!     |old, new| println!("rebuilding catalog {old} -> {new}"),
//! )
//! .version_oracle(|| 42)
//! .build();
//!
//! refresher.start();
//! // ...
//! refresher.stop();
//! refresher.wait();
//! ```
//!
//! ## Approximation and guarantees
//!
//! The limiter divides each span into a fixed number of sub-buckets
//! (default 10) and sums the live buckets per check: worst-case error is
//! one bucket width, storage is O(buckets) per active key, and no
//! coordination is needed beyond atomic increment and batch read. Leader
//! election grants at most one `true` per epoch among all callers sharing
//! a store and name, resting entirely on the store's increment atomicity.
//! Epoch alignment requires every node in the fleet to use the same
//! [`EpochClock`] start constant.
//!
//! ## Logging
//!
//! The crate emits [`tracing`] events (quota rejections at `warn`,
//! scheduler lifecycle at `debug`, isolated callback panics at `error`)
//! and never installs a subscriber.
//!
//! ## Features
//!
//! - `ahash` (default): faster hashing for the in-memory store

pub mod core;

pub use crate::core::{
    CoordinatedRefresher, CoordinatedRefresherBuilder, CounterStore, EpochClock, EpochElection,
    MemoryStore, MemoryStoreBuilder, RingStore, Scheduler, SlidingWindowLimiter,
    SlidingWindowLimiterBuilder, StoreError, DEFAULT_BUCKETS, DEFAULT_EPOCH_START_MS,
};
