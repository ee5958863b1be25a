//! Core components of the fleetgate coordination library
//!
//! This module contains the fundamental building blocks:
//! - [`clock`]: epoch/bucket index computation
//! - [`store`]: counter store backends (shared and node-local)
//! - [`limiter`]: the sliding-window rate limiter
//! - [`election`]: epoch-scoped leader election
//! - [`scheduler`]: the periodic background loop
//! - [`refresher`]: coordinated at-most-once-per-epoch refresh

pub mod clock;
pub mod election;
pub mod limiter;
pub mod refresher;
pub mod scheduler;
pub mod store;

#[cfg(test)]
mod tests;

pub use clock::{EpochClock, DEFAULT_EPOCH_START_MS};
pub use election::EpochElection;
pub use limiter::{SlidingWindowLimiter, SlidingWindowLimiterBuilder, DEFAULT_BUCKETS};
pub use refresher::{CoordinatedRefresher, CoordinatedRefresherBuilder};
pub use scheduler::Scheduler;
pub use store::{CounterStore, MemoryStore, MemoryStoreBuilder, RingStore, StoreError};
