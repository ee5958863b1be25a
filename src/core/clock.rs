//! Epoch clock: maps wall-clock time onto integer bucket indices
//!
//! Every component in this crate derives its time buckets from an
//! [`EpochClock`], so a fleet of nodes that shares one start-of-time
//! constant agrees on bucket boundaries without any coordination.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Default start-of-time constant: 2020-01-01 00:00:00 UTC+8, in
/// milliseconds since the Unix epoch.
pub const DEFAULT_EPOCH_START_MS: i64 = 1_577_808_000_000;

/// Translates wall-clock time into monotonically increasing bucket indices.
///
/// The clock is a plain value injected into each component at construction.
/// All nodes in a fleet must use the same start constant for shared-store
/// bucket alignment and leader election to be meaningful. Changing the
/// start after counters exist invalidates bucket alignment; nothing guards
/// against that.
///
/// # Example
///
/// ```
/// use fleetgate::EpochClock;
/// use std::time::{Duration, SystemTime};
///
/// let clock = EpochClock::default();
/// let bucket = clock.bucket_index(SystemTime::now(), Duration::from_millis(20));
/// assert!(bucket > 0);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EpochClock {
    start_ms: i64,
}

impl EpochClock {
    /// Create a clock with a custom start-of-time constant (milliseconds
    /// since the Unix epoch).
    pub fn new(start_ms: i64) -> Self {
        EpochClock { start_ms }
    }

    /// The configured start-of-time constant in milliseconds.
    pub fn start_ms(&self) -> i64 {
        self.start_ms
    }

    /// Milliseconds elapsed from the Unix epoch to `now`.
    ///
    /// Times before the Unix epoch saturate to 0.
    pub fn now_ms(now: SystemTime) -> i64 {
        now.duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0)
    }

    /// The index of the fixed-width bucket containing `now`.
    ///
    /// Computed as `floor((now_ms - start_ms) / width_ms)`, with the width
    /// clamped to at least one millisecond. All arithmetic is in
    /// milliseconds; indices from a `now` before the start constant are
    /// negative but still well-ordered.
    pub fn bucket_index(&self, now: SystemTime, width: Duration) -> i64 {
        let width_ms = (width.as_millis() as i64).max(1);
        let elapsed_ms = Self::now_ms(now) - self.start_ms;
        elapsed_ms.div_euclid(width_ms)
    }
}

impl Default for EpochClock {
    fn default() -> Self {
        EpochClock {
            start_ms: DEFAULT_EPOCH_START_MS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at_ms(ms: u64) -> SystemTime {
        UNIX_EPOCH + Duration::from_millis(ms)
    }

    #[test]
    fn test_bucket_index_advances_with_time() {
        let clock = EpochClock::new(0);
        let width = Duration::from_millis(20);

        assert_eq!(clock.bucket_index(at_ms(0), width), 0);
        assert_eq!(clock.bucket_index(at_ms(19), width), 0);
        assert_eq!(clock.bucket_index(at_ms(20), width), 1);
        assert_eq!(clock.bucket_index(at_ms(205), width), 10);
    }

    #[test]
    fn test_bucket_index_respects_start_constant() {
        let clock = EpochClock::new(1_000);
        let width = Duration::from_millis(100);

        assert_eq!(clock.bucket_index(at_ms(1_000), width), 0);
        assert_eq!(clock.bucket_index(at_ms(1_099), width), 0);
        assert_eq!(clock.bucket_index(at_ms(1_100), width), 1);
    }

    #[test]
    fn test_future_start_yields_negative_indices() {
        let clock = EpochClock::new(10_000);
        let width = Duration::from_millis(100);

        // Still floor division: ordering holds across the sign change.
        assert_eq!(clock.bucket_index(at_ms(9_950), width), -1);
        assert_eq!(clock.bucket_index(at_ms(9_899), width), -2);
        assert_eq!(clock.bucket_index(at_ms(10_000), width), 0);
    }

    #[test]
    fn test_zero_width_is_clamped() {
        let clock = EpochClock::new(0);
        // A zero-width bucket would divide by zero; it degrades to 1ms.
        assert_eq!(clock.bucket_index(at_ms(5), Duration::ZERO), 5);
    }

    #[test]
    fn test_now_ms_saturates_before_unix_epoch() {
        assert_eq!(EpochClock::now_ms(UNIX_EPOCH - Duration::from_secs(1)), 0);
        assert_eq!(EpochClock::now_ms(UNIX_EPOCH + Duration::from_millis(5)), 5);
    }

    #[test]
    fn test_default_start_matches_fleet_constant() {
        assert_eq!(EpochClock::default().start_ms(), DEFAULT_EPOCH_START_MS);
    }
}
