use super::clock::EpochClock;
use super::election::EpochElection;
use super::limiter::SlidingWindowLimiter;
use super::refresher::CoordinatedRefresher;
use super::scheduler::Scheduler;
use super::store::{CounterStore, MemoryStore};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant, SystemTime};

/// A clock whose bucket 0 starts exactly at the returned base time, so
/// offsets in milliseconds map onto known bucket indices.
fn aligned_clock() -> (EpochClock, SystemTime) {
    let base = SystemTime::now();
    (EpochClock::new(EpochClock::now_ms(base)), base)
}

fn at(base: SystemTime, ms: u64) -> SystemTime {
    base + Duration::from_millis(ms)
}

#[test]
fn test_limiter_allows_quota_then_denies() {
    let (clock, base) = aligned_clock();
    let store = Arc::new(MemoryStore::new());
    let limiter = SlidingWindowLimiter::builder("t", Duration::from_millis(200), 10)
        .store(store)
        .clock(clock)
        .build();

    for i in 0..10 {
        assert!(
            limiter.check_at("aaa", base).unwrap(),
            "hit {} should be allowed",
            i + 1
        );
    }
    assert!(!limiter.check_at("aaa", base).unwrap(), "hit 11 should be denied");
}

#[test]
fn test_limiter_quota_returns_after_window_rolls_past() {
    let (clock, base) = aligned_clock();
    let limiter = SlidingWindowLimiter::builder("t", Duration::from_millis(200), 10)
        .store(Arc::new(MemoryStore::new()))
        .clock(clock)
        .build();

    for _ in 0..10 {
        assert!(limiter.check_at("aaa", base).unwrap());
    }
    assert!(!limiter.check_at("aaa", base).unwrap());

    // 250ms later the whole window has rolled past the burst.
    for i in 0..10 {
        assert!(
            limiter.check_at("aaa", at(base, 250)).unwrap(),
            "second round hit {} should be allowed",
            i + 1
        );
    }
    assert!(!limiter.check_at("aaa", at(base, 250)).unwrap());
}

#[test]
fn test_limiter_window_slides_bucket_by_bucket() {
    // span 200ms, 10 buckets of 20ms each, quota 10
    let (clock, base) = aligned_clock();
    let limiter = SlidingWindowLimiter::builder("t", Duration::from_millis(200), 10)
        .store(Arc::new(MemoryStore::new()))
        .clock(clock)
        .build();

    // bucket 0: five hits
    for _ in 0..5 {
        assert!(limiter.check_at("k", base).unwrap());
    }
    // bucket 5: five more allowed, the sixth tips the rolling sum
    for _ in 0..5 {
        assert!(limiter.check_at("k", at(base, 100)).unwrap());
    }
    assert!(!limiter.check_at("k", at(base, 100)).unwrap());

    // bucket 10: bucket 0 has left the window, bucket 5 (6 hits, the
    // denied one included) is still inside; 4 more fit.
    for _ in 0..4 {
        assert!(limiter.check_at("k", at(base, 210)).unwrap());
    }
    assert!(!limiter.check_at("k", at(base, 210)).unwrap());

    // bucket 19: bucket 10 (5 hits, the denied one included) is the last
    // one still inside the window; 5 more fit.
    for _ in 0..5 {
        assert!(limiter.check_at("k", at(base, 390)).unwrap());
    }
    assert!(!limiter.check_at("k", at(base, 390)).unwrap());

    // bucket 30: every earlier bucket has aged out of the window.
    assert!(limiter.check_at("k", at(base, 610)).unwrap());
}

#[test]
fn test_limiter_keys_are_independent() {
    let (clock, base) = aligned_clock();
    let limiter = SlidingWindowLimiter::builder("t", Duration::from_millis(200), 2)
        .store(Arc::new(MemoryStore::new()))
        .clock(clock)
        .build();

    assert!(limiter.check_at("a", base).unwrap());
    assert!(limiter.check_at("a", base).unwrap());
    assert!(!limiter.check_at("a", base).unwrap());

    // A fresh key has its full quota available from the first call.
    assert!(limiter.check_at("b", base).unwrap());
}

#[test]
fn test_limiter_local_backend() {
    let (clock, base) = aligned_clock();
    let limiter = SlidingWindowLimiter::builder("t", Duration::from_millis(200), 3)
        .local()
        .clock(clock)
        .build();

    assert!(limiter.check_at("k", base).unwrap());
    assert!(limiter.check_at("k", at(base, 50)).unwrap());
    assert!(limiter.check_at("k", at(base, 150)).unwrap());
    assert!(!limiter.check_at("k", at(base, 199)).unwrap());

    // 400ms on, every live slot belongs to a newer rotation.
    assert!(limiter.check_at("k", at(base, 450)).unwrap());
}

#[test]
fn test_limiter_backends_agree_on_identical_timing() {
    let (clock, base) = aligned_clock();
    let span = Duration::from_millis(100);
    let shared = SlidingWindowLimiter::builder("eq", span, 3)
        .store(Arc::new(MemoryStore::new()))
        .clock(clock)
        .build();
    let local = SlidingWindowLimiter::builder("eq", span, 3)
        .local()
        .clock(clock)
        .build();

    let offsets = [0, 5, 25, 45, 50, 110, 130, 190, 210, 230, 250, 330, 500];
    for ms in offsets {
        let now = at(base, ms);
        assert_eq!(
            shared.check_at("k", now).unwrap(),
            local.check_at("k", now).unwrap(),
            "backends disagree at +{ms}ms"
        );
    }
}

#[test]
fn test_limiter_custom_bucket_count() {
    let (clock, base) = aligned_clock();
    let limiter = SlidingWindowLimiter::builder("t", Duration::from_millis(200), 4)
        .store(Arc::new(MemoryStore::new()))
        .clock(clock)
        .buckets(4)
        .build();

    // 4 buckets of 50ms; hits at 0 and 199 share one window.
    assert!(limiter.check_at("k", base).unwrap());
    assert!(limiter.check_at("k", at(base, 60)).unwrap());
    assert!(limiter.check_at("k", at(base, 120)).unwrap());
    assert!(limiter.check_at("k", at(base, 199)).unwrap());
    assert!(!limiter.check_at("k", at(base, 199)).unwrap());
}

#[test]
fn test_election_sequential_callers_single_winner() {
    let (clock, base) = aligned_clock();
    let store: Arc<MemoryStore> = Arc::new(MemoryStore::new());
    let election =
        EpochElection::with_clock("job", Duration::from_secs(60), store.clone(), clock);

    assert!(election.try_acquire_at(base).unwrap());
    for _ in 0..5 {
        assert!(!election.try_acquire_at(at(base, 10)).unwrap());
    }

    // Next epoch, leadership is up for grabs again.
    assert!(election.try_acquire_at(at(base, 60_000)).unwrap());
    assert!(!election.try_acquire_at(at(base, 60_001)).unwrap());
}

#[test]
fn test_election_concurrent_callers_single_winner() {
    let (clock, base) = aligned_clock();
    let store: Arc<dyn CounterStore> = Arc::new(MemoryStore::new());
    let election = Arc::new(EpochElection::with_clock(
        "job",
        Duration::from_secs(60),
        store,
        clock,
    ));

    let wins = Arc::new(AtomicUsize::new(0));
    thread::scope(|s| {
        for _ in 0..16 {
            let election = election.clone();
            let wins = wins.clone();
            s.spawn(move || {
                if election.try_acquire_at(base).unwrap() {
                    wins.fetch_add(1, Ordering::SeqCst);
                }
            });
        }
    });
    assert_eq!(wins.load(Ordering::SeqCst), 1);
}

#[test]
fn test_election_names_do_not_contend() {
    let (clock, base) = aligned_clock();
    let store: Arc<dyn CounterStore> = Arc::new(MemoryStore::new());
    let a = EpochElection::with_clock("a", Duration::from_secs(60), store.clone(), clock);
    let b = EpochElection::with_clock("b", Duration::from_secs(60), store, clock);

    assert!(a.try_acquire_at(base).unwrap());
    assert!(b.try_acquire_at(base).unwrap());
}

#[test]
fn test_refresher_rebuilds_once_per_version_change() {
    let (clock, base) = aligned_clock();
    let store = Arc::new(MemoryStore::new());
    let calls: Arc<Mutex<Vec<(u64, u64)>>> = Arc::new(Mutex::new(Vec::new()));
    let version = Arc::new(AtomicU64::new(7));

    let refresher = {
        let calls = calls.clone();
        let version = version.clone();
        CoordinatedRefresher::builder("cache", Duration::from_secs(1), store, move |old, new| {
            calls.lock().push((old, new))
        })
        .version_oracle(move || version.load(Ordering::SeqCst))
        .clock(clock)
        .build()
    };

    // First won epoch: persisted version 0 differs from oracle's 7.
    assert!(refresher.tick_at(base).unwrap());
    // Second won epoch, oracle unchanged: skipped.
    assert!(!refresher.tick_at(at(base, 1_000)).unwrap());
    // Oracle moves, third epoch rebuilds with the correct pair.
    version.store(8, Ordering::SeqCst);
    assert!(refresher.tick_at(at(base, 2_000)).unwrap());

    assert_eq!(*calls.lock(), vec![(0, 7), (7, 8)]);
}

#[test]
fn test_refresher_non_leader_stays_silent() {
    let (clock, base) = aligned_clock();
    let store: Arc<MemoryStore> = Arc::new(MemoryStore::new());
    let rebuilds = Arc::new(AtomicUsize::new(0));

    // Another node already claimed this epoch.
    let rival =
        EpochElection::with_clock("cache", Duration::from_secs(1), store.clone(), clock);
    assert!(rival.try_acquire_at(base).unwrap());

    let refresher = {
        let rebuilds = rebuilds.clone();
        CoordinatedRefresher::builder("cache", Duration::from_secs(1), store, move |_, _| {
            rebuilds.fetch_add(1, Ordering::SeqCst);
        })
        .clock(clock)
        .build()
    };

    assert!(!refresher.tick_at(at(base, 10)).unwrap());
    assert_eq!(rebuilds.load(Ordering::SeqCst), 0);

    // The next epoch is uncontested.
    assert!(refresher.tick_at(at(base, 1_010)).unwrap());
    assert_eq!(rebuilds.load(Ordering::SeqCst), 1);
}

#[test]
fn test_refresher_without_oracle_rebuilds_every_won_epoch() {
    let (clock, base) = aligned_clock();
    let store = Arc::new(MemoryStore::new());
    let calls: Arc<Mutex<Vec<(u64, u64)>>> = Arc::new(Mutex::new(Vec::new()));

    let refresher = {
        let calls = calls.clone();
        CoordinatedRefresher::builder("plain", Duration::from_secs(1), store, move |old, new| {
            calls.lock().push((old, new))
        })
        .clock(clock)
        .build()
    };

    assert!(refresher.tick_at(base).unwrap());
    assert!(refresher.tick_at(at(base, 1_000)).unwrap());
    assert_eq!(*calls.lock(), vec![(0, 0), (0, 0)]);
}

#[test]
fn test_scheduler_stop_latency_is_bounded() {
    let runs = Arc::new(AtomicUsize::new(0));
    let scheduler = {
        let runs = runs.clone();
        Scheduler::new(Duration::from_secs(3600), move || {
            runs.fetch_add(1, Ordering::SeqCst);
        })
    };

    assert!(scheduler.start());
    thread::sleep(Duration::from_millis(50));
    assert_eq!(runs.load(Ordering::SeqCst), 1);

    let stopped_at = Instant::now();
    scheduler.stop();
    scheduler.wait();
    // One 1s sleep slice at most, regardless of the 3600s interval.
    assert!(
        stopped_at.elapsed() < Duration::from_millis(2500),
        "shutdown took {:?}",
        stopped_at.elapsed()
    );
    assert_eq!(runs.load(Ordering::SeqCst), 1);
}

#[test]
fn test_scheduler_start_while_running_is_refused() {
    let scheduler = Scheduler::new(Duration::from_secs(3600), || {});

    assert!(scheduler.start());
    assert!(!scheduler.start());
    assert!(scheduler.is_running());

    scheduler.stop();
    scheduler.wait();
    assert!(!scheduler.is_running());
}

#[test]
fn test_scheduler_restarts_after_stop_and_wait() {
    let runs = Arc::new(AtomicUsize::new(0));
    let scheduler = {
        let runs = runs.clone();
        Scheduler::new(Duration::from_secs(3600), move || {
            runs.fetch_add(1, Ordering::SeqCst);
        })
    };

    assert!(scheduler.start());
    scheduler.stop();
    scheduler.wait();
    assert_eq!(runs.load(Ordering::SeqCst), 1);

    assert!(scheduler.start());
    scheduler.stop();
    scheduler.wait();
    assert_eq!(runs.load(Ordering::SeqCst), 2);
}

#[test]
fn test_scheduler_start_before_wait_is_refused() {
    let runs = Arc::new(AtomicUsize::new(0));
    let scheduler = {
        let runs = runs.clone();
        Scheduler::new(Duration::from_secs(3600), move || {
            runs.fetch_add(1, Ordering::SeqCst);
        })
    };

    assert!(scheduler.start());
    scheduler.stop();
    // The old loop has not been reaped yet; a restart now could overlap
    // its final sleep slice.
    assert!(!scheduler.start());

    scheduler.wait();
    assert!(scheduler.start());
    scheduler.stop();
    scheduler.wait();
    assert_eq!(runs.load(Ordering::SeqCst), 2);
}

#[test]
fn test_scheduler_wait_without_start_returns_immediately() {
    let scheduler = Scheduler::new(Duration::from_secs(1), || {});
    scheduler.wait();
    scheduler.stop();
    scheduler.wait();
}

#[test]
fn test_scheduler_survives_panicking_work() {
    let runs = Arc::new(AtomicUsize::new(0));
    let scheduler = {
        let runs = runs.clone();
        Scheduler::new(Duration::from_secs(1), move || {
            runs.fetch_add(1, Ordering::SeqCst);
            panic!("work blew up");
        })
    };

    assert!(scheduler.start());
    thread::sleep(Duration::from_millis(2200));
    assert!(scheduler.is_running());
    assert!(
        runs.load(Ordering::SeqCst) >= 2,
        "loop died after the first panic"
    );
    scheduler.stop();
    scheduler.wait();
}
