//! Periodic background scheduler with bounded-latency shutdown
//!
//! One dedicated thread per scheduler runs the work callback once per
//! interval. Sleeping happens in one-second slices with the running flag
//! re-checked after each slice, so `stop` is observed within about a
//! second plus the runtime of any in-flight callback, regardless of the
//! configured interval.

use parking_lot::Mutex;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread::{self, JoinHandle};
use std::time::Duration;

#[derive(Default)]
struct Lifecycle {
    handle: Option<JoinHandle<()>>,
    done_rx: Option<mpsc::Receiver<()>>,
}

/// Runs a callback once per interval on a dedicated background thread.
///
/// Lifecycle is `start` → (`stop`, `wait`): `stop` is a non-blocking
/// signal, `wait` blocks until the loop has acknowledged it. Callers
/// needing synchronous shutdown call both. After `stop` + `wait` the
/// scheduler can be started again.
///
/// Work invocations never overlap, and a panicking callback is caught and
/// logged rather than killing the loop. There is no cancellation of an
/// in-flight invocation: `stop` only prevents the next one.
///
/// # Example
///
/// ```
/// use fleetgate::Scheduler;
/// use std::time::Duration;
///
/// let scheduler = Scheduler::new(Duration::from_secs(60), || {
///     // periodic work
/// });
/// scheduler.start();
/// scheduler.stop();
/// scheduler.wait();
/// ```
pub struct Scheduler {
    interval_secs: u64,
    work: Arc<dyn Fn() + Send + Sync + 'static>,
    running: Arc<AtomicBool>,
    lifecycle: Mutex<Lifecycle>,
}

impl Scheduler {
    /// Create a scheduler invoking `work` once per `interval`.
    ///
    /// Intervals under one second are clamped to one second; that floor is
    /// also the granularity of the shutdown check.
    pub fn new<F>(interval: Duration, work: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Scheduler {
            interval_secs: interval.as_secs().max(1),
            work: Arc::new(work),
            running: Arc::new(AtomicBool::new(false)),
            lifecycle: Mutex::new(Lifecycle::default()),
        }
    }

    /// Whether the background loop is currently marked running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Spawn the background loop. Returns `false` (and does nothing) if
    /// the scheduler is already running, or if a stopped loop has not been
    /// reaped with [`wait`](Self::wait) yet; a second concurrent loop is
    /// never spawned.
    pub fn start(&self) -> bool {
        let mut lifecycle = self.lifecycle.lock();
        if lifecycle.handle.is_some() {
            // Covers both a live loop and a stopped-but-unwaited one; the
            // latter could still re-observe a fresh running flag from its
            // final sleep slice.
            tracing::warn!("scheduler loop still active, start ignored");
            return false;
        }
        self.running.store(true, Ordering::SeqCst);

        let (done_tx, done_rx) = mpsc::channel();
        let running = self.running.clone();
        let work = self.work.clone();
        let interval_secs = self.interval_secs;

        let handle = thread::spawn(move || {
            run_loop(interval_secs, work, running);
            // Receiver may already be gone if the caller never waits.
            let _ = done_tx.send(());
        });

        lifecycle.handle = Some(handle);
        lifecycle.done_rx = Some(done_rx);
        true
    }

    /// Signal the loop to exit. Non-blocking; pair with [`wait`](Self::wait)
    /// for synchronous shutdown.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Block until the loop has exited and join its thread. Returns
    /// immediately if the scheduler was never started. Clears lifecycle
    /// state so the scheduler can be started again.
    pub fn wait(&self) {
        let (done_rx, handle) = {
            let mut lifecycle = self.lifecycle.lock();
            (lifecycle.done_rx.take(), lifecycle.handle.take())
        };
        if let Some(done_rx) = done_rx {
            let _ = done_rx.recv();
        }
        if let Some(handle) = handle {
            let _ = handle.join();
        }
    }
}

fn run_loop(interval_secs: u64, work: Arc<dyn Fn() + Send + Sync>, running: Arc<AtomicBool>) {
    tracing::debug!(interval_secs, "scheduler loop started");
    loop {
        // A panicking callback must not kill the loop; it is logged and
        // retried on the next tick.
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| (work)())) {
            let detail = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "non-string panic payload".to_string());
            tracing::error!(detail = %detail, "scheduled work panicked");
        }

        for _ in 0..interval_secs {
            thread::sleep(Duration::from_secs(1));
            if !running.load(Ordering::SeqCst) {
                break;
            }
        }
        if !running.load(Ordering::SeqCst) {
            break;
        }
    }
    tracing::debug!("scheduler loop exited");
}
