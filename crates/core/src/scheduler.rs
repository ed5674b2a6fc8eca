//! Non-overlapping periodic task runner.
//!
//! A tick starts the task only when the previous run has finished; otherwise
//! the tick is skipped and counted. A slow run therefore delays only its own
//! schedule and never piles up concurrent invocations.

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Counters for one scheduler.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    /// Runs that completed successfully
    pub runs: u64,
    /// Ticks dropped because a run was still in flight
    pub skipped: u64,
    /// Runs that returned an error
    pub failures: u64,
}

#[derive(Default)]
struct Counters {
    runs: AtomicU64,
    skipped: AtomicU64,
    failures: AtomicU64,
}

/// Clears the in-flight flag even if the task panics.
struct InFlightGuard(Arc<AtomicBool>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Periodic runner with an in-flight guard and cancellation.
pub struct SequentialScheduler {
    name: &'static str,
    shutdown: watch::Sender<bool>,
    counters: Arc<Counters>,
}

impl SequentialScheduler {
    /// Arm a scheduler that invokes `task` every `period`.
    ///
    /// The first invocation happens one period after arming. Must be called
    /// from within a tokio runtime.
    pub fn start<F, Fut>(name: &'static str, period: Duration, task: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let (shutdown, mut shutdown_rx) = watch::channel(false);
        let counters = Arc::new(Counters::default());
        let in_flight = Arc::new(AtomicBool::new(false));

        let loop_counters = counters.clone();
        tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // interval() fires immediately; consume that tick
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = shutdown_rx.changed() => break,
                }
                if *shutdown_rx.borrow() {
                    break;
                }

                if in_flight
                    .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                    .is_err()
                {
                    loop_counters.skipped.fetch_add(1, Ordering::Relaxed);
                    debug!(task = name, "Previous run still in flight, skipping tick");
                    continue;
                }

                let guard = InFlightGuard(in_flight.clone());
                let counters = loop_counters.clone();
                let run = task();
                tokio::spawn(async move {
                    let _guard = guard;
                    match run.await {
                        Ok(()) => {
                            counters.runs.fetch_add(1, Ordering::Relaxed);
                        }
                        Err(e) => {
                            counters.failures.fetch_add(1, Ordering::Relaxed);
                            warn!(task = name, error = %e, "Scheduled task failed");
                        }
                    }
                });
            }

            debug!(task = name, "Scheduler loop exited");
        });

        info!(task = name, period_ms = period.as_millis() as u64, "Scheduler armed");

        Self {
            name,
            shutdown,
            counters,
        }
    }

    /// Cancel future ticks. A run already in flight finishes normally.
    pub fn stop(&self) {
        let was_running = !self.shutdown.send_replace(true);
        if was_running {
            info!(task = self.name, "Scheduler stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        !*self.shutdown.borrow()
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn stats(&self) -> SchedulerStats {
        SchedulerStats {
            runs: self.counters.runs.load(Ordering::Relaxed),
            skipped: self.counters.skipped.load(Ordering::Relaxed),
            failures: self.counters.failures.load(Ordering::Relaxed),
        }
    }
}

impl Drop for SequentialScheduler {
    fn drop(&mut self) {
        self.shutdown.send_replace(true);
    }
}
