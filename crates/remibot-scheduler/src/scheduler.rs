//! Fixed-rate scheduling engine with per-job timers and a shared worker pool.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{error, info, warn};

use crate::Job;

/// How long `stop()` waits for in-flight firings by default.
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Runs named jobs at fixed rate.
///
/// Each job gets a dedicated timer task that fires at time 0 and every
/// interval thereafter; the job body runs on a worker task tracked by the
/// engine, never on the timer itself. One live timer per name: scheduling
/// a duplicate cancels the existing timer first.
pub struct Scheduler {
    timers: Mutex<HashMap<String, CancellationToken>>,
    workers: TaskTracker,
    running: AtomicBool,
    shutdown_grace: Duration,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::with_grace(DEFAULT_SHUTDOWN_GRACE)
    }

    /// Create a scheduler with a custom shutdown grace period.
    pub fn with_grace(shutdown_grace: Duration) -> Self {
        Self {
            timers: Mutex::new(HashMap::new()),
            workers: TaskTracker::new(),
            running: AtomicBool::new(true),
            shutdown_grace,
        }
    }

    /// Register a job for repeated execution.
    ///
    /// Returns false if the scheduler has been stopped. A job scheduled
    /// under an already-registered name replaces the existing timer.
    pub async fn schedule(&self, job: Job) -> bool {
        let mut timers = self.timers.lock().await;
        // Checked under the timers lock: stop() drains the map while
        // holding it, so a timer inserted here is either refused below or
        // still present for stop() to cancel. An unlocked check could let
        // a job slip in after stop() had already drained.
        if !self.is_running() {
            warn!(job = %job.name(), "Scheduler is stopped, refusing job");
            return false;
        }
        if let Some(existing) = timers.remove(job.name()) {
            existing.cancel();
            info!(job = %job.name(), "Replacing existing timer");
        }

        info!(
            job = %job.name(),
            interval_ms = job.interval().as_millis() as u64,
            "Job scheduled"
        );

        let token = CancellationToken::new();
        timers.insert(job.name().to_string(), token.clone());

        let workers = self.workers.clone();
        let job = Arc::new(job);
        // The timer loop is tracked alongside the firings: stop()'s wait
        // cannot return while a loop is alive, so a tick that raced the
        // shutdown still lands its firing inside the grace period.
        self.workers.spawn(async move {
            let mut ticker = tokio::time::interval(job.interval());
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    // Biased so a cancel issued before the first tick wins.
                    biased;
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        let job = job.clone();
                        workers.spawn(async move {
                            if let Err(e) = job.execute().await {
                                error!(job = %job.name(), "Job execution failed: {e:#}");
                            }
                        });
                    }
                }
            }
        });

        true
    }

    /// Cancel the named job's timer. Idempotent; true iff a timer existed.
    pub async fn cancel(&self, name: &str) -> bool {
        if let Some(token) = self.timers.lock().await.remove(name) {
            token.cancel();
            info!(job = name, "Job cancelled");
            true
        } else {
            false
        }
    }

    /// Stop the scheduler: cancel every timer, then wait up to the grace
    /// period for in-flight firings to finish. Idempotent.
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        info!("Stopping scheduler");

        let mut timers = self.timers.lock().await;
        for (name, token) in timers.drain() {
            token.cancel();
            info!(job = %name, "Job cancelled");
        }
        drop(timers);

        self.workers.close();
        if tokio::time::timeout(self.shutdown_grace, self.workers.wait())
            .await
            .is_err()
        {
            warn!(
                grace_ms = self.shutdown_grace.as_millis() as u64,
                "In-flight jobs did not finish within the grace period"
            );
        }
        info!("Scheduler stopped");
    }

    /// Whether `stop()` has not yet been called.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}
