//! Poll-and-dispatch: the single job that drives reminder delivery.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use remibot_scheduler::{Job, Scheduler};
use remibot_types::ScheduledTask;

use crate::clock::Clock;
use crate::recurrence;
use crate::tasks::TaskService;

/// Fixed name of the polling job. Re-registering under this name replaces
/// the previous timer, so restarting the service never duplicates it.
pub const POLL_JOB_NAME: &str = "task-checker";

/// Default time between due-task polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(60);

/// Polls the store for due tasks and dispatches them.
///
/// Each cycle: fetch tasks due at or before the clock's now, then for each
/// one independently deliver its notification (unless already sent), create
/// the recurrence successor where applicable, and mark it completed. A
/// failure on one task never aborts the rest.
pub struct ReminderService {
    scheduler: Arc<Scheduler>,
    tasks: Arc<TaskService>,
    clock: Arc<dyn Clock>,
    poll_interval: Duration,
}

impl ReminderService {
    pub fn new(scheduler: Arc<Scheduler>, tasks: Arc<TaskService>, clock: Arc<dyn Clock>) -> Self {
        Self {
            scheduler,
            tasks,
            clock,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Register the polling job with the scheduler engine.
    pub async fn start(self: &Arc<Self>) -> anyhow::Result<()> {
        let service = self.clone();
        let job = Job::builder()
            .name(POLL_JOB_NAME)
            .interval(self.poll_interval)
            .action(move || {
                let service = service.clone();
                async move { service.run_cycle().await.map(|_| ()) }
            })
            .build()?;

        if !self.scheduler.schedule(job).await {
            anyhow::bail!("scheduler is stopped, cannot start reminder service");
        }
        info!(
            interval_secs = self.poll_interval.as_secs(),
            "Reminder service started"
        );
        Ok(())
    }

    /// Stop the underlying scheduler, waiting out its grace period.
    pub async fn stop(&self) {
        self.scheduler.stop().await;
        info!("Reminder service stopped");
    }

    /// Run one poll cycle; returns the number of tasks processed.
    pub async fn run_cycle(&self) -> anyhow::Result<usize> {
        let now = self.clock.now();
        let due = self.tasks.tasks_due_before(now).await?;
        debug!(count = due.len(), "Due tasks fetched");

        let mut processed = 0;
        for task in due {
            match self.process_task(&task).await {
                Ok(()) => processed += 1,
                Err(e) => error!(task_id = task.id, "Failed to process task: {e:#}"),
            }
        }

        if processed > 0 {
            info!(processed, "Poll cycle complete");
        }
        Ok(processed)
    }

    async fn process_task(&self, task: &ScheduledTask) -> anyhow::Result<()> {
        if !task.notification_sent {
            // Delivery failure is logged inside; the task still completes
            // below, matching the reference behavior (no automatic retry).
            self.tasks.send_task_notification(task).await;
        }

        if task.recurring {
            match task.recurrence_pattern.as_deref() {
                Some(pattern) => self.schedule_next_occurrence(task, pattern).await,
                None => warn!(task_id = task.id, "Recurring task has no pattern"),
            }
        }

        if !self.tasks.complete_task(task.id).await? {
            warn!(task_id = task.id, "Task disappeared before completion");
        }
        Ok(())
    }

    /// Create the successor of a recurring task.
    ///
    /// The next time is computed from the task's own `execution_time`, not
    /// from now, so a delayed cycle does not shift the cadence.
    async fn schedule_next_occurrence(&self, task: &ScheduledTask, pattern: &str) {
        let Some(next) = recurrence::next_execution(pattern, task.execution_time) else {
            warn!(
                task_id = task.id,
                pattern, "Cannot compute next occurrence, recurrence ends here"
            );
            return;
        };

        let created = self
            .tasks
            .create_recurring_task(
                &task.title,
                task.description.as_deref(),
                next,
                pattern,
                &task.creator_id,
                task.guild_id.as_deref(),
                task.channel_id.as_deref(),
            )
            .await;

        match created {
            Ok(successor) => info!(
                task_id = task.id,
                successor_id = successor.id,
                at = %next,
                "Next occurrence scheduled"
            ),
            Err(e) => error!(task_id = task.id, "Failed to create next occurrence: {e:#}"),
        }
    }
}
