//! Task CRUD, queries, and notification delivery.

use std::sync::Arc;

use anyhow::bail;
use chrono::{DateTime, Utc};
use tracing::{info, warn};

use remibot_store::TaskStore;
use remibot_types::ScheduledTask;

use crate::recurrence;
use crate::sink::NotificationSink;

const DATE_FORMAT: &str = "%d/%m/%Y %H:%M";

/// The only writer of task records.
///
/// Encapsulates recurrence validation and notification-message formatting;
/// everything else in the system reads and writes tasks through here.
pub struct TaskService {
    store: Arc<TaskStore>,
    sink: Arc<dyn NotificationSink>,
}

impl TaskService {
    pub fn new(store: Arc<TaskStore>, sink: Arc<dyn NotificationSink>) -> Self {
        Self { store, sink }
    }

    /// Create a one-off task.
    ///
    /// Past execution times are accepted on purpose: recurrence successors
    /// are computed relative to their predecessor, not to "now". Rejecting
    /// past times is a caller-side concern.
    pub async fn create_task(
        &self,
        title: &str,
        description: Option<&str>,
        execution_time: DateTime<Utc>,
        creator_id: &str,
        guild_id: Option<&str>,
        channel_id: Option<&str>,
    ) -> anyhow::Result<ScheduledTask> {
        let mut task = ScheduledTask::new(title, execution_time, creator_id);
        task.description = description.map(str::to_string);
        task.guild_id = guild_id.map(str::to_string);
        task.channel_id = channel_id.map(str::to_string);

        let task = self.store.save(&task).await?;
        info!(
            task_id = task.id,
            title = %task.title,
            at = %execution_time.format(DATE_FORMAT),
            "Task created"
        );
        Ok(task)
    }

    /// Create a recurring task. The pattern is validated up front; an
    /// unrecognized one is a configuration error, never coerced.
    #[allow(clippy::too_many_arguments)]
    pub async fn create_recurring_task(
        &self,
        title: &str,
        description: Option<&str>,
        first_execution_time: DateTime<Utc>,
        recurrence_pattern: &str,
        creator_id: &str,
        guild_id: Option<&str>,
        channel_id: Option<&str>,
    ) -> anyhow::Result<ScheduledTask> {
        if !recurrence::is_valid(recurrence_pattern) {
            bail!("unrecognized recurrence pattern: {recurrence_pattern:?}");
        }

        let mut task = ScheduledTask::new(title, first_execution_time, creator_id);
        task.description = description.map(str::to_string);
        task.guild_id = guild_id.map(str::to_string);
        task.channel_id = channel_id.map(str::to_string);
        task.recurring = true;
        task.recurrence_pattern = Some(recurrence_pattern.to_string());

        let task = self.store.save(&task).await?;
        info!(
            task_id = task.id,
            title = %task.title,
            pattern = recurrence_pattern,
            at = %first_execution_time.format(DATE_FORMAT),
            "Recurring task created"
        );
        Ok(task)
    }

    /// Partially update a task. None for an unknown id.
    pub async fn update_task(
        &self,
        id: i64,
        title: Option<&str>,
        description: Option<&str>,
        execution_time: Option<DateTime<Utc>>,
    ) -> anyhow::Result<Option<ScheduledTask>> {
        let Some(mut task) = self.store.find_by_id(id).await? else {
            return Ok(None);
        };

        if let Some(title) = title {
            task.title = title.to_string();
        }
        if let Some(description) = description {
            task.description = Some(description.to_string());
        }
        if let Some(execution_time) = execution_time {
            task.execution_time = execution_time;
        }

        let task = self.store.update(&task).await?;
        info!(task_id = id, "Task updated");
        Ok(Some(task))
    }

    /// Mark a task completed. False for an unknown id.
    pub async fn complete_task(&self, id: i64) -> anyhow::Result<bool> {
        let Some(mut task) = self.store.find_by_id(id).await? else {
            return Ok(false);
        };
        task.completed = true;
        self.store.update(&task).await?;
        info!(task_id = id, "Task completed");
        Ok(true)
    }

    /// Remove a task. False for an unknown id.
    pub async fn delete_task(&self, id: i64) -> anyhow::Result<bool> {
        let deleted = self.store.delete(id).await?;
        if deleted {
            info!(task_id = id, "Task deleted");
        }
        Ok(deleted)
    }

    pub async fn task_by_id(&self, id: i64) -> anyhow::Result<Option<ScheduledTask>> {
        Ok(self.store.find_by_id(id).await?)
    }

    pub async fn tasks_by_creator(&self, creator_id: &str) -> anyhow::Result<Vec<ScheduledTask>> {
        Ok(self.store.find_by_creator(creator_id).await?)
    }

    pub async fn tasks_by_guild(&self, guild_id: &str) -> anyhow::Result<Vec<ScheduledTask>> {
        Ok(self.store.find_by_guild(guild_id).await?)
    }

    /// Incomplete tasks due at or before `instant`, earliest first.
    pub async fn tasks_due_before(
        &self,
        instant: DateTime<Utc>,
    ) -> anyhow::Result<Vec<ScheduledTask>> {
        Ok(self.store.find_due_before(instant).await?)
    }

    /// Format and deliver the reminder for a task.
    ///
    /// On success the `notification_sent` flag is persisted; on failure it
    /// stays false and the task remains eligible for a later attempt.
    pub async fn send_task_notification(&self, task: &ScheduledTask) -> bool {
        let text = build_notification_message(task);
        let destination = task.destination();

        match self.sink.deliver(&destination, &text).await {
            Ok(()) => {
                let mut updated = task.clone();
                updated.notification_sent = true;
                match self.store.update(&updated).await {
                    Ok(_) => info!(task_id = task.id, "Notification delivered"),
                    Err(e) => warn!(
                        task_id = task.id,
                        "Notification delivered but flag not persisted: {e}"
                    ),
                }
                true
            }
            Err(e) => {
                warn!(task_id = task.id, "Notification delivery failed: {e:#}");
                false
            }
        }
    }
}

fn build_notification_message(task: &ScheduledTask) -> String {
    let mut message = String::new();
    message.push_str(":alarm_clock: **Task reminder**\n\n");
    message.push_str(&format!(":pushpin: **{}**\n", task.title));

    if let Some(description) = task.description.as_deref().filter(|d| !d.is_empty()) {
        message.push_str(&format!(":notepad_spiral: {description}\n"));
    }

    message.push_str(&format!(
        ":calendar: Due: {}\n",
        task.execution_time.format(DATE_FORMAT)
    ));

    if task.recurring {
        let label = task
            .recurrence_pattern
            .as_deref()
            .map(recurrence::describe)
            .unwrap_or_else(|| "unknown".to_string());
        message.push_str(&format!(":repeat: Recurring: {label}\n"));
    }

    message.push_str(&format!("\n<@{}>", task.creator_id));
    message
}
