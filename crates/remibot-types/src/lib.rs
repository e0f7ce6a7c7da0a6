use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ──────────────────── Task Types ────────────────────

/// A persisted reminder, one-off or recurring.
///
/// The record is owned by the task store; `id` is assigned on first save
/// (0 before that), and `created_at`/`updated_at` are store-managed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledTask {
    /// Store-assigned identifier.
    pub id: i64,
    /// Short reminder title.
    pub title: String,
    /// Optional longer description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Fire at or after this instant.
    pub execution_time: DateTime<Utc>,
    /// True once the poll loop has processed this task. Monotonic.
    #[serde(default)]
    pub completed: bool,
    /// Whether a successor is created when this task fires.
    #[serde(default)]
    pub recurring: bool,
    /// Recurrence pattern (e.g. "daily", "weekly", "10s"). Required iff recurring.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recurrence_pattern: Option<String>,
    /// External user ID of whoever created the task.
    pub creator_id: String,
    /// Guild scoping the delivery channel, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guild_id: Option<String>,
    /// Delivery channel. None means a direct message to the creator.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<String>,
    /// True only after a delivery attempt succeeded.
    #[serde(default)]
    pub notification_sent: bool,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last modification time.
    pub updated_at: DateTime<Utc>,
}

impl ScheduledTask {
    /// Create a new unsaved one-off task with default flags.
    pub fn new(
        title: impl Into<String>,
        execution_time: DateTime<Utc>,
        creator_id: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            title: title.into(),
            description: None,
            execution_time,
            completed: false,
            recurring: false,
            recurrence_pattern: None,
            creator_id: creator_id.into(),
            guild_id: None,
            channel_id: None,
            notification_sent: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Where a notification for this task should be delivered.
    ///
    /// A task with a channel goes to that channel (scoped to its guild when
    /// set); a task without one goes directly to its creator.
    pub fn destination(&self) -> Destination {
        match &self.channel_id {
            Some(channel_id) => Destination::Channel {
                guild_id: self.guild_id.clone(),
                channel_id: channel_id.clone(),
            },
            None => Destination::Direct {
                user_id: self.creator_id.clone(),
            },
        }
    }
}

// ──────────────────── Delivery Types ────────────────────

/// Target of a notification delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Destination {
    /// A channel, optionally scoped to a guild.
    Channel {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        guild_id: Option<String>,
        channel_id: String,
    },
    /// A private message to a single user.
    Direct { user_id: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_task() -> ScheduledTask {
        ScheduledTask::new(
            "standup",
            Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap(),
            "user-1",
        )
    }

    #[test]
    fn test_new_task_defaults() {
        let task = sample_task();
        assert_eq!(task.id, 0);
        assert!(!task.completed);
        assert!(!task.recurring);
        assert!(!task.notification_sent);
        assert!(task.recurrence_pattern.is_none());
    }

    #[test]
    fn test_task_serde_roundtrip() {
        let mut task = sample_task();
        task.recurring = true;
        task.recurrence_pattern = Some("weekly".into());
        let json = serde_json::to_string(&task).unwrap();
        let parsed: ScheduledTask = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.title, "standup");
        assert_eq!(parsed.recurrence_pattern, Some("weekly".into()));
        assert_eq!(parsed.execution_time, task.execution_time);
    }

    #[test]
    fn test_destination_channel_in_guild() {
        let mut task = sample_task();
        task.guild_id = Some("g1".into());
        task.channel_id = Some("c1".into());
        assert_eq!(
            task.destination(),
            Destination::Channel {
                guild_id: Some("g1".into()),
                channel_id: "c1".into(),
            }
        );
    }

    #[test]
    fn test_destination_direct_without_channel() {
        let task = sample_task();
        assert_eq!(
            task.destination(),
            Destination::Direct {
                user_id: "user-1".into()
            }
        );
    }

    #[test]
    fn test_destination_serde_tagged() {
        let dest = Destination::Direct {
            user_id: "u1".into(),
        };
        let json = serde_json::to_string(&dest).unwrap();
        assert!(json.contains("\"type\":\"direct\""));
        let parsed: Destination = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, dest);
    }
}
