//! remibot-service: the reminder domain layer.
//!
//! [`TaskService`] owns all reads and writes of task records and knows how
//! to format and deliver notifications; [`ReminderService`] registers the
//! single polling job with the scheduler engine and drives each cycle:
//! fetch due tasks, notify, roll recurring tasks forward, mark complete.

pub mod clock;
pub mod recurrence;
pub mod reminder;
pub mod sink;
pub mod tasks;

#[cfg(test)]
pub(crate) mod testutil;

pub use clock::{Clock, SystemClock};
pub use reminder::ReminderService;
pub use sink::{NotificationSink, TracingSink};
pub use tasks::TaskService;
