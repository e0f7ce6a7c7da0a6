//! remibot-scheduler: generic fixed-rate job runner.
//!
//! A [`Job`] is a named interval plus an async action; a [`Scheduler`]
//! runs any number of jobs, each on its own timer, handing every firing
//! off to a tracked worker task so one slow body never delays the cadence
//! of the rest.

pub mod scheduler;

pub use scheduler::Scheduler;

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use anyhow::bail;

type Action =
    Arc<dyn Fn() -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>> + Send + Sync>;

/// A named, interval-driven unit of repeating work.
///
/// Immutable once built. `execute()` propagates the action's error to the
/// caller; containment is the scheduler's responsibility.
#[derive(Clone)]
pub struct Job {
    name: String,
    interval: Duration,
    action: Action,
}

impl Job {
    pub fn builder() -> JobBuilder {
        JobBuilder::default()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Run the wrapped action once.
    pub async fn execute(&self) -> anyhow::Result<()> {
        (self.action)().await
    }
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job")
            .field("name", &self.name)
            .field("interval", &self.interval)
            .finish_non_exhaustive()
    }
}

/// Builder for [`Job`].
#[derive(Default)]
pub struct JobBuilder {
    name: Option<String>,
    interval: Option<Duration>,
    action: Option<Action>,
}

impl JobBuilder {
    /// Set the job name. Defaults to one derived from the creation time.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the firing interval. Must be positive.
    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = Some(interval);
        self
    }

    /// Set the action to run on each firing.
    pub fn action<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.action = Some(Arc::new(move || Box::pin(f())));
        self
    }

    pub fn build(self) -> anyhow::Result<Job> {
        let Some(action) = self.action else {
            bail!("a job requires an action");
        };
        let Some(interval) = self.interval else {
            bail!("a job requires an interval");
        };
        if interval.is_zero() {
            bail!("job interval must be positive");
        }
        let name = self
            .name
            .unwrap_or_else(|| format!("job-{}", chrono::Utc::now().timestamp_millis()));
        Ok(Job {
            name,
            interval,
            action,
        })
    }
}
