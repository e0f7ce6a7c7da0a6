//! Shared test doubles for the service crate.

use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use remibot_types::Destination;
use tokio::sync::Mutex;

use crate::clock::Clock;
use crate::sink::NotificationSink;

/// A sink recording deliveries, optionally failing them all.
pub(crate) struct MockSink {
    pub deliveries: Mutex<Vec<(Destination, String)>>,
    pub fail: AtomicBool,
}

impl MockSink {
    pub(crate) fn new() -> Self {
        Self {
            deliveries: Mutex::new(Vec::new()),
            fail: AtomicBool::new(false),
        }
    }
}

#[async_trait::async_trait]
impl NotificationSink for MockSink {
    async fn deliver(&self, destination: &Destination, text: &str) -> anyhow::Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            anyhow::bail!("sink unavailable");
        }
        self.deliveries
            .lock()
            .await
            .push((destination.clone(), text.to_string()));
        Ok(())
    }
}

/// A clock pinned to a settable instant.
pub(crate) struct ManualClock {
    now: std::sync::Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub(crate) fn at(now: DateTime<Utc>) -> Self {
        Self {
            now: std::sync::Mutex::new(now),
        }
    }

    pub(crate) fn set(&self, now: DateTime<Utc>) {
        *self.now.lock().unwrap() = now;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}
