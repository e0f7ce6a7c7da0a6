//! Notification delivery seam.

use remibot_types::Destination;
use tracing::info;

/// Delivers a formatted text message to a destination.
///
/// Use `&self` for all methods — implementations should use interior
/// mutability for any mutable state. Delivery is asynchronous; a returned
/// error means the message did not reach the destination.
#[async_trait::async_trait]
pub trait NotificationSink: Send + Sync {
    async fn deliver(&self, destination: &Destination, text: &str) -> anyhow::Result<()>;
}

/// A sink that writes deliveries to the log. Useful for local runs where
/// no chat platform is connected.
pub struct TracingSink;

#[async_trait::async_trait]
impl NotificationSink for TracingSink {
    async fn deliver(&self, destination: &Destination, text: &str) -> anyhow::Result<()> {
        match destination {
            Destination::Channel {
                guild_id,
                channel_id,
            } => info!(
                guild = guild_id.as_deref().unwrap_or("-"),
                channel = %channel_id,
                "Notification:\n{text}"
            ),
            Destination::Direct { user_id } => {
                info!(user = %user_id, "Notification (direct):\n{text}")
            }
        }
        Ok(())
    }
}
