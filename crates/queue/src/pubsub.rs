//! Redis Pub/Sub for cross-instance event distribution.
//!
//! Every server instance publishes call and silence events to one Redis
//! channel and relays what it receives into its own [`LocalEventBus`], which
//! feeds the WebSocket and SSE subscribers connected to that instance.

#![allow(missing_docs)]

use async_trait::async_trait;
use fred::clients::{Client, SubscriberClient};
use fred::error::{Error as RedisError, ErrorKind as RedisErrorKind};
use fred::interfaces::{ClientLike, EventInterface, PubsubInterface};
use fred::types::config::Config as RedisConfig;
use mozo_common::{AppError, AppResult};
use mozo_core::services::{EventPublisher, LocalEventBus, RealtimeEvent};
use tracing::{debug, info, warn};

/// Pub/Sub channel names.
pub mod channels {
    /// Channel carrying every realtime event, under the configured key prefix.
    #[must_use]
    pub fn realtime(prefix: &str) -> String {
        format!("{prefix}:realtime")
    }
}

/// Redis Pub/Sub manager for event distribution.
#[derive(Clone)]
pub struct RedisPubSub {
    publisher: Client,
    subscriber: SubscriberClient,
    channel: String,
    /// Events received from Redis are re-broadcast here.
    local: LocalEventBus,
}

impl RedisPubSub {
    /// Create a new Redis Pub/Sub manager.
    pub async fn new(redis_url: &str, prefix: &str, local: LocalEventBus) -> Result<Self, RedisError> {
        let config = RedisConfig::from_url(redis_url)?;

        let publisher = Client::new(config.clone(), None, None, None);
        publisher.init().await?;

        let subscriber = SubscriberClient::new(config, None, None, None);
        subscriber.init().await?;

        info!("Redis Pub/Sub initialized");

        Ok(Self {
            publisher,
            subscriber,
            channel: channels::realtime(prefix),
            local,
        })
    }

    /// Subscribe to the realtime channel and start relaying into the local bus.
    pub async fn start(&self) -> Result<(), RedisError> {
        self.subscriber.subscribe(self.channel.as_str()).await?;
        info!(channel = %self.channel, "Subscribed to Redis Pub/Sub channel");

        let local = self.local.clone();
        let mut message_stream = self.subscriber.message_rx();

        tokio::spawn(async move {
            while let Ok(message) = message_stream.recv().await {
                if let Some(payload) = message.value.as_string() {
                    relay(&local, &payload);
                }
            }
            info!("Pub/Sub message stream ended");
        });

        Ok(())
    }

    /// Publish an event to the realtime channel.
    pub async fn publish_event(&self, event: &RealtimeEvent) -> Result<(), RedisError> {
        let payload = serde_json::to_string(event).map_err(|e| {
            RedisError::new(
                RedisErrorKind::InvalidArgument,
                format!("Serialization error: {e}"),
            )
        })?;
        let _: () = self.publisher.publish(self.channel.as_str(), payload).await?;
        debug!(channel = %self.channel, table_id = %event.table_id(), "Published Pub/Sub event");
        Ok(())
    }

    /// Shutdown the Pub/Sub manager.
    pub async fn shutdown(&self) -> Result<(), RedisError> {
        self.subscriber.quit().await?;
        self.publisher.quit().await?;
        info!("Redis Pub/Sub shutdown");
        Ok(())
    }
}

/// Decode one Pub/Sub payload and hand it to local subscribers.
fn relay(local: &LocalEventBus, payload: &str) -> usize {
    match serde_json::from_str::<RealtimeEvent>(payload) {
        Ok(event) => {
            debug!(table_id = %event.table_id(), "Received Pub/Sub event");
            local.send(event)
        }
        Err(e) => {
            warn!("Failed to parse Pub/Sub message: {}", e);
            0
        }
    }
}

/// Events published here reach this instance's subscribers through the
/// Redis round trip, like every other instance's.
#[async_trait]
impl EventPublisher for RedisPubSub {
    async fn publish(&self, event: &RealtimeEvent) -> AppResult<()> {
        self.publish_event(event)
            .await
            .map_err(|e| AppError::Redis(e.to_string()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use mozo_core::services::SilenceEvent;

    fn event() -> RealtimeEvent {
        RealtimeEvent::SilenceChanged(SilenceEvent {
            table_id: "t5".to_string(),
            business_id: "b1".to_string(),
            silenced: true,
            reason: None,
            expires_at: Some(Utc.with_ymd_and_hms(2025, 3, 1, 12, 10, 0).unwrap()),
        })
    }

    #[test]
    fn test_channel_names() {
        assert_eq!(channels::realtime("mozo"), "mozo:realtime");
    }

    #[test]
    fn test_relay_forwards_to_local_bus() {
        let local = LocalEventBus::new(8);
        let mut rx = local.subscribe();

        let event = event();
        let payload = serde_json::to_string(&event).unwrap();
        assert_eq!(relay(&local, &payload), 1);

        let received = rx.try_recv().unwrap();
        assert_eq!(received, event);
    }

    #[test]
    fn test_relay_ignores_garbage() {
        let local = LocalEventBus::new(8);
        let _rx = local.subscribe();

        assert_eq!(relay(&local, "not json"), 0);
        assert_eq!(relay(&local, r#"{"kind":"noteCreated"}"#), 0);
    }
}
