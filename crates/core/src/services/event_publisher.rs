//! Event publisher service.
//!
//! Provides an abstraction for publishing real-time call and silence events.
//! The in-process bus lives here; the Redis Pub/Sub implementation is
//! provided by the queue crate.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mozo_common::AppResult;
use mozo_db::entities::{
    dining_table,
    table_silence::{self, SilenceReason},
    waiter_call::{self, CallStatus, CallUrgency},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Topic naming shared by publishers and subscribers.
pub mod topics {
    /// Topic carrying every event of a business.
    #[must_use]
    pub fn business(business_id: &str) -> String {
        format!("business:{business_id}")
    }

    /// Topic carrying the events of one table.
    #[must_use]
    pub fn table(table_id: &str) -> String {
        format!("table:{table_id}")
    }
}

/// A call state change. Every delivery channel renders from this one value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallEvent {
    pub call_id: String,
    pub table_id: String,
    pub table_number: i32,
    pub business_id: String,
    pub status: CallStatus,
    pub waiter_id: Option<String>,
    pub waiter_name: Option<String>,
    pub message: String,
    pub urgency: CallUrgency,
    /// When the call entered `status`.
    pub occurred_at: DateTime<Utc>,
}

impl CallEvent {
    /// Build the event for the current state of a call.
    #[must_use]
    pub fn from_call(
        call: &waiter_call::Model,
        table: &dining_table::Model,
        waiter_name: Option<String>,
    ) -> Self {
        let occurred_at = match call.status {
            CallStatus::Pending => Some(call.called_at),
            CallStatus::Acknowledged => call.acknowledged_at,
            CallStatus::Completed => call.completed_at,
            CallStatus::Cancelled => call.cancelled_at,
        }
        .unwrap_or(call.called_at);

        Self {
            call_id: call.id.clone(),
            table_id: call.table_id.clone(),
            table_number: table.number,
            business_id: call.business_id.clone(),
            status: call.status,
            waiter_id: call.waiter_id.clone(),
            waiter_name,
            message: call.message.clone(),
            urgency: call.urgency,
            occurred_at: occurred_at.with_timezone(&Utc),
        }
    }

    /// Payload sent to realtime subscribers.
    #[must_use]
    pub fn realtime_payload(&self) -> CallPayload {
        CallPayload {
            call_id: self.call_id.clone(),
            table_id: self.table_id.clone(),
            status: self.status,
            waiter_name: self.waiter_name.clone(),
            table_number: self.table_number,
            urgency: self.urgency,
            occurred_at: self.occurred_at,
        }
    }
}

/// Realtime representation of a call state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallPayload {
    pub call_id: String,
    pub table_id: String,
    pub status: CallStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub waiter_name: Option<String>,
    pub table_number: i32,
    pub urgency: CallUrgency,
    pub occurred_at: DateTime<Utc>,
}

/// A table was silenced or unsilenced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SilenceEvent {
    pub table_id: String,
    pub business_id: String,
    pub silenced: bool,
    pub reason: Option<SilenceReason>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl SilenceEvent {
    /// Event for a silence that just started.
    #[must_use]
    pub fn started(silence: &table_silence::Model) -> Self {
        Self {
            table_id: silence.table_id.clone(),
            business_id: silence.business_id.clone(),
            silenced: true,
            reason: Some(silence.reason),
            expires_at: silence.expires_at().map(|at| at.with_timezone(&Utc)),
        }
    }

    /// Event for a silence that was lifted.
    #[must_use]
    pub fn lifted(silence: &table_silence::Model) -> Self {
        Self {
            table_id: silence.table_id.clone(),
            business_id: silence.business_id.clone(),
            silenced: false,
            reason: None,
            expires_at: None,
        }
    }

    /// Payload sent to realtime subscribers.
    #[must_use]
    pub fn realtime_payload(&self) -> SilencePayload {
        SilencePayload {
            table_id: self.table_id.clone(),
            silenced: self.silenced,
            reason: self.reason,
            expires_at: self.expires_at,
        }
    }
}

/// Realtime representation of a silence change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SilencePayload {
    pub table_id: String,
    pub silenced: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<SilenceReason>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

/// Event types for real-time updates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum RealtimeEvent {
    /// A call changed state.
    CallUpdated(CallEvent),
    /// A table was silenced or unsilenced.
    SilenceChanged(SilenceEvent),
}

/// What subscribers receive on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "body", rename_all = "camelCase")]
pub enum WireEvent {
    Call(CallPayload),
    Silence(SilencePayload),
}

impl RealtimeEvent {
    #[must_use]
    pub fn business_id(&self) -> &str {
        match self {
            Self::CallUpdated(event) => &event.business_id,
            Self::SilenceChanged(event) => &event.business_id,
        }
    }

    #[must_use]
    pub fn table_id(&self) -> &str {
        match self {
            Self::CallUpdated(event) => &event.table_id,
            Self::SilenceChanged(event) => &event.table_id,
        }
    }

    /// The business topic and the table topic, in that order.
    #[must_use]
    pub fn topics(&self) -> [String; 2] {
        [
            topics::business(self.business_id()),
            topics::table(self.table_id()),
        ]
    }

    /// Whether this event belongs on `topic`.
    #[must_use]
    pub fn matches_topic(&self, topic: &str) -> bool {
        self.topics().iter().any(|t| t == topic)
    }

    #[must_use]
    pub fn to_wire(&self) -> WireEvent {
        match self {
            Self::CallUpdated(event) => WireEvent::Call(event.realtime_payload()),
            Self::SilenceChanged(event) => WireEvent::Silence(event.realtime_payload()),
        }
    }
}

/// Trait for publishing real-time events.
///
/// This allows the core services to publish events
/// without directly depending on the queue/pubsub implementation.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish an event to its business and table topics.
    async fn publish(&self, event: &RealtimeEvent) -> AppResult<()>;
}

/// No-op event publisher for testing or when pub/sub is disabled.
pub struct NoOpEventPublisher;

#[async_trait]
impl EventPublisher for NoOpEventPublisher {
    async fn publish(&self, _event: &RealtimeEvent) -> AppResult<()> {
        Ok(())
    }
}

/// In-process fan-out of realtime events.
///
/// Streaming connections subscribe here. With Redis enabled the queue crate
/// forwards events received from other instances into the same bus.
#[derive(Clone)]
pub struct LocalEventBus {
    sender: broadcast::Sender<RealtimeEvent>,
}

impl LocalEventBus {
    /// Create a bus buffering up to `capacity` events per slow subscriber.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to every event published after this call.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<RealtimeEvent> {
        self.sender.subscribe()
    }

    /// Fan an event out to current subscribers. Returns how many received it.
    pub fn send(&self, event: RealtimeEvent) -> usize {
        // No subscribers is not an error
        self.sender.send(event).unwrap_or(0)
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for LocalEventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[async_trait]
impl EventPublisher for LocalEventBus {
    async fn publish(&self, event: &RealtimeEvent) -> AppResult<()> {
        let delivered = self.send(event.clone());
        tracing::trace!(delivered, topic = %topics::business(event.business_id()), "Published locally");
        Ok(())
    }
}

/// Type alias for a shared event publisher.
pub type EventPublisherService = Arc<dyn EventPublisher>;

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn call(status: CallStatus) -> waiter_call::Model {
        let called_at = Utc::now().fixed_offset();
        waiter_call::Model {
            id: "c1".to_string(),
            table_id: "t5".to_string(),
            business_id: "b1".to_string(),
            waiter_id: Some("w1".to_string()),
            status,
            urgency: CallUrgency::High,
            message: "Call from table 5".to_string(),
            metadata: serde_json::json!({}),
            called_at,
            acknowledged_at: Some(called_at + Duration::seconds(30)),
            completed_at: None,
            cancelled_at: None,
        }
    }

    fn table() -> dining_table::Model {
        dining_table::Model {
            id: "t5".to_string(),
            business_id: "b1".to_string(),
            number: 5,
            name: None,
            code: "qr-t5".to_string(),
            notifications_enabled: true,
            active_waiter_id: None,
            waiter_assigned_at: None,
            created_at: Utc::now().fixed_offset(),
            updated_at: None,
        }
    }

    #[test]
    fn test_occurred_at_follows_status() {
        let pending = call(CallStatus::Pending);
        let event = CallEvent::from_call(&pending, &table(), None);
        assert_eq!(event.occurred_at, pending.called_at.with_timezone(&Utc));

        let acknowledged = call(CallStatus::Acknowledged);
        let event = CallEvent::from_call(&acknowledged, &table(), Some("Ana".to_string()));
        assert_eq!(
            Some(event.occurred_at),
            acknowledged.acknowledged_at.map(|at| at.with_timezone(&Utc))
        );
        assert_eq!(event.table_number, 5);
    }

    #[test]
    fn test_realtime_payload_shape() {
        let event = CallEvent::from_call(&call(CallStatus::Pending), &table(), None);
        let json = serde_json::to_value(RealtimeEvent::CallUpdated(event).to_wire()).unwrap();

        assert_eq!(json["type"], "call");
        assert_eq!(json["body"]["call_id"], "c1");
        assert_eq!(json["body"]["status"], "pending");
        assert_eq!(json["body"]["urgency"], "high");
        assert_eq!(json["body"]["table_number"], 5);
        assert!(json["body"].get("waiter_name").is_none());
        assert!(json["body"].get("business_id").is_none());
    }

    #[test]
    fn test_topics() {
        let event = RealtimeEvent::CallUpdated(CallEvent::from_call(
            &call(CallStatus::Pending),
            &table(),
            None,
        ));

        assert_eq!(event.topics(), ["business:b1".to_string(), "table:t5".to_string()]);
        assert!(event.matches_topic("table:t5"));
        assert!(!event.matches_topic("table:t6"));
    }

    #[test]
    fn test_event_survives_pubsub_encoding() {
        let event = RealtimeEvent::SilenceChanged(SilenceEvent {
            table_id: "t5".to_string(),
            business_id: "b1".to_string(),
            silenced: true,
            reason: Some(SilenceReason::Automatic),
            expires_at: Some(Utc::now()),
        });

        let encoded = serde_json::to_string(&event).unwrap();
        let decoded: RealtimeEvent = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, event);
    }

    #[tokio::test]
    async fn test_local_bus_fan_out() {
        let bus = LocalEventBus::new(8);
        let mut first = bus.subscribe();
        let mut second = bus.subscribe();

        let event = RealtimeEvent::CallUpdated(CallEvent::from_call(
            &call(CallStatus::Acknowledged),
            &table(),
            Some("Ana".to_string()),
        ));
        bus.publish(&event).await.unwrap();

        assert_eq!(first.recv().await.unwrap(), event);
        assert_eq!(second.recv().await.unwrap(), event);
    }

    #[tokio::test]
    async fn test_local_bus_without_subscribers() {
        let bus = LocalEventBus::new(8);
        let event = RealtimeEvent::CallUpdated(CallEvent::from_call(
            &call(CallStatus::Pending),
            &table(),
            None,
        ));

        assert!(bus.publish(&event).await.is_ok());
        assert_eq!(bus.subscriber_count(), 0);
    }
}
