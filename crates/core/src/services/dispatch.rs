//! Fan-out of call and silence changes to realtime subscribers and devices.

use mozo_db::entities::{dining_table, waiter_call, waiter_call::CallStatus};

use super::delivery::PushDeliveryService;
use super::event_publisher::{CallEvent, EventPublisherService, RealtimeEvent, SilenceEvent};
use super::profile::ProfileService;
use super::push_notification::PushRequest;
use mozo_common::AppResult;

/// What a dispatch reached.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchOutcome {
    pub realtime: bool,
    pub push_recipients: usize,
}

/// Notifies staff about state changes.
///
/// Dispatch never fails the operation that triggered it: delivery problems
/// are logged and the committed state stands. Subscribers that miss an
/// event catch up from the pending queue.
#[derive(Clone)]
pub struct DispatchService {
    publisher: EventPublisherService,
    push: PushDeliveryService,
    profiles: ProfileService,
}

impl DispatchService {
    #[must_use]
    pub fn new(
        publisher: EventPublisherService,
        push: PushDeliveryService,
        profiles: ProfileService,
    ) -> Self {
        Self {
            publisher,
            push,
            profiles,
        }
    }

    /// Announce the current state of a call.
    pub async fn call_changed(
        &self,
        call: &waiter_call::Model,
        table: &dining_table::Model,
    ) -> DispatchOutcome {
        let waiter_name = match &call.waiter_id {
            Some(waiter_id) => self
                .profiles
                .waiter_name(waiter_id)
                .await
                .unwrap_or_else(|e| {
                    tracing::warn!(waiter_id = %waiter_id, error = %e, "Failed to load waiter name");
                    None
                }),
            None => None,
        };

        let event = CallEvent::from_call(call, table, waiter_name);
        let realtime = self.publish(&RealtimeEvent::CallUpdated(event.clone())).await;

        let recipients = match self.push_recipients(&event, table).await {
            Ok(recipients) => recipients,
            Err(e) => {
                tracing::warn!(call_id = %call.id, error = %e, "Failed to resolve push recipients");
                vec![]
            }
        };

        let mut push_recipients = 0;
        if !recipients.is_empty() {
            let count = recipients.len();
            match self.push.deliver(PushRequest::for_call(&event, recipients)).await {
                Ok(()) => push_recipients = count,
                Err(e) => {
                    tracing::warn!(call_id = %call.id, error = %e, "Failed to hand off push");
                }
            }
        }

        tracing::debug!(
            call_id = %call.id,
            status = call.status.as_str(),
            realtime,
            push_recipients,
            "Dispatched call update"
        );

        DispatchOutcome {
            realtime,
            push_recipients,
        }
    }

    /// Announce that a table was silenced or unsilenced.
    pub async fn silence_changed(&self, event: SilenceEvent) -> bool {
        self.publish(&RealtimeEvent::SilenceChanged(event)).await
    }

    async fn publish(&self, event: &RealtimeEvent) -> bool {
        match self.publisher.publish(event).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(
                    table_id = %event.table_id(),
                    error = %e,
                    "Failed to publish realtime event"
                );
                false
            }
        }
    }

    /// New calls go to the table's waiter, or to every active waiter when
    /// nobody holds the table. Later states are only pushed when nobody
    /// holds the table, skipping the waiter who made the change.
    async fn push_recipients(
        &self,
        event: &CallEvent,
        table: &dining_table::Model,
    ) -> AppResult<Vec<String>> {
        match (&table.active_waiter_id, event.status) {
            (Some(waiter_id), CallStatus::Pending) => Ok(vec![waiter_id.clone()]),
            (Some(_), _) => Ok(vec![]),
            (None, status) => {
                let mut ids = self.profiles.active_waiter_ids(&event.business_id).await?;
                if status != CallStatus::Pending {
                    if let Some(actor) = &event.waiter_id {
                        ids.retain(|id| id != actor);
                    }
                }
                Ok(ids)
            }
        }
    }
}
