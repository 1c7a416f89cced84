//! Business logic services.

#![allow(missing_docs)]

pub mod call;
pub mod delivery;
pub mod dispatch;
pub mod event_publisher;
pub mod fcm;
pub mod history;
pub mod ip_block;
pub mod profile;
pub mod push_notification;
pub mod silence;
pub mod table;

pub use call::{CallCompletion, CallIntake, CallOrigin, CallService, CreateCallInput, QueuedCall};
pub use delivery::{DirectPushDelivery, NoOpPushDelivery, PushDelivery, PushDeliveryService};
pub use dispatch::{DispatchOutcome, DispatchService};
pub use event_publisher::{
    CallEvent, CallPayload, EventPublisher, EventPublisherService, LocalEventBus,
    NoOpEventPublisher, RealtimeEvent, SilenceEvent, SilencePayload, WireEvent, topics,
};
pub use fcm::FcmClient;
pub use history::{
    CallStats, HistoryFilter, HistoryItem, HistoryPage, HistoryParams, HistoryService,
    efficiency_score,
};
pub use ip_block::{BlockCallerInput, BlockOutcome, IpBlockService};
pub use profile::{Profile, ProfileService, Staff};
pub use push_notification::{
    NoOpPushSender, PushData, PushNotificationService, PushNotificationType, PushPayload,
    PushPriority, PushReport, PushRequest, PushSendError, PushSender, RegisterDeviceInput,
};
pub use silence::{
    BulkItemResult, BulkSilenceReport, MAX_BULK_TABLES, MAX_SILENCE_MINUTES, SilenceInput,
    SilenceRequest, SilenceService, SilenceView,
};
pub use table::{Deactivation, NotificationsInput, TableOverview, TableRef, TableService};
