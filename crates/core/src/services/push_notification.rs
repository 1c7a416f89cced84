//! Push notification service for mobile and web devices.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use mozo_common::{AppError, AppResult, IdGenerator};
use mozo_db::entities::{
    device_token::{self, DevicePlatform},
    waiter_call::CallStatus,
};
use mozo_db::repositories::DeviceTokenRepository;
use sea_orm::Set;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use validator::Validate;

use super::event_publisher::CallEvent;

/// Notification types that can be sent via push.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PushNotificationType {
    /// A table is calling
    NewCall,
    /// A waiter is on the way
    Acknowledged,
    /// The call was served
    Completed,
    /// The call was withdrawn
    Cancelled,
}

impl From<CallStatus> for PushNotificationType {
    fn from(status: CallStatus) -> Self {
        match status {
            CallStatus::Pending => Self::NewCall,
            CallStatus::Acknowledged => Self::Acknowledged,
            CallStatus::Completed => Self::Completed,
            CallStatus::Cancelled => Self::Cancelled,
        }
    }
}

impl std::fmt::Display for PushNotificationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::NewCall => "new_call",
            Self::Acknowledged => "acknowledged",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        };
        write!(f, "{s}")
    }
}

/// Delivery priority hint for the push provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PushPriority {
    High,
    #[default]
    Normal,
}

/// Data section of a push payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushData {
    pub call_id: String,
    pub table_id: String,
    pub status: CallStatus,
}

/// Push notification payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushPayload {
    /// Notification type
    #[serde(rename = "type")]
    pub notification_type: PushNotificationType,
    /// Notification title
    pub title: String,
    /// Notification body
    pub body: String,
    /// Call reference
    pub data: PushData,
}

impl PushPayload {
    /// Render the push payload for a call event.
    #[must_use]
    pub fn for_call(event: &CallEvent) -> Self {
        let body = match event.status {
            CallStatus::Pending => event.message.clone(),
            status => format!("Table {} {}", event.table_number, status.as_str()),
        };

        Self {
            notification_type: event.status.into(),
            title: format!("Table {}", event.table_number),
            body,
            data: PushData {
                call_id: event.call_id.clone(),
                table_id: event.table_id.clone(),
                status: event.status,
            },
        }
    }

    /// Flat string map for providers that only accept string data values.
    #[must_use]
    pub fn data_map(&self) -> Vec<(&'static str, String)> {
        vec![
            ("type", self.notification_type.to_string()),
            ("call_id", self.data.call_id.clone()),
            ("table_id", self.data.table_id.clone()),
            ("status", self.data.status.as_str().to_string()),
        ]
    }
}

/// A push to send to every device of a set of users.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushRequest {
    pub user_ids: Vec<String>,
    pub payload: PushPayload,
    #[serde(default)]
    pub priority: PushPriority,
}

impl PushRequest {
    /// Push for a call event. New calls go out with high priority.
    #[must_use]
    pub fn for_call(event: &CallEvent, user_ids: Vec<String>) -> Self {
        let priority = if event.status == CallStatus::Pending {
            PushPriority::High
        } else {
            PushPriority::Normal
        };

        Self {
            user_ids,
            payload: PushPayload::for_call(event),
            priority,
        }
    }
}

/// Why a single push could not be sent.
#[derive(Debug, thiserror::Error)]
pub enum PushSendError {
    /// The provider no longer accepts this token; it should be deleted.
    #[error("device token is no longer valid")]
    InvalidToken,
    /// Anything else. The token is kept.
    #[error("push transport error: {0}")]
    Transport(String),
}

/// Transport that sends one payload to one device token.
#[async_trait]
pub trait PushSender: Send + Sync {
    async fn send(
        &self,
        token: &str,
        payload: &PushPayload,
        priority: PushPriority,
    ) -> Result<(), PushSendError>;
}

/// Sender used when no push provider is configured.
pub struct NoOpPushSender;

#[async_trait]
impl PushSender for NoOpPushSender {
    async fn send(
        &self,
        _token: &str,
        payload: &PushPayload,
        _priority: PushPriority,
    ) -> Result<(), PushSendError> {
        tracing::debug!(call_id = %payload.data.call_id, "Push provider not configured, skipping");
        Ok(())
    }
}

/// Outcome of sending one push request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushReport {
    pub sent: usize,
    pub failed: usize,
    pub pruned: u64,
}

impl PushReport {
    /// Every attempt failed with a transport error.
    #[must_use]
    pub const fn is_total_failure(&self) -> bool {
        self.failed > 0 && self.sent == 0
    }
}

/// Input for registering a device token.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct RegisterDeviceInput {
    #[validate(length(min = 1, max = 4096))]
    pub token: String,
    pub platform: DevicePlatform,
    #[validate(length(max = 100))]
    pub device_name: Option<String>,
}

/// Push notification service.
#[derive(Clone)]
pub struct PushNotificationService {
    repo: DeviceTokenRepository,
    sender: Arc<dyn PushSender>,
    id_gen: IdGenerator,
}

impl PushNotificationService {
    /// Create a new push notification service.
    #[must_use]
    pub fn new(repo: DeviceTokenRepository, sender: Arc<dyn PushSender>) -> Self {
        Self {
            repo,
            sender,
            id_gen: IdGenerator::new(),
        }
    }

    /// Register a device token, or refresh it if the user already has it.
    pub async fn register(
        &self,
        user_id: &str,
        input: RegisterDeviceInput,
    ) -> AppResult<device_token::Model> {
        input
            .validate()
            .map_err(|e| AppError::Validation(e.to_string()))?;

        let now = Utc::now().fixed_offset();

        if let Some(existing) = self.repo.find_by_user_and_token(user_id, &input.token).await? {
            return self
                .repo
                .refresh(existing, input.platform, input.device_name, now)
                .await;
        }

        let model = device_token::ActiveModel {
            id: Set(self.id_gen.generate()),
            user_id: Set(user_id.to_string()),
            token: Set(input.token.clone()),
            platform: Set(input.platform),
            device_name: Set(input.device_name.clone()),
            last_used_at: Set(now),
            created_at: Set(now),
        };

        match self.repo.create(model).await {
            Err(AppError::Conflict(_)) => {
                // Registered concurrently by another request
                let existing = self
                    .repo
                    .find_by_user_and_token(user_id, &input.token)
                    .await?
                    .ok_or_else(|| AppError::Internal("device token vanished".to_string()))?;
                self.repo
                    .refresh(existing, input.platform, input.device_name, now)
                    .await
            }
            result => result,
        }
    }

    /// Remove a device token of a user.
    pub async fn unregister(&self, user_id: &str, token: &str) -> AppResult<()> {
        let deleted = self.repo.delete_for_user(user_id, token).await?;
        if deleted == 0 {
            return Err(AppError::NotFound("Device token not found".to_string()));
        }
        Ok(())
    }

    /// List the device tokens of a user.
    pub async fn list(&self, user_id: &str) -> AppResult<Vec<device_token::Model>> {
        self.repo.find_by_user(user_id).await
    }

    /// Delete tokens unused for `max_idle_days`.
    pub async fn prune_idle(&self, max_idle_days: i64) -> AppResult<u64> {
        let before = Utc::now().fixed_offset() - Duration::days(max_idle_days);
        self.repo.delete_idle(before).await
    }

    /// Send a push to every device of the requested users.
    ///
    /// Tokens the provider rejects are deleted; delivered tokens get their
    /// last use refreshed. Transport failures are counted, not returned.
    pub async fn send(&self, request: &PushRequest) -> AppResult<PushReport> {
        let tokens = self.repo.find_by_users(&request.user_ids).await?;
        let mut report = PushReport::default();

        if tokens.is_empty() {
            tracing::debug!(
                call_id = %request.payload.data.call_id,
                users = request.user_ids.len(),
                "No device tokens for push recipients"
            );
            return Ok(report);
        }

        let mut delivered = Vec::new();
        let mut invalid = Vec::new();

        for token in tokens {
            match self
                .sender
                .send(&token.token, &request.payload, request.priority)
                .await
            {
                Ok(()) => {
                    delivered.push(token.id);
                    report.sent += 1;
                }
                Err(PushSendError::InvalidToken) => {
                    tracing::info!(token_id = %token.id, "Removing invalid device token");
                    invalid.push(token.id);
                }
                Err(e) => {
                    tracing::warn!(
                        token_id = %token.id,
                        error = %e,
                        "Failed to send push notification"
                    );
                    report.failed += 1;
                }
            }
        }

        if let Err(e) = self.repo.touch(&delivered, Utc::now().fixed_offset()).await {
            tracing::warn!(error = %e, "Failed to refresh device token usage");
        }

        report.pruned = match self.repo.delete_by_ids(&invalid).await {
            Ok(count) => count,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to delete invalid device tokens");
                0
            }
        };

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult};
    use std::sync::Mutex;

    struct ScriptedSender {
        invalid: Vec<&'static str>,
        broken: Vec<&'static str>,
        seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl PushSender for ScriptedSender {
        async fn send(
            &self,
            token: &str,
            _payload: &PushPayload,
            _priority: PushPriority,
        ) -> Result<(), PushSendError> {
            self.seen.lock().unwrap().push(token.to_string());
            if self.invalid.contains(&token) {
                Err(PushSendError::InvalidToken)
            } else if self.broken.contains(&token) {
                Err(PushSendError::Transport("timeout".to_string()))
            } else {
                Ok(())
            }
        }
    }

    fn token(id: &str, value: &str) -> device_token::Model {
        let now = Utc::now().fixed_offset();
        device_token::Model {
            id: id.to_string(),
            user_id: "w1".to_string(),
            token: value.to_string(),
            platform: DevicePlatform::Android,
            device_name: None,
            last_used_at: now,
            created_at: now,
        }
    }

    fn event(status: CallStatus, waiter_name: Option<&str>) -> CallEvent {
        CallEvent {
            call_id: "c1".to_string(),
            table_id: "t5".to_string(),
            table_number: 5,
            business_id: "b1".to_string(),
            status,
            waiter_id: None,
            waiter_name: waiter_name.map(ToString::to_string),
            message: "Call from table 5".to_string(),
            urgency: mozo_db::entities::waiter_call::CallUrgency::Normal,
            occurred_at: Utc::now(),
        }
    }

    #[test]
    fn test_payload_for_new_call() {
        let payload = PushPayload::for_call(&event(CallStatus::Pending, None));
        let json = serde_json::to_value(&payload).unwrap();

        assert_eq!(json["type"], "new_call");
        assert_eq!(json["title"], "Table 5");
        assert_eq!(json["body"], "Call from table 5");
        assert_eq!(json["data"]["call_id"], "c1");
        assert_eq!(json["data"]["table_id"], "t5");
        assert_eq!(json["data"]["status"], "pending");
    }

    #[test]
    fn test_payload_for_follow_up_states() {
        let payload = PushPayload::for_call(&event(CallStatus::Acknowledged, Some("Ana")));
        assert_eq!(payload.body, "Table 5 acknowledged");
        assert_eq!(payload.notification_type, PushNotificationType::Acknowledged);

        let payload = PushPayload::for_call(&event(CallStatus::Cancelled, None));
        assert_eq!(payload.body, "Table 5 cancelled");
        assert_eq!(payload.data.status, CallStatus::Cancelled);
    }

    #[test]
    fn test_request_priority() {
        let pending = PushRequest::for_call(&event(CallStatus::Pending, None), vec![]);
        let cancelled = PushRequest::for_call(&event(CallStatus::Cancelled, None), vec![]);

        assert_eq!(pending.priority, PushPriority::High);
        assert_eq!(cancelled.priority, PushPriority::Normal);
    }

    #[tokio::test]
    async fn test_send_prunes_invalid_tokens() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[
                    token("d1", "good"),
                    token("d2", "gone"),
                    token("d3", "flaky"),
                ]])
                // touch
                .append_exec_results([MockExecResult {
                    last_insert_id: 0,
                    rows_affected: 1,
                }])
                // delete invalid
                .append_exec_results([MockExecResult {
                    last_insert_id: 0,
                    rows_affected: 1,
                }])
                .into_connection(),
        );
        let sender = Arc::new(ScriptedSender {
            invalid: vec!["gone"],
            broken: vec!["flaky"],
            seen: Mutex::new(vec![]),
        });

        let service = PushNotificationService::new(DeviceTokenRepository::new(db), sender.clone());
        let request = PushRequest::for_call(&event(CallStatus::Pending, None), vec!["w1".to_string()]);
        let report = service.send(&request).await.unwrap();

        assert_eq!(report.sent, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(report.pruned, 1);
        assert!(!report.is_total_failure());
        assert_eq!(sender.seen.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_send_without_tokens() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([Vec::<device_token::Model>::new()])
                .into_connection(),
        );

        let service =
            PushNotificationService::new(DeviceTokenRepository::new(db), Arc::new(NoOpPushSender));
        let request = PushRequest::for_call(&event(CallStatus::Pending, None), vec!["w1".to_string()]);

        assert_eq!(service.send(&request).await.unwrap(), PushReport::default());
    }

    #[tokio::test]
    async fn test_register_rejects_empty_token() {
        let db = Arc::new(MockDatabase::new(DatabaseBackend::Postgres).into_connection());
        let service =
            PushNotificationService::new(DeviceTokenRepository::new(db), Arc::new(NoOpPushSender));

        let result = service
            .register(
                "w1",
                RegisterDeviceInput {
                    token: String::new(),
                    platform: DevicePlatform::Ios,
                    device_name: None,
                },
            )
            .await;

        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn test_unregister_unknown_token() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_exec_results([MockExecResult {
                    last_insert_id: 0,
                    rows_affected: 0,
                }])
                .into_connection(),
        );
        let service =
            PushNotificationService::new(DeviceTokenRepository::new(db), Arc::new(NoOpPushSender));

        let result = service.unregister("w1", "missing").await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }
}
