//! Push worker.

use std::time::Duration;

use apalis::prelude::*;
use apalis_redis::RedisStorage;
use chrono::{DateTime, Utc};
use mozo_core::{PushNotificationService, PushReport};
use tracing::{error, info, warn};

use crate::jobs::PushJob;
use crate::retry::RetryConfig;

/// Context for the push worker.
#[derive(Clone)]
pub struct PushContext {
    pub service: PushNotificationService,
    pub retry: RetryConfig,
    /// Where retries are scheduled.
    pub storage: RedisStorage<PushJob>,
}

impl PushContext {
    /// Create a new push context.
    #[must_use]
    pub const fn new(
        service: PushNotificationService,
        retry: RetryConfig,
        storage: RedisStorage<PushJob>,
    ) -> Self {
        Self {
            service,
            retry,
            storage,
        }
    }
}

/// What became of one attempt.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum JobOutcome {
    Delivered(PushReport),
    Retry { delay: Duration, reason: String },
    GaveUp(String),
}

/// Send the push once and decide whether it needs another attempt.
///
/// Only a push that reached no device at all is retried; partial delivery
/// counts as done.
pub(crate) async fn attempt_push(
    service: &PushNotificationService,
    retry: &RetryConfig,
    job: &PushJob,
) -> JobOutcome {
    let reason = match service.send(&job.request).await {
        Ok(report) if !report.is_total_failure() => return JobOutcome::Delivered(report),
        Ok(report) => format!("all {} sends failed", report.failed),
        Err(e) => e.to_string(),
    };

    match retry.plan(job.attempt) {
        Some(delay) => JobOutcome::Retry { delay, reason },
        None => JobOutcome::GaveUp(reason),
    }
}

/// Worker function for sending push notifications.
///
/// # Errors
/// Returns an error once the job has exhausted its attempts.
pub async fn push_worker(job: PushJob, ctx: Data<PushContext>) -> Result<(), Error> {
    info!(
        call_id = %job.call_id(),
        recipients = job.request.user_ids.len(),
        attempt = job.attempt,
        "Sending push"
    );

    match attempt_push(&ctx.service, &ctx.retry, &job).await {
        JobOutcome::Delivered(report) => {
            info!(
                call_id = %job.call_id(),
                sent = report.sent,
                failed = report.failed,
                pruned = report.pruned,
                "Push delivered"
            );
            Ok(())
        }
        JobOutcome::Retry { delay, reason } => {
            warn!(
                call_id = %job.call_id(),
                attempt = job.attempt,
                retry_in_secs = delay.as_secs(),
                reason = %reason,
                "Push failed, retrying"
            );
            let call_id = job.call_id().to_string();
            let mut storage = ctx.storage.clone();
            storage
                .schedule(job.next_attempt(), retry_at(Utc::now(), delay))
                .await
                .map_err(|e| {
                    error!(call_id = %call_id, error = %e, "Failed to schedule push retry");
                    let e: Box<dyn std::error::Error + Send + Sync> = e.into();
                    Error::Failed(e.into())
                })?;
            Ok(())
        }
        JobOutcome::GaveUp(reason) => {
            error!(call_id = %job.call_id(), attempt = job.attempt, reason = %reason, "Giving up on push");
            let e: Box<dyn std::error::Error + Send + Sync> = reason.into();
            Err(Error::Failed(e.into()))
        }
    }
}

/// Unix time (seconds) at which a retry `delay` after `now` becomes due.
fn retry_at(now: DateTime<Utc>, delay: Duration) -> i64 {
    let delay = i64::try_from(delay.as_secs()).unwrap_or(i64::MAX);
    now.timestamp().saturating_add(delay)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use mozo_core::{PushData, PushNotificationType, PushPayload, PushPriority, PushRequest};
    use mozo_core::{PushSendError, PushSender};
    use mozo_db::entities::device_token;
    use mozo_db::entities::waiter_call::CallStatus;
    use mozo_db::repositories::DeviceTokenRepository;
    use sea_orm::{DatabaseBackend, MockDatabase};
    use std::sync::Arc;

    struct BrokenSender;

    #[async_trait]
    impl PushSender for BrokenSender {
        async fn send(
            &self,
            _token: &str,
            _payload: &PushPayload,
            _priority: PushPriority,
        ) -> Result<(), PushSendError> {
            Err(PushSendError::Transport("503".to_string()))
        }
    }

    fn job(attempt: u32) -> PushJob {
        PushJob {
            request: PushRequest {
                user_ids: vec!["w1".to_string()],
                payload: PushPayload {
                    notification_type: PushNotificationType::NewCall,
                    title: "Table 5".to_string(),
                    body: "Call from table 5".to_string(),
                    data: PushData {
                        call_id: "c1".to_string(),
                        table_id: "t5".to_string(),
                        status: CallStatus::Pending,
                    },
                },
                priority: PushPriority::High,
            },
            attempt,
        }
    }

    fn token() -> device_token::Model {
        let now = Utc::now().fixed_offset();
        device_token::Model {
            id: "d1".to_string(),
            user_id: "w1".to_string(),
            token: "fcm-token".to_string(),
            platform: device_token::DevicePlatform::Android,
            device_name: None,
            last_used_at: now,
            created_at: now,
        }
    }

    fn service(tokens: Vec<device_token::Model>) -> PushNotificationService {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([tokens])
            .into_connection();
        PushNotificationService::new(
            DeviceTokenRepository::new(Arc::new(db)),
            Arc::new(BrokenSender),
        )
    }

    #[tokio::test]
    async fn test_nothing_to_send_is_delivered() {
        let outcome = attempt_push(&service(vec![]), &RetryConfig::default(), &job(0)).await;
        assert_eq!(outcome, JobOutcome::Delivered(PushReport::default()));
    }

    #[tokio::test]
    async fn test_total_failure_is_retried() {
        let retry = RetryConfig::with_max_attempts(3);

        let outcome = attempt_push(&service(vec![token()]), &retry, &job(0)).await;
        assert!(matches!(outcome, JobOutcome::Retry { delay, .. } if delay == Duration::from_secs(5)));
    }

    #[tokio::test]
    async fn test_last_attempt_gives_up() {
        let retry = RetryConfig::with_max_attempts(3);

        let outcome = attempt_push(&service(vec![token()]), &retry, &job(2)).await;
        assert_eq!(outcome, JobOutcome::GaveUp("all 1 sends failed".to_string()));
    }

    #[test]
    fn test_retry_is_due_after_delay() {
        let now = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();

        assert_eq!(retry_at(now, Duration::from_secs(5)), now.timestamp() + 5);
        assert_eq!(retry_at(now, Duration::from_secs(300)), now.timestamp() + 300);
        assert_eq!(retry_at(now, Duration::MAX), i64::MAX);
    }

    #[test]
    fn test_next_attempt() {
        let next = job(0).next_attempt().next_attempt();
        assert_eq!(next.attempt, 2);
        assert_eq!(next.call_id(), "c1");
    }
}
