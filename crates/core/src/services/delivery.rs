//! Push delivery service.
//!
//! Provides an abstraction for handing push requests off the request path.
//! [`DirectPushDelivery`] sends from a detached task; the queue crate
//! provides a Redis-backed implementation with retries.

use async_trait::async_trait;
use mozo_common::AppResult;
use std::sync::Arc;

use super::push_notification::{PushNotificationService, PushRequest};

/// Trait for push delivery.
///
/// This allows the core services to hand off pushes
/// without directly depending on the queue implementation.
#[async_trait]
pub trait PushDelivery: Send + Sync {
    /// Hand off a push request. Returns once the request is accepted,
    /// not when it reaches devices.
    async fn deliver(&self, request: PushRequest) -> AppResult<()>;
}

/// A no-op implementation of `PushDelivery` for testing or when push is disabled.
#[derive(Clone, Default)]
pub struct NoOpPushDelivery;

#[async_trait]
impl PushDelivery for NoOpPushDelivery {
    async fn deliver(&self, _request: PushRequest) -> AppResult<()> {
        Ok(())
    }
}

/// Sends each request from a spawned task, without retries.
#[derive(Clone)]
pub struct DirectPushDelivery {
    service: PushNotificationService,
}

impl DirectPushDelivery {
    #[must_use]
    pub const fn new(service: PushNotificationService) -> Self {
        Self { service }
    }
}

#[async_trait]
impl PushDelivery for DirectPushDelivery {
    async fn deliver(&self, request: PushRequest) -> AppResult<()> {
        let service = self.service.clone();
        tokio::spawn(async move {
            match service.send(&request).await {
                Ok(report) => tracing::debug!(
                    call_id = %request.payload.data.call_id,
                    sent = report.sent,
                    failed = report.failed,
                    pruned = report.pruned,
                    "Push delivered"
                ),
                Err(e) => tracing::warn!(
                    call_id = %request.payload.data.call_id,
                    error = %e,
                    "Push delivery failed"
                ),
            }
        });
        Ok(())
    }
}

/// Wrapper for boxed `PushDelivery` trait object.
pub type PushDeliveryService = Arc<dyn PushDelivery>;
