//! Redis-backed push delivery implementation.
//!
//! This module provides a Redis-based implementation of the `PushDelivery` trait
//! that queues jobs for the apalis worker to process.

use apalis::prelude::*;
use async_trait::async_trait;
use mozo_common::{AppError, AppResult};
use mozo_core::{PushDelivery, PushRequest};

use crate::jobs::PushJob;

/// Redis-backed push delivery service.
///
/// This implementation queues push jobs to Redis for processing by
/// the apalis push worker.
#[derive(Clone)]
pub struct RedisPushDelivery {
    /// Redis storage for job queue (apalis-redis).
    storage: apalis_redis::RedisStorage<PushJob>,
}

impl RedisPushDelivery {
    /// Create a new Redis push delivery service.
    #[must_use]
    pub const fn new(storage: apalis_redis::RedisStorage<PushJob>) -> Self {
        Self { storage }
    }
}

#[async_trait]
impl PushDelivery for RedisPushDelivery {
    async fn deliver(&self, request: PushRequest) -> AppResult<()> {
        let job = PushJob::new(request);

        tracing::debug!(
            call_id = %job.call_id(),
            recipients = job.request.user_ids.len(),
            "Queueing push job"
        );

        self.storage
            .clone()
            .push(job)
            .await
            .map_err(|e| AppError::Queue(format!("Failed to queue job: {e}")))?;

        Ok(())
    }
}
