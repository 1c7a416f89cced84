//! Background work for mozo.
//!
//! This crate provides asynchronous processing using Redis:
//!
//! - **Jobs**: push notification delivery
//! - **Workers**: Concurrent job execution with Apalis
//! - **Pub/Sub**: Realtime event fan-out across server instances
//! - **Retry**: Exponential backoff for failed pushes
//! - **Scheduler**: Periodic maintenance (lapsed silences, stale calls, idle tokens)

pub mod delivery_impl;
pub mod jobs;
pub mod pubsub;
pub mod retry;
pub mod scheduler;
pub mod workers;

pub use delivery_impl::RedisPushDelivery;
pub use jobs::*;
pub use pubsub::{RedisPubSub, channels as pubsub_channels};
pub use retry::RetryConfig;
pub use scheduler::{
    MaintenanceExecutor, SchedulerConfig, ServiceExecutor, run_scheduler,
};
pub use workers::*;
