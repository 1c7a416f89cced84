//! Scheduled jobs for periodic maintenance tasks.

#![allow(missing_docs)]

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use mozo_common::{AppResult, MaintenanceConfig};
use mozo_core::{CallService, PushNotificationService, SilenceService};
use tokio::task::JoinHandle;
use tokio::time::interval;

/// Scheduler configuration.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Interval for closing lapsed silences (default: 1 minute).
    pub silence_sweep_interval: Duration,
    /// Interval for cancelling stale calls (default: 1 minute).
    pub stale_call_interval: Duration,
    /// Interval for pruning idle device tokens (default: 1 hour).
    pub token_prune_interval: Duration,
    /// Device tokens unused for this many days are deleted.
    pub token_max_idle_days: i64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self::from(&MaintenanceConfig::default())
    }
}

impl From<&MaintenanceConfig> for SchedulerConfig {
    fn from(config: &MaintenanceConfig) -> Self {
        // tokio intervals reject a zero period
        let secs = |s: u64| Duration::from_secs(s.max(1));

        Self {
            silence_sweep_interval: secs(config.silence_sweep_interval_secs),
            stale_call_interval: secs(config.stale_call_sweep_interval_secs),
            token_prune_interval: secs(config.token_prune_interval_secs),
            token_max_idle_days: config.token_max_idle_days,
        }
    }
}

/// Job executor trait for scheduled jobs.
#[async_trait::async_trait]
pub trait MaintenanceExecutor: Send + Sync {
    /// Close silences whose end time has passed.
    async fn close_lapsed_silences(&self) -> AppResult<u64>;

    /// Cancel pending calls nobody picked up.
    async fn cancel_stale_calls(&self) -> AppResult<u64>;

    /// Delete device tokens unused for `max_idle_days`.
    async fn prune_idle_tokens(&self, max_idle_days: i64) -> AppResult<u64>;
}

/// Executor backed by the core services.
#[derive(Clone)]
pub struct ServiceExecutor {
    silences: SilenceService,
    calls: CallService,
    push: PushNotificationService,
}

impl ServiceExecutor {
    #[must_use]
    pub const fn new(
        silences: SilenceService,
        calls: CallService,
        push: PushNotificationService,
    ) -> Self {
        Self {
            silences,
            calls,
            push,
        }
    }
}

#[async_trait::async_trait]
impl MaintenanceExecutor for ServiceExecutor {
    async fn close_lapsed_silences(&self) -> AppResult<u64> {
        self.silences.sweep_lapsed().await
    }

    async fn cancel_stale_calls(&self) -> AppResult<u64> {
        self.calls.cancel_stale().await
    }

    async fn prune_idle_tokens(&self, max_idle_days: i64) -> AppResult<u64> {
        self.push.prune_idle(max_idle_days).await
    }
}

fn spawn_periodic<E, F, Fut>(
    executor: Arc<E>,
    period: Duration,
    job: &'static str,
    run: F,
) -> JoinHandle<()>
where
    E: ?Sized + Send + Sync + 'static,
    F: Fn(Arc<E>) -> Fut + Send + 'static,
    Fut: Future<Output = AppResult<u64>> + Send,
{
    tokio::spawn(async move {
        let mut interval = interval(period);
        loop {
            interval.tick().await;
            match run(executor.clone()).await {
                Ok(count) => {
                    if count > 0 {
                        tracing::info!(count, job, "Maintenance job finished");
                    }
                }
                Err(e) => {
                    tracing::error!(error = %e, job, "Maintenance job failed");
                }
            }
        }
    })
}

/// Run the scheduler with the given configuration and executor.
///
/// Each job runs on its own interval until the returned handles are aborted.
pub fn run_scheduler<E: MaintenanceExecutor + 'static>(
    config: &SchedulerConfig,
    executor: Arc<E>,
) -> Vec<JoinHandle<()>> {
    let max_idle_days = config.token_max_idle_days;

    vec![
        spawn_periodic(
            executor.clone(),
            config.silence_sweep_interval,
            "close_lapsed_silences",
            |e| async move { e.close_lapsed_silences().await },
        ),
        spawn_periodic(
            executor.clone(),
            config.stale_call_interval,
            "cancel_stale_calls",
            |e| async move { e.cancel_stale_calls().await },
        ),
        spawn_periodic(
            executor,
            config.token_prune_interval,
            "prune_idle_tokens",
            move |e| async move { e.prune_idle_tokens(max_idle_days).await },
        ),
    ]
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use mozo_common::AppError;
    use std::sync::atomic::{AtomicU64, Ordering};

    #[derive(Default)]
    struct CountingExecutor {
        silences: AtomicU64,
        calls: AtomicU64,
        tokens: AtomicU64,
    }

    #[async_trait::async_trait]
    impl MaintenanceExecutor for CountingExecutor {
        async fn close_lapsed_silences(&self) -> AppResult<u64> {
            self.silences.fetch_add(1, Ordering::SeqCst);
            Ok(2)
        }

        async fn cancel_stale_calls(&self) -> AppResult<u64> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(AppError::Database("connection reset".to_string()))
        }

        async fn prune_idle_tokens(&self, max_idle_days: i64) -> AppResult<u64> {
            assert_eq!(max_idle_days, 7);
            self.tokens.fetch_add(1, Ordering::SeqCst);
            Ok(0)
        }
    }

    #[test]
    fn test_scheduler_config_default() {
        let config = SchedulerConfig::default();
        assert_eq!(config.silence_sweep_interval, Duration::from_secs(60));
        assert_eq!(config.stale_call_interval, Duration::from_secs(60));
        assert_eq!(config.token_prune_interval, Duration::from_secs(3600));
    }

    #[test]
    fn test_zero_interval_is_clamped() {
        let config = SchedulerConfig::from(&MaintenanceConfig {
            silence_sweep_interval_secs: 0,
            ..MaintenanceConfig::default()
        });
        assert_eq!(config.silence_sweep_interval, Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_jobs_keep_running_after_errors() {
        let config = SchedulerConfig {
            silence_sweep_interval: Duration::from_millis(10),
            stale_call_interval: Duration::from_millis(10),
            token_prune_interval: Duration::from_millis(10),
            token_max_idle_days: 7,
        };
        let executor = Arc::new(CountingExecutor::default());

        let handles = run_scheduler(&config, executor.clone());
        tokio::time::sleep(Duration::from_millis(100)).await;
        for handle in handles {
            handle.abort();
        }

        assert!(executor.silences.load(Ordering::SeqCst) >= 2);
        assert!(executor.calls.load(Ordering::SeqCst) >= 2);
        assert!(executor.tokens.load(Ordering::SeqCst) >= 1);
    }
}
