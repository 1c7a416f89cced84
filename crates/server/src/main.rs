//! mozo server entry point.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use apalis::prelude::*;
use axum::{Router, middleware, routing::get};
use mozo_api::{
    AppState, RateLimiterState, auth_middleware, health, rate_limit_middleware,
    router as api_router, streaming_handler,
};
use mozo_common::{Config, LogFormat, PushConfig};
use mozo_core::{
    CallService, DirectPushDelivery, DispatchService, EventPublisherService, FcmClient,
    HistoryService, IpBlockService, LocalEventBus, NoOpPushDelivery, NoOpPushSender,
    ProfileService, PushDeliveryService, PushNotificationService, PushSender, SilenceService,
    TableService,
};
use mozo_db::repositories::{
    DeviceTokenRepository, DiningTableRepository, IpBlockRepository, StaffProfileRepository,
    TableSilenceRepository, UserRepository, WaiterCallRepository,
};
use mozo_queue::{
    PushContext, PushJob, RedisPubSub, RedisPushDelivery, RetryConfig, SchedulerConfig,
    ServiceExecutor, push_worker, run_scheduler,
};
use tokio::signal;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

type BoxError = Box<dyn std::error::Error>;

/// Interval for dropping idle rate limiter windows.
const RATE_LIMIT_CLEANUP_INTERVAL: Duration = Duration::from_secs(300);

/// Waits for a shutdown signal (SIGINT or SIGTERM).
///
/// On Unix systems, this listens for both SIGINT (Ctrl+C) and SIGTERM.
/// On Windows, this only listens for Ctrl+C.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received SIGINT, initiating graceful shutdown...");
        },
        () = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown...");
        },
    }
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "mozo=info,tower_http=debug".into());
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
    }
}

fn push_sender(config: &PushConfig) -> Result<Arc<dyn PushSender>, BoxError> {
    match (&config.fcm, config.enabled) {
        (Some(fcm), true) => {
            let client = FcmClient::new(fcm.clone(), Duration::from_secs(config.timeout_secs))?;
            info!(project_id = %fcm.project_id, "FCM push enabled");
            Ok(Arc::new(client))
        }
        _ => {
            info!("Push provider not configured, pushes are skipped");
            Ok(Arc::new(NoOpPushSender))
        }
    }
}

/// Pick the push hand-off and start the queue worker when it is used.
async fn push_delivery(
    config: &Config,
    service: &PushNotificationService,
) -> Result<PushDeliveryService, BoxError> {
    if !config.push.enabled {
        return Ok(Arc::new(NoOpPushDelivery));
    }
    if !config.push.use_queue {
        return Ok(Arc::new(DirectPushDelivery::new(service.clone())));
    }

    info!("Connecting to Redis job queue...");
    let redis_client = redis::Client::open(config.redis.url.as_str())?;
    let redis_conn = redis::aio::ConnectionManager::new(redis_client).await?;
    let storage = apalis_redis::RedisStorage::<PushJob>::new(redis_conn);

    let ctx = PushContext::new(
        service.clone(),
        RetryConfig::with_max_attempts(config.push.max_attempts),
        storage.clone(),
    );

    let worker_storage = storage.clone();
    tokio::spawn(async move {
        let monitor = Monitor::new().register({
            WorkerBuilder::new("push")
                .data(ctx)
                .backend(worker_storage)
                .build_fn(push_worker)
        });

        if let Err(e) = monitor.run().await {
            tracing::error!(error = %e, "Push worker failed");
        }
    });
    info!("Push worker started");

    Ok(Arc::new(RedisPushDelivery::new(storage)))
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    // Load configuration
    let config = Config::load()?;
    config.validate()?;

    init_tracing(config.logging.format);
    info!("Starting mozo server...");

    // Connect to database
    let db = mozo_db::init(&config).await?;
    info!("Connected to database");

    info!("Running database migrations...");
    mozo_db::migrate(&db).await?;
    info!("Migrations completed");

    let db = Arc::new(db);

    // Repositories
    let user_repo = UserRepository::new(Arc::clone(&db));
    let staff_profile_repo = StaffProfileRepository::new(Arc::clone(&db));
    let table_repo = DiningTableRepository::new(Arc::clone(&db));
    let call_repo = WaiterCallRepository::new(Arc::clone(&db));
    let silence_repo = TableSilenceRepository::new(Arc::clone(&db));
    let ip_block_repo = IpBlockRepository::new(Arc::clone(&db));
    let device_token_repo = DeviceTokenRepository::new(Arc::clone(&db));

    // Realtime fan-out
    let events = LocalEventBus::default();
    let pubsub = if config.realtime.use_redis {
        let pubsub =
            RedisPubSub::new(&config.redis.url, &config.redis.prefix, events.clone()).await?;
        pubsub.start().await?;
        Some(pubsub)
    } else {
        info!("Redis pub/sub disabled, events stay in this process");
        None
    };
    let publisher: EventPublisherService = match &pubsub {
        Some(pubsub) => Arc::new(pubsub.clone()),
        None => Arc::new(events.clone()),
    };

    // Push
    let push_notification_service =
        PushNotificationService::new(device_token_repo, push_sender(&config.push)?);
    let delivery = push_delivery(&config, &push_notification_service).await?;

    // Services
    let profile_service = ProfileService::new(staff_profile_repo);
    let dispatch = DispatchService::new(publisher, delivery, profile_service.clone());
    let silence_service =
        SilenceService::new(silence_repo.clone(), table_repo.clone(), dispatch.clone());
    let call_service = CallService::new(
        call_repo.clone(),
        table_repo.clone(),
        ip_block_repo.clone(),
        silence_service.clone(),
        dispatch,
        config.calls.clone(),
    );
    let table_service = TableService::new(
        table_repo.clone(),
        silence_repo,
        call_repo.clone(),
        call_service.clone(),
    );
    let history_service = HistoryService::new(call_repo.clone(), table_repo.clone());
    let ip_block_service =
        IpBlockService::new(ip_block_repo, call_repo, table_repo, silence_service.clone());

    // Rate limiting
    let rate_limiter = RateLimiterState::new();
    {
        let rate_limiter = rate_limiter.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(RATE_LIMIT_CLEANUP_INTERVAL);
            loop {
                interval.tick().await;
                rate_limiter.cleanup().await;
            }
        });
    }

    // Maintenance
    let scheduler = if config.maintenance.enabled {
        let executor = ServiceExecutor::new(
            silence_service.clone(),
            call_service.clone(),
            push_notification_service.clone(),
        );
        let handles = run_scheduler(
            &SchedulerConfig::from(&config.maintenance),
            Arc::new(executor),
        );
        info!("Maintenance scheduler started");
        handles
    } else {
        Vec::new()
    };

    let state = AppState {
        user_repository: user_repo,
        profile_service,
        call_service,
        silence_service,
        table_service,
        history_service,
        ip_block_service,
        push_notification_service,
        events,
        rate_limiter: rate_limiter.clone(),
    };

    // Build router
    let app = Router::new()
        .route("/health", get(health))
        .route("/streaming", get(streaming_handler))
        .nest("/api", api_router(rate_limiter.clone()))
        .layer(middleware::from_fn_with_state(
            rate_limiter,
            rate_limit_middleware,
        ))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state);

    // Start server with graceful shutdown
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    for handle in scheduler {
        handle.abort();
    }
    if let Some(pubsub) = pubsub
        && let Err(e) = pubsub.shutdown().await
    {
        warn!(error = %e, "Failed to shut down Redis pub/sub");
    }

    info!("Server shutdown complete");
    Ok(())
}
