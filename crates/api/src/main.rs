//! Courier service binary: HTTP API, delivery consumer, status consumer.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use courier_common::config::{AppConfig, ProviderKind};
use courier_common::db::{create_pool, run_migrations};
use courier_common::error::AppError;
use courier_common::redis_pool::create_redis_pool;
use courier_common::types::StatusEvent;
use courier_gateway::{MetaClient, ProviderClient, TwilioClient};
use courier_pipeline::{MessagePipeline, PgMessageRepository, StatusReconciler};
use courier_queue::{QueueConsumer, RedisQueue, RetryPolicy};

use courier_api::routes::create_router;
use courier_api::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("courier_api=debug,courier_pipeline=debug,courier_queue=debug,tower_http=debug")
        }))
        .init();

    tracing::info!("Starting courier service...");

    let config = AppConfig::from_env()?;

    let pool = create_pool(&config.database_url, config.db_max_connections).await?;
    run_migrations(&pool).await?;
    let redis = create_redis_pool(&config.redis_url).await?;

    let gateway = build_gateway(&config)?;
    let repo = Arc::new(PgMessageRepository::new(pool));

    let delivery_queue = Arc::new(RedisQueue::new(redis.clone(), config.delivery_stream.clone()));
    let status_queue = Arc::new(RedisQueue::new(redis.clone(), config.status_stream.clone()));

    let pipeline = Arc::new(MessagePipeline::new(
        repo,
        gateway.clone(),
        delivery_queue,
    ));
    let reconciler = Arc::new(StatusReconciler::new(pipeline.clone()));

    let token = CancellationToken::new();
    let retry = RetryPolicy::new(
        config.max_delivery_attempts,
        Duration::from_millis(config.retry_backoff_ms),
    );

    // Delivery consumer: drives queued jobs through the gateway.
    let delivery_consumer = QueueConsumer::new(
        redis.clone(),
        config.delivery_stream.clone(),
        config.consumer_group.clone(),
        "delivery-worker",
        config.dead_letter_stream.clone(),
        retry,
    );
    let delivery_pipeline = pipeline.clone();
    let delivery_token = token.clone();
    let delivery_task = tokio::spawn(async move {
        delivery_consumer
            .run(delivery_token, move |payload| {
                let pipeline = delivery_pipeline.clone();
                async move { pipeline.process_queued_job(&payload).await }
            })
            .await
    });

    // Status consumer: applies webhook events through the reconciler. Events
    // here are best-effort; the reconciler absorbs per-event problems, so the
    // handler only fails on undecodable payloads.
    let status_consumer = QueueConsumer::new(
        redis.clone(),
        config.status_stream.clone(),
        config.consumer_group.clone(),
        "status-worker",
        config.dead_letter_stream.clone(),
        RetryPolicy::new(1, Duration::from_millis(config.retry_backoff_ms)),
    );
    let status_reconciler = reconciler.clone();
    let status_token = token.clone();
    let status_task = tokio::spawn(async move {
        status_consumer
            .run(status_token, move |payload| {
                let reconciler = status_reconciler.clone();
                async move {
                    let event: StatusEvent = serde_json::from_slice(&payload)
                        .map_err(|e| AppError::Decode(format!("status event: {e}")))?;
                    reconciler.ingest(&[event]).await;
                    Ok(())
                }
            })
            .await
    });

    let state = AppState::new(pipeline, gateway, status_queue, config.clone());
    let app = create_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr = SocketAddr::from(([0, 0, 0, 0], config.http_port));
    tracing::info!("API server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let shutdown_token = token.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            shutdown_token.cancel();
        })
        .await?;

    // Consumers observe the cancelled token and drain their in-flight job.
    let _ = delivery_task.await;
    let _ = status_task.await;

    tracing::info!("Courier service exited");
    Ok(())
}

fn build_gateway(config: &AppConfig) -> anyhow::Result<Arc<dyn ProviderClient>> {
    match config.provider {
        ProviderKind::Twilio => {
            let account_sid = require(&config.twilio_account_sid, "TWILIO_ACCOUNT_SID")?;
            let auth_token = require(&config.twilio_auth_token, "TWILIO_AUTH_TOKEN")?;
            let from_number = require(&config.twilio_from_number, "TWILIO_FROM_NUMBER")?;
            tracing::info!("Using Twilio gateway");
            Ok(Arc::new(TwilioClient::new(account_sid, auth_token, from_number)))
        }
        ProviderKind::Meta => {
            let phone_number_id = require(&config.meta_phone_number_id, "META_PHONE_NUMBER_ID")?;
            let access_token = require(&config.meta_access_token, "META_ACCESS_TOKEN")?;
            let app_secret = require(&config.meta_app_secret, "META_APP_SECRET")?;
            tracing::info!("Using Meta gateway");
            Ok(Arc::new(MetaClient::new(phone_number_id, access_token, app_secret)))
        }
    }
}

fn require(value: &Option<String>, name: &str) -> anyhow::Result<String> {
    value
        .clone()
        .ok_or_else(|| anyhow::anyhow!("{name} is required for the selected provider"))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
    tracing::info!("Shutdown signal received");
}
