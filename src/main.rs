use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use order_pipeline::cache::{OrderCache, RedisOrderCache};
use order_pipeline::config::AppConfig;
use order_pipeline::domain::order::OrderService;
use order_pipeline::health::HealthChecker;
use order_pipeline::http::{self, AppState};
use order_pipeline::ingestion::IngestionLoop;
use order_pipeline::messaging::{KafkaOrderPublisher, KafkaOrderSource};
use order_pipeline::metrics::Metrics;
use order_pipeline::store::PgOrderStore;
use order_pipeline::utils::RetryConfig;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load()?;

    // Default to INFO level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,order_pipeline=debug")),
        )
        .init();

    tracing::info!(env = %config.env, "🚀 Starting order pipeline");

    // === 1. Metrics ===
    let metrics = Arc::new(Metrics::new()?);
    tracing::info!("📊 Metrics registry created with {} metrics", metrics.registry().gather().len());

    // === 2. Postgres ===
    let store = Arc::new(
        PgOrderStore::connect(
            &config.database.url(),
            config.database.max_connections,
            config.database.acquire_timeout,
            RetryConfig::startup(),
        )
        .await?,
    );
    if config.database.bootstrap_schema {
        store.bootstrap_schema().await?;
    }

    // === 3. Redis (optional at startup) ===
    let cache = Arc::new(RedisOrderCache::new(
        &config.cache.address,
        config.cache.op_timeout,
        config.cache.ping_timeout,
    )?);
    match cache.ping().await {
        Ok(()) => tracing::info!("✅ Redis reachable"),
        Err(e) => tracing::warn!(error = %e, "⚠️ Redis unreachable, serving reads from Postgres only"),
    }

    let service = Arc::new(
        OrderService::new(store.clone(), cache.clone(), config.cache.ttl, metrics.clone())
            .with_cache_timeout(config.cache.op_timeout),
    );

    // === 4. Kafka ===
    let source = Arc::new(KafkaOrderSource::new(
        &config.kafka.address,
        &config.kafka.group_id,
        &config.kafka.offset_reset,
        &config.kafka.topic,
    )?);
    let publisher = Arc::new(KafkaOrderPublisher::new(&config.kafka.address, &config.kafka.topic)?);

    let shutdown = CancellationToken::new();
    let ingestion = IngestionLoop::new(source, service.clone(), metrics.clone(), config.kafka.poll_timeout)
        .spawn(shutdown);

    // === 5. HTTP ===
    let health = Arc::new(HealthChecker::new(store.clone(), cache.clone(), config.cache.ping_timeout));
    let state = AppState {
        service,
        publisher: publisher.clone(),
        health,
        metrics,
    };
    let server = http::build_server(
        state,
        &config.http_server.address,
        config.http_server.timeout,
        config.http_server.idle_timeout,
    )?;
    let server_handle = server.handle();
    let server_task = actix_web::rt::spawn(server);

    wait_for_shutdown_signal().await?;
    tracing::info!("🛑 Shutdown signal received");

    // === 6. Ordered teardown ===
    match ingestion.shutdown(config.ingestion.drain_timeout).await {
        Some(reason) => tracing::info!(reason = reason.as_str(), "Ingestion drained"),
        None => tracing::warn!("Ingestion did not drain in time"),
    }

    server_handle.stop(true).await;
    match server_task.await {
        Ok(Ok(())) => tracing::info!("HTTP server stopped"),
        Ok(Err(e)) => tracing::error!(error = %e, "HTTP server exited with error"),
        Err(e) => tracing::error!(error = %e, "HTTP server task failed"),
    }

    publisher.flush(Duration::from_secs(5)).await;
    if let Err(e) = cache.close().await {
        tracing::warn!(error = %e, "Failed to close Redis connection");
    }
    store.close().await;

    tracing::info!("👋 Shutdown complete");
    Ok(())
}

async fn wait_for_shutdown_signal() -> anyhow::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = signal(SignalKind::terminate())?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => result?,
            _ = sigterm.recv() => {}
        }
    }

    #[cfg(not(unix))]
    tokio::signal::ctrl_c().await?;

    Ok(())
}
