//! SKUFlow Server - Main entry point

use anyhow::Result;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde_json::json;
use skuflow_common::logging::{init_logging, LogConfig};
use sqlx::PgPool;
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::signal;
use tower_http::compression::CompressionLayer;
use tracing::{info, warn};

use skuflow_server::{
    config::Config,
    db,
    features::{self, FeatureState},
    ingest::{
        store::{CatalogStore, JobStore, PgCatalogStore, PgJobStore},
        Dispatcher, IngestionDriver, MediaRoot,
    },
    middleware,
};

#[tokio::main]
async fn main() -> Result<()> {
    let log_config = LogConfig::builder()
        .log_file_prefix("skuflow-server")
        .filter_directives("skuflow_server=debug,tower_http=debug,sqlx=warn")
        .build()
        .merge_env()?;

    let _log_guard = init_logging(&log_config)?;

    info!("Starting SKUFlow server");

    let config = Config::load()?;
    info!(
        "Configuration loaded - server will bind to {}:{}",
        config.server.host, config.server.port
    );

    let pool = db::create_pool(&config.database).await?;
    db::run_migrations(&pool).await?;

    let jobs: Arc<dyn JobStore> = Arc::new(PgJobStore::new(pool.clone()));
    let catalog: Arc<dyn CatalogStore> = Arc::new(PgCatalogStore::new(pool.clone()));
    let media = MediaRoot::new(config.ingest.media_root.clone());

    let driver = IngestionDriver::new(jobs.clone(), catalog.clone(), Arc::new(media.clone()))
        .with_batch_size(config.ingest.batch_size)
        .with_validator(config.ingest.validator());

    let (dispatcher, dispatcher_handle) =
        Dispatcher::start(Arc::new(driver), config.ingest.dispatch_settings());

    match dispatcher.recover(jobs.as_ref()).await {
        Ok(queued) => info!(queued, "Startup recovery finished"),
        Err(e) => warn!("Could not list unfinished upload jobs: {}", e),
    }

    let state = FeatureState {
        jobs,
        catalog,
        dispatcher,
        media,
        max_upload_bytes: config.ingest.max_upload_bytes,
    };

    let app = create_router(state, pool, &config);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("HTTP server stopped, draining ingestion workers");

    let drain = Duration::from_secs(config.server.shutdown_timeout_secs);
    if tokio::time::timeout(drain, dispatcher_handle.shutdown()).await.is_err() {
        warn!(
            "Ingestion workers still running after {}s; unfinished jobs resume on next start",
            drain.as_secs()
        );
    }

    info!("Server shut down gracefully");

    Ok(())
}

fn create_router(state: FeatureState, pool: PgPool, config: &Config) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .with_state(pool)
        .nest("/api/v1", features::router(state))
        .layer(CompressionLayer::new())
        .layer(middleware::tracing_layer())
        .layer(middleware::cors_layer(&config.cors))
}

async fn health_check(State(pool): State<PgPool>) -> Result<Response, StatusCode> {
    match db::health_check(&pool).await {
        Ok(()) => Ok((
            StatusCode::OK,
            Json(json!({
                "status": "healthy",
                "database": "connected"
            })),
        )
            .into_response()),
        Err(e) => {
            tracing::error!("Database health check failed: {:?}", e);
            Err(StatusCode::SERVICE_UNAVAILABLE)
        },
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            },
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, starting graceful shutdown"),
        _ = terminate => info!("Received terminate signal, starting graceful shutdown"),
    }
}
