//! Shared fixtures for the integration tests
//!
//! - [`TestApp`]: the HTTP router wired to in-memory stores and a live
//!   dispatcher, with uploads written to a temporary media root
//! - [`TestPostgres`]: a throwaway PostgreSQL container with migrations
//!   applied (Docker required)
#![allow(dead_code)]

use anyhow::{Context, Result};
use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use serde_json::Value;
use sqlx::{postgres::PgPoolOptions, PgPool};
use std::{sync::Arc, time::Duration};
use tempfile::TempDir;
use testcontainers::{core::IntoContainerPort, runners::AsyncRunner, ContainerAsync, ImageExt};
use testcontainers_modules::postgres::Postgres;
use tower::ServiceExt;
use uuid::Uuid;

use skuflow_server::{
    features::{self, FeatureState},
    ingest::{
        store::{JobStore, MemoryCatalog, MemoryJobStore},
        DispatchSettings, Dispatcher, DispatcherHandle, IngestionDriver, MediaRoot, RetryPolicy,
        UploadJob,
    },
};

pub const BOUNDARY: &str = "skuflow-test-boundary";

/// Dispatcher settings with millisecond backoff
pub fn fast_settings() -> DispatchSettings {
    DispatchSettings {
        retry: RetryPolicy {
            max_retries: 2,
            base_delay: Duration::from_millis(5),
            max_delay: Duration::from_millis(20),
        },
        ..DispatchSettings::default()
    }
}

pub struct TestApp {
    pub router: Router,
    pub jobs: Arc<MemoryJobStore>,
    pub catalog: MemoryCatalog,
    pub media: MediaRoot,
    dispatcher: DispatcherHandle,
    _dir: TempDir,
}

impl TestApp {
    pub fn start() -> Self {
        Self::start_with_upload_limit(1024 * 1024)
    }

    pub fn start_with_upload_limit(max_upload_bytes: usize) -> Self {
        let dir = tempfile::tempdir().expect("create media root");
        let media = MediaRoot::new(dir.path());
        let jobs = Arc::new(MemoryJobStore::new());
        let catalog = MemoryCatalog::new();

        let driver = IngestionDriver::new(
            jobs.clone(),
            Arc::new(catalog.clone()),
            Arc::new(media.clone()),
        )
        .with_batch_size(2);
        let (dispatcher, handle) = Dispatcher::start(Arc::new(driver), fast_settings());

        let router = features::router(FeatureState {
            jobs: jobs.clone(),
            catalog: Arc::new(catalog.clone()),
            dispatcher,
            media: media.clone(),
            max_upload_bytes,
        });

        Self {
            router,
            jobs,
            catalog,
            media,
            dispatcher: handle,
            _dir: dir,
        }
    }

    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or_else(|_| {
                Value::String(String::from_utf8_lossy(&bytes).into_owned())
            })
        };
        (status, body)
    }

    pub async fn get(&self, uri: &str) -> (StatusCode, Value) {
        self.send(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
    }

    /// Poll until the job reaches `SUCCESS` or `FAILURE`
    pub async fn wait_for_terminal(&self, id: Uuid) -> UploadJob {
        for _ in 0..500 {
            let job = self.jobs.fetch(id).await.unwrap();
            if job.status.is_terminal() {
                return job;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("job {id} did not finish");
    }

    pub async fn shutdown(self) {
        self.dispatcher.shutdown().await;
    }
}

/// A `multipart/form-data` POST with a single file part
pub fn multipart_upload(uri: &str, field: &str, file_name: &str, content: &str) -> Request<Body> {
    let body = format!(
        "--{BOUNDARY}\r\n\
         Content-Disposition: form-data; name=\"{field}\"; filename=\"{file_name}\"\r\n\
         Content-Type: text/csv\r\n\
         \r\n\
         {content}\r\n\
         --{BOUNDARY}--\r\n"
    );

    Request::builder()
        .method("POST")
        .uri(uri)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

// ============================================================================
// PostgreSQL Test Container
// ============================================================================

pub struct TestPostgres {
    _container: ContainerAsync<Postgres>,
    pool: PgPool,
}

impl TestPostgres {
    /// Start a PostgreSQL container and apply the workspace migrations
    pub async fn start() -> Result<Self> {
        let container = Postgres::default()
            .with_tag("16-alpine")
            .start()
            .await
            .context("Failed to start PostgreSQL container")?;

        let host = container
            .get_host()
            .await
            .context("Failed to get container host")?;
        let port = container
            .get_host_port_ipv4(5432.tcp())
            .await
            .context("Failed to get container port")?;

        let connection_string = format!("postgresql://postgres:postgres@{host}:{port}/postgres");
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(30))
            .connect(&connection_string)
            .await
            .context("Failed to connect to PostgreSQL")?;

        skuflow_server::db::run_migrations(&pool)
            .await
            .context("Failed to run migrations")?;

        Ok(Self {
            _container: container,
            pool,
        })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}
