//! Postgres stores
//!
//! State transitions are guarded in the `WHERE` clause so a single `UPDATE`
//! both checks and applies them. When the guard matches nothing the current
//! row is read back to tell a missing job from a terminal one.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, QueryBuilder, Transaction};
use std::collections::HashSet;
use tracing::{debug, instrument};
use uuid::Uuid;

use super::{CatalogError, CatalogStore, CatalogTransaction, JobStore, JobStoreError};
use crate::ingest::models::{
    CatalogEntry, IngestReport, JobOutcome, JobStatus, UploadJob, ValidatedCandidate,
};

/// Rows per INSERT/UPDATE statement, keeps bind parameters well under 65535
const STATEMENT_CHUNK_ROWS: usize = 1000;

const JOB_COLUMNS: &str =
    "id, status, created_at, started_at, finished_at, progress, report, csv_file, version";

#[derive(Debug, sqlx::FromRow)]
struct JobRow {
    id: Uuid,
    status: String,
    created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
    progress: f64,
    report: Option<serde_json::Value>,
    csv_file: String,
    version: i64,
}

impl TryFrom<JobRow> for UploadJob {
    type Error = JobStoreError;

    fn try_from(row: JobRow) -> Result<Self, Self::Error> {
        let status = row.status.parse::<JobStatus>().map_err(JobStoreError::Corrupt)?;
        let report = row
            .report
            .map(serde_json::from_value::<IngestReport>)
            .transpose()?;

        Ok(UploadJob {
            id: row.id,
            status,
            created_at: row.created_at,
            started_at: row.started_at,
            finished_at: row.finished_at,
            progress: row.progress,
            report,
            input_ref: row.csv_file,
            version: row.version,
        })
    }
}

/// `upload_jobs` table
#[derive(Clone)]
pub struct PgJobStore {
    pool: PgPool,
}

impl PgJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Explain why a guarded update touched no row
    async fn rejected(&self, id: Uuid, operation: &'static str) -> JobStoreError {
        match self.fetch(id).await {
            Ok(job) => JobStoreError::InvalidTransition {
                id,
                from: job.status,
                operation,
            },
            Err(e) => e,
        }
    }
}

#[async_trait]
impl JobStore for PgJobStore {
    #[instrument(skip(self))]
    async fn create(&self, input_ref: &str) -> Result<UploadJob, JobStoreError> {
        let row = sqlx::query_as::<_, JobRow>(&format!(
            "INSERT INTO upload_jobs (id, status, csv_file) VALUES ($1, $2, $3) RETURNING {JOB_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(JobStatus::Pending.as_str())
        .bind(input_ref)
        .fetch_one(&self.pool)
        .await?;

        row.try_into()
    }

    async fn fetch(&self, id: Uuid) -> Result<UploadJob, JobStoreError> {
        sqlx::query_as::<_, JobRow>(&format!("SELECT {JOB_COLUMNS} FROM upload_jobs WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(JobStoreError::NotFound(id))?
            .try_into()
    }

    async fn list_unfinished(&self) -> Result<Vec<UploadJob>, JobStoreError> {
        sqlx::query_as::<_, JobRow>(&format!(
            "SELECT {JOB_COLUMNS} FROM upload_jobs \
             WHERE status IN ('PENDING', 'PROCESSING') ORDER BY created_at"
        ))
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(UploadJob::try_from)
        .collect()
    }

    #[instrument(skip(self))]
    async fn mark_processing(&self, id: Uuid) -> Result<UploadJob, JobStoreError> {
        let row = sqlx::query_as::<_, JobRow>(&format!(
            r#"
            UPDATE upload_jobs
            SET status = 'PROCESSING', started_at = NOW(), finished_at = NULL,
                report = NULL, version = version + 1
            WHERE id = $1 AND status IN ('PENDING', 'PROCESSING')
            RETURNING {JOB_COLUMNS}
            "#
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => row.try_into(),
            None => Err(self.rejected(id, "start").await),
        }
    }

    async fn set_progress(&self, id: Uuid, progress: f64) -> Result<(), JobStoreError> {
        let result = sqlx::query(
            r#"
            UPDATE upload_jobs
            SET progress = GREATEST(progress, $2), version = version + 1
            WHERE id = $1 AND status IN ('PENDING', 'PROCESSING')
            "#,
        )
        .bind(id)
        .bind(progress)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(self.rejected(id, "update progress of").await);
        }
        Ok(())
    }

    #[instrument(skip(self, report), fields(total_rows = report.total_rows))]
    async fn mark_finished(
        &self,
        id: Uuid,
        outcome: JobOutcome,
        report: &IngestReport,
    ) -> Result<UploadJob, JobStoreError> {
        let report = serde_json::to_value(report)?;
        let row = sqlx::query_as::<_, JobRow>(&format!(
            r#"
            UPDATE upload_jobs
            SET status = $2, finished_at = NOW(), report = $3,
                progress = 100, version = version + 1
            WHERE id = $1 AND status IN ('PENDING', 'PROCESSING')
            RETURNING {JOB_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(outcome.status().as_str())
        .bind(report)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => row.try_into(),
            None => Err(self.rejected(id, "finish").await),
        }
    }
}

/// `products` table
#[derive(Clone)]
pub struct PgCatalogStore {
    pool: PgPool,
}

impl PgCatalogStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CatalogStore for PgCatalogStore {
    async fn begin(&self) -> Result<Box<dyn CatalogTransaction>, CatalogError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgCatalogTransaction { tx }))
    }

    async fn find_by_sku(&self, sku: &str) -> Result<Option<CatalogEntry>, CatalogError> {
        let entry = sqlx::query_as::<_, CatalogEntry>(
            "SELECT id, sku, name, price, stock_count, is_active, created_at FROM products WHERE sku = $1",
        )
        .bind(sku)
        .fetch_optional(&self.pool)
        .await?;
        Ok(entry)
    }

    async fn list(&self, limit: i64, offset: i64) -> Result<(Vec<CatalogEntry>, i64), CatalogError> {
        let entries = sqlx::query_as::<_, CatalogEntry>(
            r#"
            SELECT id, sku, name, price, stock_count, is_active, created_at
            FROM products
            ORDER BY created_at DESC, id DESC
            LIMIT $1 OFFSET $2
            "#,
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        let total = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM products")
            .fetch_one(&self.pool)
            .await?;

        Ok((entries, total))
    }
}

struct PgCatalogTransaction {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl CatalogTransaction for PgCatalogTransaction {
    async fn existing_skus(&mut self, skus: &[String]) -> Result<HashSet<String>, CatalogError> {
        if skus.is_empty() {
            return Ok(HashSet::new());
        }
        let found = sqlx::query_scalar::<_, String>("SELECT sku FROM products WHERE sku = ANY($1)")
            .bind(skus)
            .fetch_all(&mut *self.tx)
            .await?;
        Ok(found.into_iter().collect())
    }

    async fn insert_entries(&mut self, entries: &[ValidatedCandidate]) -> Result<u64, CatalogError> {
        let mut inserted = 0;

        for chunk in entries.chunks(STATEMENT_CHUNK_ROWS) {
            let mut query_builder = QueryBuilder::<Postgres>::new(
                "INSERT INTO products (sku, name, price, stock_count, is_active) ",
            );
            query_builder.push_values(chunk, |mut b, entry| {
                b.push_bind(&entry.sku)
                    .push_bind(&entry.name)
                    .push_bind(&entry.price)
                    .push_bind(entry.stock_count)
                    .push_bind(entry.is_active);
            });

            let result = query_builder
                .build()
                .execute(&mut *self.tx)
                .await
                .map_err(conflict_or_database)?;
            inserted += result.rows_affected();
        }

        debug!(inserted, "Inserted catalog entries");
        Ok(inserted)
    }

    async fn update_entries(&mut self, entries: &[ValidatedCandidate]) -> Result<u64, CatalogError> {
        let mut updated = 0;

        for chunk in entries.chunks(STATEMENT_CHUNK_ROWS) {
            let mut query_builder = QueryBuilder::<Postgres>::new(
                r#"
                UPDATE products AS p
                SET name = v.name, price = v.price, stock_count = v.stock_count, is_active = v.is_active
                FROM (
                "#,
            );
            query_builder.push_values(chunk, |mut b, entry| {
                b.push_bind(&entry.sku)
                    .push_bind(&entry.name)
                    .push_bind(&entry.price)
                    .push_bind(entry.stock_count)
                    .push_bind(entry.is_active);
            });
            query_builder.push(
                ") AS v (sku, name, price, stock_count, is_active) WHERE p.sku = v.sku",
            );

            let result = query_builder.build().execute(&mut *self.tx).await?;
            updated += result.rows_affected();
        }

        debug!(updated, "Updated catalog entries");
        Ok(updated)
    }

    async fn commit(self: Box<Self>) -> Result<(), CatalogError> {
        self.tx.commit().await?;
        Ok(())
    }
}

fn conflict_or_database(error: sqlx::Error) -> CatalogError {
    let conflict = error
        .as_database_error()
        .filter(|db| db.constraint() == Some("products_sku_key"))
        .map(|db| db.message().to_string());

    match conflict {
        Some(message) => CatalogError::Conflict(message),
        None => CatalogError::Database(error),
    }
}
