use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::{FromRow, SqliteConnection, SqlitePool};
use uuid::Uuid;

use crate::{
    domain::{BackgroundJob, JobPayload, JobStatus},
    error::{AppError, Result},
    repository::{parse_uuid, to_utc, JobRepository},
};

#[derive(FromRow)]
struct JobRow {
    id: String,
    payload: String,
    status: String,
    attempts: i64,
    max_attempts: i64,
    run_at: NaiveDateTime,
    last_error: Option<String>,
    locked_at: Option<NaiveDateTime>,
    completed_at: Option<NaiveDateTime>,
    created_at: NaiveDateTime,
    updated_at: NaiveDateTime,
}

const JOB_COLUMNS: &str = r#"
    id, payload, status, attempts, max_attempts, run_at, last_error,
    locked_at, completed_at, created_at, updated_at
"#;

pub struct SqliteJobRepository {
    pool: SqlitePool,
    max_attempts: i64,
}

impl SqliteJobRepository {
    pub fn new(pool: SqlitePool, max_attempts: i64) -> Self {
        Self { pool, max_attempts }
    }

    fn row_to_job(row: JobRow) -> Result<BackgroundJob> {
        let payload: JobPayload = serde_json::from_str(&row.payload)
            .map_err(|e| AppError::Database(format!("Invalid job payload: {}", e)))?;

        Ok(BackgroundJob {
            id: parse_uuid(&row.id)?,
            payload,
            status: JobStatus::parse(&row.status)?,
            attempts: row.attempts,
            max_attempts: row.max_attempts,
            run_at: to_utc(row.run_at),
            last_error: row.last_error,
            locked_at: row.locked_at.map(to_utc),
            completed_at: row.completed_at.map(to_utc),
            created_at: to_utc(row.created_at),
            updated_at: to_utc(row.updated_at),
        })
    }
}

/// Queues a job on the caller's connection so it commits together with the
/// state change that caused it.
pub(crate) async fn enqueue_in(
    conn: &mut SqliteConnection,
    payload: &JobPayload,
    run_at: DateTime<Utc>,
    max_attempts: i64,
) -> Result<Uuid> {
    let id = Uuid::new_v4();
    let now = Utc::now().naive_utc();
    let json = serde_json::to_string(payload)
        .map_err(|e| AppError::Internal(format!("Failed to encode job payload: {}", e)))?;

    sqlx::query(
        r#"
        INSERT INTO background_jobs (
            id, job_type, payload, status, attempts, max_attempts, run_at,
            created_at, updated_at
        ) VALUES (?, ?, ?, 'pending', 0, ?, ?, ?, ?)
        "#
    )
    .bind(id.to_string())
    .bind(payload.job_type())
    .bind(json)
    .bind(max_attempts)
    .bind(run_at.naive_utc())
    .bind(now)
    .bind(now)
    .execute(&mut *conn)
    .await?;

    tracing::debug!("Queued {} job {}", payload.job_type(), id);
    Ok(id)
}

#[async_trait]
impl JobRepository for SqliteJobRepository {
    async fn enqueue(&self, payload: JobPayload, run_at: DateTime<Utc>) -> Result<BackgroundJob> {
        let mut conn = self.pool.acquire().await?;
        let id = enqueue_in(&mut conn, &payload, run_at, self.max_attempts).await?;
        drop(conn);

        self.find_by_id(id).await?.ok_or_else(|| {
            AppError::Database("Failed to retrieve queued job".to_string())
        })
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<BackgroundJob>> {
        let row = sqlx::query_as::<_, JobRow>(&format!(
            "SELECT {} FROM background_jobs WHERE id = ?",
            JOB_COLUMNS
        ))
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_job).transpose()
    }

    async fn claim_next(&self) -> Result<Option<BackgroundJob>> {
        let now = Utc::now().naive_utc();

        // Single statement, so two workers can never claim the same row.
        let row = sqlx::query_as::<_, JobRow>(&format!(
            r#"
            UPDATE background_jobs
            SET status = 'processing', attempts = attempts + 1, locked_at = ?, updated_at = ?
            WHERE id = (
                SELECT id FROM background_jobs
                WHERE status = 'pending' AND run_at <= ?
                ORDER BY run_at, created_at
                LIMIT 1
            ) AND status = 'pending'
            RETURNING {}
            "#,
            JOB_COLUMNS
        ))
        .bind(now)
        .bind(now)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_job).transpose()
    }

    async fn mark_completed(&self, id: Uuid) -> Result<()> {
        let now = Utc::now().naive_utc();
        sqlx::query(
            r#"
            UPDATE background_jobs
            SET status = 'completed', completed_at = ?, locked_at = NULL, last_error = NULL, updated_at = ?
            WHERE id = ?
            "#
        )
        .bind(now)
        .bind(now)
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn mark_failed(&self, id: Uuid, error: &str, retry_at: Option<DateTime<Utc>>) -> Result<()> {
        let now = Utc::now().naive_utc();
        let (status, run_at) = match retry_at {
            Some(at) => (JobStatus::Pending, Some(at.naive_utc())),
            None => (JobStatus::Failed, None),
        };

        sqlx::query(
            r#"
            UPDATE background_jobs
            SET status = ?, last_error = ?, run_at = COALESCE(?, run_at),
                locked_at = NULL, updated_at = ?
            WHERE id = ?
            "#
        )
        .bind(status.as_str())
        .bind(error)
        .bind(run_at)
        .bind(now)
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn recover_stale(&self, locked_before: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE background_jobs
            SET status = 'pending', locked_at = NULL, updated_at = ?
            WHERE status = 'processing' AND locked_at < ?
            "#
        )
        .bind(Utc::now().naive_utc())
        .bind(locked_before.naive_utc())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn retry(&self, id: Uuid) -> Result<BackgroundJob> {
        let now = Utc::now().naive_utc();
        let result = sqlx::query(
            r#"
            UPDATE background_jobs
            SET status = 'pending', attempts = 0, run_at = ?, locked_at = NULL, updated_at = ?
            WHERE id = ? AND status = 'failed'
            "#
        )
        .bind(now)
        .bind(now)
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::Conflict("Only failed jobs can be retried".to_string()));
        }

        self.find_by_id(id).await?
            .ok_or_else(|| AppError::NotFound("Job not found".to_string()))
    }

    async fn list(&self, status: Option<JobStatus>, limit: i64) -> Result<Vec<BackgroundJob>> {
        let rows = sqlx::query_as::<_, JobRow>(&format!(
            r#"
            SELECT {} FROM background_jobs
            WHERE (? IS NULL OR status = ?)
            ORDER BY created_at DESC
            LIMIT ?
            "#,
            JOB_COLUMNS
        ))
        .bind(status.map(|s| s.as_str()))
        .bind(status.map(|s| s.as_str()))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_job).collect()
    }

    async fn count_by_status(&self, status: JobStatus) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM background_jobs WHERE status = ?")
            .bind(status.as_str())
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}
