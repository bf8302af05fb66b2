//! Backup job persistence.
//!
//! Status transitions are conditional updates: each one names the state it
//! expects to leave, so a row never moves backwards and terminal rows are
//! never touched again. A transition that does not apply returns `None`.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use sqlx::PgPool;
use sqlx::types::Json;
use uuid::Uuid;

use keeper_common::error::AppError;
use keeper_common::types::{BackupComponent, BackupJob, BackupType, format_bytes};

/// Verified artifact recorded on completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedArtifact {
    pub name: String,
    pub disk: String,
    pub path: String,
    pub size: i64,
}

/// A job with its creator's display name.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct BackupListing {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub job: BackupJob,
    pub creator_name: Option<String>,
}

impl BackupListing {
    pub fn creator_label(&self) -> &str {
        self.creator_name.as_deref().unwrap_or("System")
    }
}

/// Window used for "recent" in status summaries.
pub const RECENT_DAYS: i64 = 7;

pub(crate) const RECENT_FAILURES_SHOWN: i64 = 5;

#[derive(Debug, Clone, Serialize)]
pub struct BackupStats {
    pub total: i64,
    pub completed: i64,
    pub failed: i64,
    pub running: i64,
    /// Created within the last `RECENT_DAYS` days
    pub recent: i64,
    /// Sum of completed artifact sizes, in bytes
    pub total_size: i64,
    /// Latest failed jobs within the recent window, newest first
    pub recent_failures: Vec<BackupJob>,
}

impl BackupStats {
    pub fn formatted_total_size(&self) -> String {
        format_bytes(self.total_size.max(0) as u64)
    }
}

#[async_trait]
pub trait BackupRepository: Send + Sync {
    async fn create(
        &self,
        backup_type: BackupType,
        includes: &[BackupComponent],
        created_by: Option<Uuid>,
    ) -> Result<BackupJob, AppError>;

    async fn find(&self, id: Uuid) -> Result<Option<BackupJob>, AppError>;

    /// pending → running
    async fn mark_running(
        &self,
        id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<Option<BackupJob>, AppError>;

    /// running → completed, recording the verified artifact
    async fn mark_completed(
        &self,
        id: Uuid,
        artifact: &CompletedArtifact,
        at: DateTime<Utc>,
    ) -> Result<Option<BackupJob>, AppError>;

    /// pending | running → failed
    async fn mark_failed(
        &self,
        id: Uuid,
        error: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<BackupJob>, AppError>;

    /// Completed scheduled jobs created before `cutoff`, newest first.
    async fn retention_candidates(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<BackupJob>, AppError>;

    /// Every job created before `cutoff`, oldest first.
    async fn created_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<BackupJob>, AppError>;

    async fn delete(&self, id: Uuid) -> Result<bool, AppError>;

    /// Newest first.
    async fn list_recent(&self, limit: i64) -> Result<Vec<BackupListing>, AppError>;

    async fn stats(&self, now: DateTime<Utc>) -> Result<BackupStats, AppError>;
}

pub struct PgBackupRepository {
    pool: PgPool,
}

impl PgBackupRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BackupRepository for PgBackupRepository {
    async fn create(
        &self,
        backup_type: BackupType,
        includes: &[BackupComponent],
        created_by: Option<Uuid>,
    ) -> Result<BackupJob, AppError> {
        let job: BackupJob = sqlx::query_as(
            r#"
            INSERT INTO backups (id, backup_type, status, includes, created_by)
            VALUES ($1, $2, 'pending', $3, $4)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(backup_type.to_string())
        .bind(Json(includes))
        .bind(created_by)
        .fetch_one(&self.pool)
        .await?;

        Ok(job)
    }

    async fn find(&self, id: Uuid) -> Result<Option<BackupJob>, AppError> {
        let job: Option<BackupJob> = sqlx::query_as("SELECT * FROM backups WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(job)
    }

    async fn mark_running(
        &self,
        id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<Option<BackupJob>, AppError> {
        let job: Option<BackupJob> = sqlx::query_as(
            r#"
            UPDATE backups SET status = 'running', started_at = $2
            WHERE id = $1 AND status = 'pending'
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(at)
        .fetch_optional(&self.pool)
        .await?;
        Ok(job)
    }

    async fn mark_completed(
        &self,
        id: Uuid,
        artifact: &CompletedArtifact,
        at: DateTime<Utc>,
    ) -> Result<Option<BackupJob>, AppError> {
        let job: Option<BackupJob> = sqlx::query_as(
            r#"
            UPDATE backups SET
                status = 'completed',
                name = $2,
                disk = $3,
                path = $4,
                file_size = $5,
                completed_at = $6
            WHERE id = $1 AND status = 'running'
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&artifact.name)
        .bind(&artifact.disk)
        .bind(&artifact.path)
        .bind(artifact.size)
        .bind(at)
        .fetch_optional(&self.pool)
        .await?;
        Ok(job)
    }

    async fn mark_failed(
        &self,
        id: Uuid,
        error: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<BackupJob>, AppError> {
        let job: Option<BackupJob> = sqlx::query_as(
            r#"
            UPDATE backups SET status = 'failed', error_message = $2, completed_at = $3
            WHERE id = $1 AND status IN ('pending', 'running')
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(error)
        .bind(at)
        .fetch_optional(&self.pool)
        .await?;
        Ok(job)
    }

    async fn retention_candidates(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<BackupJob>, AppError> {
        let jobs: Vec<BackupJob> = sqlx::query_as(
            r#"
            SELECT * FROM backups
            WHERE backup_type = 'scheduled' AND status = 'completed' AND created_at < $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;
        Ok(jobs)
    }

    async fn created_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<BackupJob>, AppError> {
        let jobs: Vec<BackupJob> =
            sqlx::query_as("SELECT * FROM backups WHERE created_at < $1 ORDER BY created_at")
                .bind(cutoff)
                .fetch_all(&self.pool)
                .await?;
        Ok(jobs)
    }

    async fn delete(&self, id: Uuid) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM backups WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_recent(&self, limit: i64) -> Result<Vec<BackupListing>, AppError> {
        let rows: Vec<BackupListing> = sqlx::query_as(
            r#"
            SELECT b.*, u.name AS creator_name
            FROM backups b
            LEFT JOIN users u ON u.id = b.created_by
            ORDER BY b.created_at DESC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn stats(&self, now: DateTime<Utc>) -> Result<BackupStats, AppError> {
        let recent_since = now - Duration::days(RECENT_DAYS);

        let (total, completed, failed, running, recent, total_size): (i64, i64, i64, i64, i64, i64) =
            sqlx::query_as(
                r#"
                SELECT
                    COUNT(*),
                    COUNT(*) FILTER (WHERE status = 'completed'),
                    COUNT(*) FILTER (WHERE status = 'failed'),
                    COUNT(*) FILTER (WHERE status = 'running'),
                    COUNT(*) FILTER (WHERE created_at >= $1),
                    COALESCE(SUM(file_size) FILTER (WHERE status = 'completed'), 0)::BIGINT
                FROM backups
                "#,
            )
            .bind(recent_since)
            .fetch_one(&self.pool)
            .await?;

        let recent_failures: Vec<BackupJob> = sqlx::query_as(
            r#"
            SELECT * FROM backups
            WHERE status = 'failed' AND created_at >= $1
            ORDER BY created_at DESC
            LIMIT $2
            "#,
        )
        .bind(recent_since)
        .bind(RECENT_FAILURES_SHOWN)
        .fetch_all(&self.pool)
        .await?;

        Ok(BackupStats {
            total,
            completed,
            failed,
            running,
            recent,
            total_size,
            recent_failures,
        })
    }
}
