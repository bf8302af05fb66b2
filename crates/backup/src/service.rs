//! Backup management operations shared by the API and the CLI.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use keeper_common::error::AppError;
use keeper_common::types::{BackupComponent, BackupJob, BackupType, days_before};

use crate::disk::DiskRegistry;
use crate::queue::JobQueue;
use crate::repository::{BackupListing, BackupRepository, BackupStats};

/// Rows shown by `list_recent` callers that do not pick a limit.
pub const DEFAULT_LIST_LIMIT: i64 = 10;

/// Default age for `cleanup_older_than`.
pub const DEFAULT_CLEANUP_DAYS: i64 = 30;

/// Map a `database | files | both` selection to backup components.
pub fn components_for(selection: &str) -> Result<Vec<BackupComponent>, AppError> {
    match selection {
        "database" => Ok(vec![BackupComponent::Database]),
        "files" => Ok(vec![BackupComponent::Files]),
        "both" => Ok(vec![BackupComponent::Database, BackupComponent::Files]),
        _ => Err(AppError::Validation(
            "Invalid backup type. Use: database, files, or both".to_string(),
        )),
    }
}

/// Delete a job row after removing its artifact, if one was recorded.
///
/// Artifact removal is best-effort: a missing file or an unreachable disk is
/// logged and the row is deleted anyway.
pub(crate) async fn delete_with_artifact(
    repo: &dyn BackupRepository,
    disks: &DiskRegistry,
    job: &BackupJob,
) -> Result<bool, AppError> {
    if let Some((disk_name, path)) = job.artifact_location() {
        match disks.get(disk_name) {
            Ok(disk) => match disk.delete(path).await {
                Ok(true) => tracing::debug!(backup_id = %job.id, path = %path, "Backup artifact removed"),
                Ok(false) => tracing::debug!(backup_id = %job.id, path = %path, "Backup artifact already gone"),
                Err(e) => tracing::warn!(
                    backup_id = %job.id,
                    path = %path,
                    error = %e,
                    "Failed to remove backup artifact"
                ),
            },
            Err(e) => tracing::warn!(backup_id = %job.id, error = %e, "Backup artifact disk not available"),
        }
    }

    repo.delete(job.id).await
}

pub struct BackupService {
    repo: Arc<dyn BackupRepository>,
    disks: DiskRegistry,
    queue: Arc<dyn JobQueue>,
}

impl BackupService {
    pub fn new(repo: Arc<dyn BackupRepository>, disks: DiskRegistry, queue: Arc<dyn JobQueue>) -> Self {
        Self { repo, disks, queue }
    }

    pub fn repository(&self) -> Arc<dyn BackupRepository> {
        self.repo.clone()
    }

    pub fn disks(&self) -> &DiskRegistry {
        &self.disks
    }

    /// Record a pending job and hand it to the queue.
    pub async fn create(
        &self,
        backup_type: BackupType,
        components: &[BackupComponent],
        created_by: Option<Uuid>,
    ) -> Result<BackupJob, AppError> {
        if components.is_empty() {
            return Err(AppError::Validation(
                "A backup must include at least one component".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        let includes: Vec<BackupComponent> = components
            .iter()
            .copied()
            .filter(|c| seen.insert(*c))
            .collect();
        let job = self.repo.create(backup_type, &includes, created_by).await?;

        if let Err(e) = self.queue.enqueue(job.id).await {
            let message = format!("Failed to queue backup job: {}", e);
            self.repo.mark_failed(job.id, &message, Utc::now()).await?;
            return Err(e);
        }

        tracing::info!(
            backup_id = %job.id,
            backup_type = %backup_type,
            includes = ?includes,
            "Backup job dispatched"
        );
        Ok(job)
    }

    pub async fn find(&self, id: Uuid) -> Result<BackupJob, AppError> {
        self.repo
            .find(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Backup {} not found", id)))
    }

    pub async fn delete(&self, id: Uuid) -> Result<(), AppError> {
        let job = self.find(id).await?;
        delete_with_artifact(self.repo.as_ref(), &self.disks, &job).await?;
        tracing::info!(backup_id = %id, "Backup deleted");
        Ok(())
    }

    /// Delete every job created more than `days` days before `now`.
    pub async fn cleanup_older_than(&self, days: i64, now: DateTime<Utc>) -> Result<u64, AppError> {
        if days < 1 {
            return Err(AppError::Validation("Days must be greater than 0".to_string()));
        }

        let cutoff = days_before(now, days)
            .ok_or_else(|| AppError::Validation("Days out of range".to_string()))?;
        let mut deleted = 0;
        for job in self.repo.created_before(cutoff).await? {
            if delete_with_artifact(self.repo.as_ref(), &self.disks, &job).await? {
                deleted += 1;
            }
        }

        tracing::info!(days, deleted, "Old backups cleaned up");
        Ok(deleted)
    }

    pub async fn status(&self, now: DateTime<Utc>) -> Result<BackupStats, AppError> {
        self.repo.stats(now).await
    }

    pub async fn list_recent(&self, limit: i64) -> Result<Vec<BackupListing>, AppError> {
        self.repo.list_recent(limit.clamp(1, 100)).await
    }
}
