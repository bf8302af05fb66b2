//! Backup job orchestrator.
//!
//! Drives one job through `pending → running → completed | failed`:
//! 1. Claim the job (conditional `pending → running`); anything else is a no-op
//! 2. Run the backup tool with a timestamped archive name
//! 3. Verify the archive exists on the disk and record its size
//! 4. Record the outcome and notify the creator
//!
//! Retries belong to the queue. A failed run is recorded as `failed` before the
//! error is returned, so a retried delivery of the same job is a no-op.

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use keeper_common::types::{BackupJob, BackupStatus};
use keeper_notifier::dispatcher::Dispatcher;
use keeper_notifier::kinds::{self, AppLinks};
use keeper_notifier::notification::Notification;
use keeper_notifier::users::UserDirectory;

use crate::disk::DiskRegistry;
use crate::error::BackupError;
use crate::repository::{BackupRepository, CompletedArtifact};
use crate::tool::{BackupRequest, BackupTool, artifact_name};

/// Result of one `handle` call that did not error.
#[derive(Debug, Clone)]
pub enum HandleOutcome {
    Completed(BackupJob),
    /// The job was not pending (already running, finished, or claimed elsewhere)
    Skipped { status: BackupStatus },
}

/// Notifies a job's creator about its outcome.
pub struct BackupNotifier {
    dispatcher: Arc<Dispatcher>,
    users: Arc<dyn UserDirectory>,
    links: AppLinks,
}

impl BackupNotifier {
    pub fn new(dispatcher: Arc<Dispatcher>, users: Arc<dyn UserDirectory>, links: AppLinks) -> Self {
        Self {
            dispatcher,
            users,
            links,
        }
    }

    pub async fn completed(&self, job: &BackupJob) {
        self.notify_creator(job, || kinds::backup_completed(&self.links, job))
            .await;
    }

    pub async fn failed(&self, job: &BackupJob, error: &str) {
        self.notify_creator(job, || kinds::backup_failed(&self.links, job, error))
            .await;
    }

    async fn notify_creator(
        &self,
        job: &BackupJob,
        build: impl FnOnce() -> Notification,
    ) {
        let Some(creator_id) = job.created_by else {
            return;
        };

        let creator = match self.users.find(creator_id).await {
            Ok(Some(user)) => user,
            Ok(None) => return,
            Err(e) => {
                tracing::warn!(
                    backup_id = %job.id,
                    user_id = %creator_id,
                    error = %e,
                    "Could not load backup creator for notification"
                );
                return;
            }
        };

        self.dispatcher
            .dispatch(&build(), std::slice::from_ref(&creator))
            .await;
    }
}

pub struct BackupOrchestrator {
    repo: Arc<dyn BackupRepository>,
    disks: DiskRegistry,
    tool: Arc<dyn BackupTool>,
    notifier: BackupNotifier,
    disk_name: String,
    archive_dir: String,
}

impl BackupOrchestrator {
    pub fn new(
        repo: Arc<dyn BackupRepository>,
        disks: DiskRegistry,
        tool: Arc<dyn BackupTool>,
        notifier: BackupNotifier,
        disk_name: impl Into<String>,
        archive_dir: impl Into<String>,
    ) -> Self {
        Self {
            repo,
            disks,
            tool,
            notifier,
            disk_name: disk_name.into(),
            archive_dir: archive_dir.into(),
        }
    }

    pub async fn handle(&self, job_id: Uuid) -> Result<HandleOutcome, BackupError> {
        let job = self
            .repo
            .find(job_id)
            .await?
            .ok_or(BackupError::NotFound(job_id))?;

        if job.status != BackupStatus::Pending {
            tracing::info!(backup_id = %job_id, status = %job.status, "Backup not pending, skipping");
            return Ok(HandleOutcome::Skipped { status: job.status });
        }

        let Some(job) = self.repo.mark_running(job_id, Utc::now()).await? else {
            tracing::info!(backup_id = %job_id, "Backup claimed elsewhere, skipping");
            return Ok(HandleOutcome::Skipped {
                status: BackupStatus::Running,
            });
        };

        tracing::info!(backup_id = %job_id, includes = ?job.includes.0, "Backup started");

        let outcome = match self.produce_artifact(&job).await {
            Ok(artifact) => self.complete(&job, artifact).await,
            Err(e) => Err(e),
        };
        match outcome {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                let e = e.after_claim();
                self.record_failure(job_id, &e.to_string()).await;
                Err(e)
            }
        }
    }

    /// Terminal failure callback, invoked once the queue gives up on a job.
    ///
    /// Returns true if this call moved the job to `failed`.
    pub async fn fail_permanently(&self, job_id: Uuid, error: &str) -> Result<bool, BackupError> {
        match self.repo.mark_failed(job_id, error, Utc::now()).await? {
            Some(job) => {
                tracing::error!(backup_id = %job_id, error = %error, "Backup failed permanently");
                self.notifier.failed(&job, error).await;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn produce_artifact(&self, job: &BackupJob) -> Result<CompletedArtifact, BackupError> {
        let disk = self.disks.get(&self.disk_name)?;
        let name = artifact_name(&job.includes.0, Utc::now());
        let path = format!("{}/{}", self.archive_dir, name);

        let output = self
            .tool
            .run(&BackupRequest {
                components: job.includes.0.clone(),
                filename: name.clone(),
                disk: self.disk_name.clone(),
            })
            .await?;

        if !output.succeeded() {
            return Err(BackupError::ToolFailed {
                exit_code: output.exit_code,
                output: output.output,
            });
        }

        if !disk.exists(&path).await? {
            return Err(BackupError::ArtifactMissing(path));
        }
        let size = disk.size(&path).await?;

        Ok(CompletedArtifact {
            name,
            disk: self.disk_name.clone(),
            path,
            size: i64::try_from(size).unwrap_or(i64::MAX),
        })
    }

    async fn complete(
        &self,
        job: &BackupJob,
        artifact: CompletedArtifact,
    ) -> Result<HandleOutcome, BackupError> {
        let Some(done) = self
            .repo
            .mark_completed(job.id, &artifact, Utc::now())
            .await?
        else {
            // Failed by the terminal callback while the tool was running
            let current = self.repo.find(job.id).await?;
            return Ok(HandleOutcome::Skipped {
                status: current.map(|j| j.status).unwrap_or(BackupStatus::Failed),
            });
        };

        tracing::info!(
            backup_id = %done.id,
            name = %artifact.name,
            size = artifact.size,
            "Backup completed"
        );
        self.notifier.completed(&done).await;

        Ok(HandleOutcome::Completed(done))
    }

    async fn record_failure(&self, job_id: Uuid, error: &str) {
        tracing::error!(backup_id = %job_id, error = %error, "Backup failed");
        match self.repo.mark_failed(job_id, error, Utc::now()).await {
            Ok(Some(job)) => self.notifier.failed(&job, error).await,
            Ok(None) => {}
            Err(e) => {
                tracing::error!(backup_id = %job_id, error = %e, "Could not record backup failure")
            }
        }
    }
}
