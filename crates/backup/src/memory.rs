//! In-memory repository, disk, queue and tool for tests.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::types::Json;
use uuid::Uuid;

use keeper_common::error::AppError;
use keeper_common::types::{BackupComponent, BackupJob, BackupStatus, BackupType};

use crate::disk::Disk;
use crate::error::BackupError;
use crate::queue::{JobEnvelope, JobQueue, WorkQueue};
use crate::repository::{
    BackupListing, BackupRepository, BackupStats, CompletedArtifact, RECENT_DAYS,
    RECENT_FAILURES_SHOWN,
};
use crate::tool::{BackupRequest, BackupTool, ToolOutput};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// A pending job skeleton, for seeding repositories in tests.
pub fn job(backup_type: BackupType, status: BackupStatus, created_at: DateTime<Utc>) -> BackupJob {
    BackupJob {
        id: Uuid::new_v4(),
        name: None,
        disk: None,
        path: None,
        backup_type,
        status,
        file_size: None,
        includes: Json(vec![BackupComponent::Database, BackupComponent::Files]),
        error_message: None,
        started_at: None,
        completed_at: None,
        created_by: None,
        created_at,
    }
}

// ---------------------------------------------------------------------------
// Repository
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemoryBackupRepository {
    jobs: Mutex<Vec<BackupJob>>,
    user_names: Mutex<HashMap<Uuid, String>>,
    unavailable: Mutex<bool>,
}

impl MemoryBackupRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, job: BackupJob) -> BackupJob {
        lock(&self.jobs).push(job.clone());
        job
    }

    pub fn with_user_name(&self, user_id: Uuid, name: &str) {
        lock(&self.user_names).insert(user_id, name.to_string());
    }

    pub fn len(&self) -> usize {
        lock(&self.jobs).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, id: Uuid) -> Option<BackupJob> {
        lock(&self.jobs).iter().find(|j| j.id == id).cloned()
    }

    /// Make every call fail as if the database were unreachable.
    pub fn set_unavailable(&self, unavailable: bool) {
        *lock(&self.unavailable) = unavailable;
    }

    fn check_available(&self) -> Result<(), AppError> {
        if *lock(&self.unavailable) {
            return Err(AppError::Internal("backup store unavailable".to_string()));
        }
        Ok(())
    }

    fn transition(
        &self,
        id: Uuid,
        to: BackupStatus,
        apply: impl FnOnce(&mut BackupJob),
    ) -> Result<Option<BackupJob>, AppError> {
        self.check_available()?;
        let mut jobs = lock(&self.jobs);
        match jobs
            .iter_mut()
            .find(|j| j.id == id && j.status.can_transition_to(to))
        {
            Some(job) => {
                job.status = to;
                apply(job);
                Ok(Some(job.clone()))
            }
            None => Ok(None),
        }
    }
}

#[async_trait]
impl BackupRepository for MemoryBackupRepository {
    async fn create(
        &self,
        backup_type: BackupType,
        includes: &[BackupComponent],
        created_by: Option<Uuid>,
    ) -> Result<BackupJob, AppError> {
        self.check_available()?;
        let mut new_job = job(backup_type, BackupStatus::Pending, Utc::now());
        new_job.includes = Json(includes.to_vec());
        new_job.created_by = created_by;
        Ok(self.insert(new_job))
    }

    async fn find(&self, id: Uuid) -> Result<Option<BackupJob>, AppError> {
        self.check_available()?;
        Ok(self.get(id))
    }

    async fn mark_running(
        &self,
        id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<Option<BackupJob>, AppError> {
        self.transition(id, BackupStatus::Running, |job| {
            job.started_at = Some(at);
        })
    }

    async fn mark_completed(
        &self,
        id: Uuid,
        artifact: &CompletedArtifact,
        at: DateTime<Utc>,
    ) -> Result<Option<BackupJob>, AppError> {
        self.transition(id, BackupStatus::Completed, |job| {
            job.name = Some(artifact.name.clone());
            job.disk = Some(artifact.disk.clone());
            job.path = Some(artifact.path.clone());
            job.file_size = Some(artifact.size);
            job.completed_at = Some(at);
        })
    }

    async fn mark_failed(
        &self,
        id: Uuid,
        error: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<BackupJob>, AppError> {
        self.transition(id, BackupStatus::Failed, |job| {
            job.error_message = Some(error.to_string());
            job.completed_at = Some(at);
        })
    }

    async fn retention_candidates(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<BackupJob>, AppError> {
        self.check_available()?;
        let mut jobs: Vec<BackupJob> = lock(&self.jobs)
            .iter()
            .filter(|j| {
                j.backup_type == BackupType::Scheduled
                    && j.status == BackupStatus::Completed
                    && j.created_at < cutoff
            })
            .cloned()
            .collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(jobs)
    }

    async fn created_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<BackupJob>, AppError> {
        self.check_available()?;
        let mut jobs: Vec<BackupJob> = lock(&self.jobs)
            .iter()
            .filter(|j| j.created_at < cutoff)
            .cloned()
            .collect();
        jobs.sort_by_key(|j| j.created_at);
        Ok(jobs)
    }

    async fn delete(&self, id: Uuid) -> Result<bool, AppError> {
        self.check_available()?;
        let mut jobs = lock(&self.jobs);
        let before = jobs.len();
        jobs.retain(|j| j.id != id);
        Ok(jobs.len() < before)
    }

    async fn list_recent(&self, limit: i64) -> Result<Vec<BackupListing>, AppError> {
        self.check_available()?;
        let names = lock(&self.user_names).clone();
        let mut jobs = lock(&self.jobs).clone();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(jobs
            .into_iter()
            .take(limit.max(0) as usize)
            .map(|job| BackupListing {
                creator_name: job.created_by.and_then(|id| names.get(&id).cloned()),
                job,
            })
            .collect())
    }

    async fn stats(&self, now: DateTime<Utc>) -> Result<BackupStats, AppError> {
        self.check_available()?;
        let jobs = lock(&self.jobs).clone();
        let recent_since = now - Duration::days(RECENT_DAYS);
        let count = |status: BackupStatus| jobs.iter().filter(|j| j.status == status).count() as i64;

        let mut recent_failures: Vec<BackupJob> = jobs
            .iter()
            .filter(|j| j.status == BackupStatus::Failed && j.created_at >= recent_since)
            .cloned()
            .collect();
        recent_failures.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        recent_failures.truncate(RECENT_FAILURES_SHOWN as usize);

        Ok(BackupStats {
            total: jobs.len() as i64,
            completed: count(BackupStatus::Completed),
            failed: count(BackupStatus::Failed),
            running: count(BackupStatus::Running),
            recent: jobs.iter().filter(|j| j.created_at >= recent_since).count() as i64,
            total_size: jobs
                .iter()
                .filter(|j| j.status == BackupStatus::Completed)
                .filter_map(|j| j.file_size)
                .sum(),
            recent_failures,
        })
    }
}

// ---------------------------------------------------------------------------
// Disk
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemoryDisk {
    files: Mutex<HashMap<String, u64>>,
    fail_deletes: Mutex<bool>,
}

impl MemoryDisk {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, path: &str, size: u64) {
        lock(&self.files).insert(path.to_string(), size);
    }

    /// Drop a file behind the repository's back.
    pub fn remove(&self, path: &str) {
        lock(&self.files).remove(path);
    }

    pub fn contains(&self, path: &str) -> bool {
        lock(&self.files).contains_key(path)
    }

    pub fn len(&self) -> usize {
        lock(&self.files).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn fail_deletes(&self, fail: bool) {
        *lock(&self.fail_deletes) = fail;
    }
}

#[async_trait]
impl Disk for MemoryDisk {
    async fn exists(&self, path: &str) -> Result<bool, AppError> {
        Ok(self.contains(path))
    }

    async fn size(&self, path: &str) -> Result<u64, AppError> {
        lock(&self.files)
            .get(path)
            .copied()
            .ok_or_else(|| AppError::Storage(format!("{}: not found", path)))
    }

    async fn delete(&self, path: &str) -> Result<bool, AppError> {
        if *lock(&self.fail_deletes) {
            return Err(AppError::Storage(format!("{}: permission denied", path)));
        }
        Ok(lock(&self.files).remove(path).is_some())
    }
}

// ---------------------------------------------------------------------------
// Queue
// ---------------------------------------------------------------------------

/// Queue that keeps ready and parked envelopes in memory.
#[derive(Default)]
pub struct MemoryJobQueue {
    enqueued: Mutex<Vec<Uuid>>,
    ready: Mutex<VecDeque<JobEnvelope>>,
    delayed: Mutex<Vec<(JobEnvelope, DateTime<Utc>)>>,
}

impl MemoryJobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueued(&self) -> Vec<Uuid> {
        lock(&self.enqueued).clone()
    }

    /// Parked envelopes with their due times.
    pub fn delayed(&self) -> Vec<(JobEnvelope, DateTime<Utc>)> {
        lock(&self.delayed).clone()
    }
}

#[async_trait]
impl JobQueue for MemoryJobQueue {
    async fn enqueue(&self, job_id: Uuid) -> Result<(), AppError> {
        lock(&self.enqueued).push(job_id);
        lock(&self.ready).push_back(JobEnvelope::first(job_id));
        Ok(())
    }
}

#[async_trait]
impl WorkQueue for MemoryJobQueue {
    async fn pop(&self, _wait: StdDuration) -> Result<Option<JobEnvelope>, AppError> {
        Ok(lock(&self.ready).pop_front())
    }

    async fn schedule(
        &self,
        envelope: &JobEnvelope,
        delay: StdDuration,
        now: DateTime<Utc>,
    ) -> Result<(), AppError> {
        let delay = Duration::from_std(delay)
            .map_err(|e| AppError::Internal(format!("Invalid delay: {}", e)))?;
        lock(&self.delayed).push((*envelope, now + delay));
        Ok(())
    }

    async fn promote_due(&self, now: DateTime<Utc>) -> Result<usize, AppError> {
        let mut delayed = lock(&self.delayed);
        let (due, waiting): (Vec<_>, Vec<_>) = delayed.drain(..).partition(|(_, at)| *at <= now);
        *delayed = waiting;
        let promoted = due.len();
        lock(&self.ready).extend(due.into_iter().map(|(envelope, _)| envelope));
        Ok(promoted)
    }
}

// ---------------------------------------------------------------------------
// Tool
// ---------------------------------------------------------------------------

/// How the fake tool behaves on its next runs.
#[derive(Debug, Clone)]
pub enum ToolScript {
    /// Exit 0 and write an artifact of the given size
    Succeed { size: u64 },
    /// Exit 0 without writing anything
    SucceedWithoutArtifact,
    /// Exit non-zero with the given output
    Fail { exit_code: i32, output: String },
}

/// Backup tool that writes into a `MemoryDisk` instead of spawning a process.
pub struct ScriptedBackupTool {
    disk: Arc<MemoryDisk>,
    archive_dir: String,
    script: Mutex<ToolScript>,
    requests: Mutex<Vec<BackupRequest>>,
}

impl ScriptedBackupTool {
    pub fn new(disk: Arc<MemoryDisk>, archive_dir: &str, script: ToolScript) -> Self {
        Self {
            disk,
            archive_dir: archive_dir.to_string(),
            script: Mutex::new(script),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn set_script(&self, script: ToolScript) {
        *lock(&self.script) = script;
    }

    pub fn requests(&self) -> Vec<BackupRequest> {
        lock(&self.requests).clone()
    }
}

#[async_trait]
impl BackupTool for ScriptedBackupTool {
    async fn run(&self, request: &BackupRequest) -> Result<ToolOutput, BackupError> {
        lock(&self.requests).push(request.clone());
        let script = lock(&self.script).clone();
        match script {
            ToolScript::Succeed { size } => {
                self.disk
                    .put(&format!("{}/{}", self.archive_dir, request.filename), size);
                Ok(ToolOutput {
                    exit_code: 0,
                    output: "Backup completed!".to_string(),
                })
            }
            ToolScript::SucceedWithoutArtifact => Ok(ToolOutput {
                exit_code: 0,
                output: "Backup completed!".to_string(),
            }),
            ToolScript::Fail { exit_code, output } => Ok(ToolOutput { exit_code, output }),
        }
    }
}
