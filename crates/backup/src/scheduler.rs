use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::{Instant, MissedTickBehavior};

use keeper_common::error::AppError;
use keeper_common::types::{BackupComponent, BackupJob, BackupType};

use crate::retention::{RetentionReport, RetentionSweeper};
use crate::service::BackupService;

/// Periodically queues a full scheduled backup, then applies retention.
pub struct BackupScheduler {
    service: Arc<BackupService>,
    sweeper: RetentionSweeper,
    interval: Duration,
}

impl BackupScheduler {
    pub fn new(service: Arc<BackupService>, sweeper: RetentionSweeper, interval: Duration) -> Self {
        Self {
            service,
            sweeper,
            interval,
        }
    }

    pub async fn tick(&self, now: DateTime<Utc>) -> Result<(BackupJob, RetentionReport), AppError> {
        let job = self
            .service
            .create(
                BackupType::Scheduled,
                &[BackupComponent::Database, BackupComponent::Files],
                None,
            )
            .await?;
        let report = self.sweeper.enforce_retention(now).await?;
        Ok((job, report))
    }

    /// Run until the task is cancelled. The first backup is queued one
    /// interval after start.
    pub async fn run(&self) -> anyhow::Result<()> {
        tracing::info!(
            interval_secs = self.interval.as_secs(),
            "Backup scheduler started"
        );

        let mut ticker = tokio::time::interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            match self.tick(Utc::now()).await {
                Ok((job, report)) => tracing::info!(
                    backup_id = %job.id,
                    swept = report.total(),
                    "Scheduled backup queued"
                ),
                Err(e) => tracing::error!(error = %e, "Scheduled backup failed to start"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disk::DiskRegistry;
    use crate::memory::{MemoryBackupRepository, MemoryJobQueue};
    use keeper_common::types::BackupStatus;

    #[tokio::test]
    async fn test_tick_queues_full_scheduled_backup() {
        let repo = Arc::new(MemoryBackupRepository::new());
        let queue = Arc::new(MemoryJobQueue::new());
        let service = Arc::new(BackupService::new(
            repo.clone(),
            DiskRegistry::new(),
            queue.clone(),
        ));
        let scheduler = BackupScheduler::new(
            service,
            RetentionSweeper::new(repo.clone(), DiskRegistry::new()),
            Duration::from_secs(3600),
        );

        let (job, report) = scheduler.tick(Utc::now()).await.unwrap();

        assert_eq!(job.backup_type, BackupType::Scheduled);
        assert_eq!(job.status, BackupStatus::Pending);
        assert!(job.created_by.is_none());
        assert_eq!(
            job.includes.0,
            vec![BackupComponent::Database, BackupComponent::Files]
        );
        assert_eq!(queue.enqueued(), vec![job.id]);
        assert_eq!(report.total(), 0);
    }
}
