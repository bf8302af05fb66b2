//! Tiered retention for scheduled backups.
//!
//! Each tier looks at completed scheduled jobs older than its age, keeps the
//! newest `keep` of them and deletes the rest. Tiers run in order and each
//! sees the result of the previous one.

use std::sync::Arc;

use chrono::{DateTime, Duration, Months, Utc};
use serde::Serialize;

use keeper_common::error::AppError;

use crate::disk::DiskRegistry;
use crate::repository::BackupRepository;
use crate::service::delete_with_artifact;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    Daily,
    Weekly,
    Monthly,
}

impl Tier {
    pub const ALL: [Tier; 3] = [Tier::Daily, Tier::Weekly, Tier::Monthly];

    pub fn keep(self) -> usize {
        match self {
            Tier::Daily => 7,
            Tier::Weekly => 4,
            Tier::Monthly => 12,
        }
    }

    /// Jobs created before this instant fall into the tier.
    pub fn cutoff(self, now: DateTime<Utc>) -> DateTime<Utc> {
        let cutoff = match self {
            Tier::Daily => now.checked_sub_signed(Duration::days(7)),
            Tier::Weekly => now.checked_sub_months(Months::new(1)),
            Tier::Monthly => now.checked_sub_months(Months::new(12)),
        };
        cutoff.unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Tier::Daily => "daily",
            Tier::Weekly => "weekly",
            Tier::Monthly => "monthly",
        }
    }
}

/// Deleted job count per tier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RetentionReport {
    pub daily: u64,
    pub weekly: u64,
    pub monthly: u64,
}

impl RetentionReport {
    pub fn total(&self) -> u64 {
        self.daily + self.weekly + self.monthly
    }

    fn record(&mut self, tier: Tier, deleted: u64) {
        match tier {
            Tier::Daily => self.daily += deleted,
            Tier::Weekly => self.weekly += deleted,
            Tier::Monthly => self.monthly += deleted,
        }
    }
}

pub struct RetentionSweeper {
    repo: Arc<dyn BackupRepository>,
    disks: DiskRegistry,
}

impl RetentionSweeper {
    pub fn new(repo: Arc<dyn BackupRepository>, disks: DiskRegistry) -> Self {
        Self { repo, disks }
    }

    pub async fn enforce_retention(&self, now: DateTime<Utc>) -> Result<RetentionReport, AppError> {
        let mut report = RetentionReport::default();

        for tier in Tier::ALL {
            let candidates = self.repo.retention_candidates(tier.cutoff(now)).await?;
            let mut deleted = 0;
            for job in candidates.iter().skip(tier.keep()) {
                if delete_with_artifact(self.repo.as_ref(), &self.disks, job).await? {
                    deleted += 1;
                }
            }
            report.record(tier, deleted);
        }

        if report.total() > 0 {
            tracing::info!(
                daily = report.daily,
                weekly = report.weekly,
                monthly = report.monthly,
                "Backup retention enforced"
            );
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryBackupRepository, MemoryDisk, job};
    use crate::repository::CompletedArtifact;
    use chrono::TimeZone;
    use keeper_common::types::{BackupJob, BackupStatus, BackupType};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 15, 12, 0, 0).unwrap()
    }

    struct Fixture {
        repo: Arc<MemoryBackupRepository>,
        disk: Arc<MemoryDisk>,
        sweeper: RetentionSweeper,
    }

    fn fixture() -> Fixture {
        let repo = Arc::new(MemoryBackupRepository::new());
        let disk = Arc::new(MemoryDisk::new());
        let sweeper = RetentionSweeper::new(
            repo.clone(),
            DiskRegistry::new().with_disk("local", disk.clone()),
        );
        Fixture { repo, disk, sweeper }
    }

    async fn scheduled(f: &Fixture, days_old: i64) -> BackupJob {
        let created_at = now() - Duration::days(days_old);
        let seeded = f
            .repo
            .insert(job(BackupType::Scheduled, BackupStatus::Pending, created_at));
        let path = format!("keeper/backup_{}.zip", days_old);
        f.disk.put(&path, 10);
        f.repo.mark_running(seeded.id, created_at).await.unwrap();
        f.repo
            .mark_completed(
                seeded.id,
                &CompletedArtifact {
                    name: format!("backup_{}.zip", days_old),
                    disk: "local".to_string(),
                    path,
                    size: 10,
                },
                created_at,
            )
            .await
            .unwrap()
            .unwrap()
    }

    #[tokio::test]
    async fn test_daily_tier_keeps_seven_newest() {
        let f = fixture();
        let mut jobs = Vec::new();
        for days in 8..=17 {
            jobs.push(scheduled(&f, days).await);
        }

        let report = f.sweeper.enforce_retention(now()).await.unwrap();

        assert_eq!(report, RetentionReport { daily: 3, weekly: 0, monthly: 0 });
        for done in &jobs[..7] {
            assert!(f.repo.get(done.id).is_some());
        }
        for done in &jobs[7..] {
            assert!(f.repo.get(done.id).is_none());
            assert!(!f.disk.contains(done.path.as_deref().unwrap()));
        }
    }

    #[tokio::test]
    async fn test_older_job_is_swept_by_the_daily_tier_first() {
        let f = fixture();
        let mut jobs = Vec::new();
        for days in 8..=17 {
            jobs.push(scheduled(&f, days).await);
        }
        let month_old = scheduled(&f, 40).await;

        let report = f.sweeper.enforce_retention(now()).await.unwrap();

        // The 40-day job ranks last among daily candidates, so weekly never sees it
        assert_eq!(report, RetentionReport { daily: 4, weekly: 0, monthly: 0 });
        assert!(f.repo.get(month_old.id).is_none());
        assert!(!f.disk.contains(month_old.path.as_deref().unwrap()));
        for kept in &jobs[..7] {
            assert!(f.repo.get(kept.id).is_some());
        }
        assert_eq!(f.repo.len(), 7);
    }

    #[tokio::test]
    async fn test_weekly_tier_keeps_four() {
        let f = fixture();
        let mut jobs = Vec::new();
        for days in 40..=44 {
            jobs.push(scheduled(&f, days).await);
        }

        let report = f.sweeper.enforce_retention(now()).await.unwrap();

        assert_eq!(report, RetentionReport { daily: 0, weekly: 1, monthly: 0 });
        assert!(f.repo.get(jobs[4].id).is_none());
        assert_eq!(f.repo.len(), 4);
    }

    #[tokio::test]
    async fn test_second_run_deletes_nothing() {
        let f = fixture();
        for days in 8..=30 {
            scheduled(&f, days).await;
        }

        let first = f.sweeper.enforce_retention(now()).await.unwrap();
        let second = f.sweeper.enforce_retention(now()).await.unwrap();

        assert!(first.total() > 0);
        assert_eq!(second, RetentionReport::default());
    }

    #[tokio::test]
    async fn test_manual_and_failed_jobs_are_never_swept() {
        let f = fixture();
        for days in 100..120 {
            f.repo.insert(job(
                BackupType::Manual,
                BackupStatus::Completed,
                now() - Duration::days(days),
            ));
            f.repo.insert(job(
                BackupType::Scheduled,
                BackupStatus::Failed,
                now() - Duration::days(days),
            ));
        }

        let report = f.sweeper.enforce_retention(now()).await.unwrap();

        assert_eq!(report.total(), 0);
        assert_eq!(f.repo.len(), 40);
    }

    #[tokio::test]
    async fn test_missing_artifact_does_not_stop_the_sweep() {
        let f = fixture();
        let mut jobs = Vec::new();
        for days in 8..=16 {
            jobs.push(scheduled(&f, days).await);
        }
        f.disk.remove(jobs[8].path.as_deref().unwrap());

        let report = f.sweeper.enforce_retention(now()).await.unwrap();

        assert_eq!(report.daily, 2);
        assert!(f.repo.get(jobs[8].id).is_none());
    }

    #[test]
    fn test_weekly_cutoff_is_calendar_month() {
        let cutoff = Tier::Weekly.cutoff(Utc.with_ymd_and_hms(2025, 3, 31, 0, 0, 0).unwrap());
        assert_eq!(cutoff, Utc.with_ymd_and_hms(2025, 2, 28, 0, 0, 0).unwrap());
    }
}
