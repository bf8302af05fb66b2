//! Keeper background worker: consumes the backup queue and runs the
//! backup schedule.

use std::sync::Arc;
use std::time::Duration;

use keeper_backup::orchestrator::{BackupNotifier, BackupOrchestrator};
use keeper_backup::queue::{BackupQueue, QueueWorker, RetryPolicy};
use keeper_backup::repository::{BackupRepository, PgBackupRepository};
use keeper_backup::retention::RetentionSweeper;
use keeper_backup::scheduler::BackupScheduler;
use keeper_backup::service::BackupService;
use keeper_backup::{command_tool, disk_registry};
use keeper_common::config::AppConfig;
use keeper_common::db;
use keeper_common::redis_pool::create_redis_pool;
use keeper_notifier::users::PgUserDirectory;
use keeper_notifier::{app_links, pg_dispatcher};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "keeper_worker=info,keeper_backup=info,keeper_notifier=info".into()),
        )
        .json()
        .init();

    tracing::info!("Keeper worker starting...");

    let config = AppConfig::from_env()?;

    let pool = db::create_pool(&config.database_url, config.db_max_connections).await?;
    db::migrate(&pool).await?;

    let redis = create_redis_pool(&config.redis_url).await?;
    let queue = BackupQueue::new(redis);

    let dispatcher = Arc::new(pg_dispatcher(&pool, &config)?);
    let repo: Arc<dyn BackupRepository> = Arc::new(PgBackupRepository::new(pool.clone()));
    let disks = disk_registry(&config);

    let orchestrator = Arc::new(BackupOrchestrator::new(
        repo.clone(),
        disks.clone(),
        Arc::new(command_tool(&config)),
        BackupNotifier::new(
            dispatcher,
            Arc::new(PgUserDirectory::new(pool.clone())),
            app_links(&config),
        ),
        config.backup_disk.clone(),
        config.backup_archive_dir.clone(),
    ));
    let worker = QueueWorker::new(
        Arc::new(queue.clone()),
        orchestrator,
        RetryPolicy::from_config(&config),
    );

    let service = Arc::new(BackupService::new(repo.clone(), disks.clone(), Arc::new(queue)));
    let scheduler = BackupScheduler::new(
        service,
        RetentionSweeper::new(repo, disks),
        Duration::from_secs(config.backup_schedule_interval_hours.max(1) * 3600),
    );

    // Run with graceful shutdown on Ctrl+C
    tokio::select! {
        result = worker.run() => {
            if let Err(e) = result {
                tracing::error!(error = %e, "Backup queue worker exited with error");
                return Err(e);
            }
        }
        result = scheduler.run() => {
            if let Err(e) = result {
                tracing::error!(error = %e, "Backup scheduler exited with error");
                return Err(e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received shutdown signal, stopping gracefully...");
        }
    }

    tracing::info!("Keeper worker stopped.");
    Ok(())
}
