//! `keeper`: maintenance commands for backups, the activity log and push
//! notifications.

mod commands;

use std::process::ExitCode;
use std::sync::Arc;

use chrono::Utc;
use clap::{Parser, Subcommand};
use uuid::Uuid;

use commands::{BackupAction, parse_backup_action};
use keeper_audit::recorder::{ActivityRecorder, DEFAULT_RETENTION_DAYS};
use keeper_audit::store::PgActivityStore;
use keeper_backup::disk_registry;
use keeper_backup::queue::BackupQueue;
use keeper_backup::repository::PgBackupRepository;
use keeper_backup::service::{BackupService, DEFAULT_LIST_LIMIT};
use keeper_common::config::AppConfig;
use keeper_common::db::create_pool;
use keeper_common::redis_pool::create_redis_pool;
use keeper_common::types::BackupType;
use keeper_notifier::kinds::{self, WebPushOptions};
use keeper_notifier::push::PushService;
use keeper_notifier::subscriptions::PgSubscriptionStore;
use keeper_notifier::users::PgUserDirectory;
use keeper_notifier::{app_links, pg_dispatcher};

#[derive(Parser, Debug)]
#[command(name = "keeper", about = "Keeper maintenance commands")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Manage backups: status, create, cleanup or list.
    #[command(name = "backup:manage")]
    BackupManage {
        /// status | create | cleanup | list
        action: String,
        /// What `create` backs up: database, files or both.
        #[arg(long = "type", default_value = "both")]
        backup_type: String,
        /// Age threshold for `cleanup`, in days (default 30).
        #[arg(long, allow_hyphen_values = true)]
        days: Option<i64>,
    },

    /// Delete activity log entries older than the given number of days.
    #[command(name = "activities:clean")]
    ActivitiesClean {
        #[arg(long, default_value_t = DEFAULT_RETENTION_DAYS, allow_hyphen_values = true)]
        days: i64,
    },

    /// Remove push subscriptions idle for more than a year.
    #[command(name = "push:cleanup")]
    PushCleanup,

    /// Send a push notification to subscribed users.
    #[command(name = "push:send")]
    PushSend {
        title: String,
        body: String,
        /// User IDs to send to; every subscribed user when omitted.
        #[arg(long = "user")]
        users: Vec<Uuid>,
        #[arg(long)]
        icon: Option<String>,
        #[arg(long)]
        badge: Option<String>,
        /// Opened when the notification is clicked.
        #[arg(long)]
        url: Option<String>,
        /// Groups notifications on the device.
        #[arg(long)]
        tag: Option<String>,
        /// Keep the notification on screen until dismissed.
        #[arg(long)]
        require_interaction: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match run(cli.command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(command: Commands) -> anyhow::Result<()> {
    tracing::debug!(?command, "Running maintenance command");

    // Validate before touching any backing service
    let backup_action = match &command {
        Commands::BackupManage {
            action,
            backup_type,
            days,
        } => Some(parse_backup_action(action, backup_type, *days).map_err(anyhow::Error::msg)?),
        Commands::ActivitiesClean { days } if *days < 1 => {
            anyhow::bail!("Days must be greater than 0")
        }
        _ => None,
    };

    let config = AppConfig::from_env()?;
    let pool = create_pool(&config.database_url, config.db_max_connections).await?;

    match command {
        Commands::BackupManage { .. } => {
            let Some(action) = backup_action else {
                return Ok(());
            };
            let redis = create_redis_pool(&config.redis_url).await?;
            let service = BackupService::new(
                Arc::new(PgBackupRepository::new(pool)),
                disk_registry(&config),
                Arc::new(BackupQueue::new(redis)),
            );
            manage_backups(&service, action).await
        }
        Commands::ActivitiesClean { days } => {
            let recorder = ActivityRecorder::new(Arc::new(PgActivityStore::new(pool)), vec![]);
            let deleted = recorder.prune_older_than(days, Utc::now()).await?;
            println!("{}", commands::format_activities_cleaned(deleted, days));
            Ok(())
        }
        Commands::PushCleanup => {
            let push = push_service(pool, &config)?;
            let removed = push.cleanup(Utc::now()).await?;
            println!("Cleaned up {} old push subscriptions.", removed);
            Ok(())
        }
        Commands::PushSend {
            title,
            body,
            users,
            icon,
            badge,
            url,
            tag,
            require_interaction,
        } => {
            let push = push_service(pool, &config)?;
            let notification = kinds::web_push(
                &app_links(&config),
                &title,
                &body,
                WebPushOptions {
                    url,
                    icon,
                    badge,
                    tag,
                    require_interaction,
                },
            );
            let result = if users.is_empty() {
                push.send_to_all(&notification).await?
            } else {
                push.send_to_users(&users, &notification).await?
            };
            println!("{}", commands::format_push_sent(&result));
            Ok(())
        }
    }
}

fn push_service(pool: sqlx::PgPool, config: &AppConfig) -> anyhow::Result<PushService> {
    let dispatcher = Arc::new(pg_dispatcher(&pool, config)?);
    Ok(PushService::new(
        Arc::new(PgSubscriptionStore::new(pool.clone())),
        Arc::new(PgUserDirectory::new(pool)),
        dispatcher,
        app_links(config),
    ))
}

async fn manage_backups(service: &BackupService, action: BackupAction) -> anyhow::Result<()> {
    match action {
        BackupAction::Status => {
            let stats = service.status(Utc::now()).await?;
            print!("{}", commands::format_status(&stats));
        }
        BackupAction::Create {
            selection,
            components,
        } => {
            let job = service.create(BackupType::Manual, &components, None).await?;
            print!("{}", commands::format_created(&job, &selection));
        }
        BackupAction::Cleanup { days } => {
            let deleted = service.cleanup_older_than(days, Utc::now()).await?;
            println!("Deleted {} backups older than {} days.", deleted, days);
        }
        BackupAction::List => {
            let listing = service.list_recent(DEFAULT_LIST_LIMIT).await?;
            print!("{}", commands::format_listing(&listing));
        }
    }
    Ok(())
}
