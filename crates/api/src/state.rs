//! Shared application state for the Axum API server.

use std::sync::Arc;

use sqlx::PgPool;

use keeper_audit::recorder::ActivityRecorder;
use keeper_audit::security::SecurityAlerts;
use keeper_audit::store::PgActivityStore;
use keeper_backup::disk_registry;
use keeper_backup::queue::JobQueue;
use keeper_backup::repository::PgBackupRepository;
use keeper_backup::service::BackupService;
use keeper_common::config::AppConfig;
use keeper_common::error::AppError;
use keeper_common::settings::SettingsService;
use keeper_notifier::dispatcher::Dispatcher;
use keeper_notifier::inbox::{Inbox, PgInbox};
use keeper_notifier::kinds::AppLinks;
use keeper_notifier::preferences::{PgPreferenceStore, PreferenceStore};
use keeper_notifier::push::PushService;
use keeper_notifier::subscriptions::PgSubscriptionStore;
use keeper_notifier::users::{PgUserDirectory, UserDirectory};
use keeper_notifier::{app_links, pg_dispatcher};

/// Application state shared across all route handlers via Axum `State`.
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: AppConfig,
    pub users: Arc<dyn UserDirectory>,
    pub dispatcher: Arc<Dispatcher>,
    pub links: AppLinks,
    pub preferences: Arc<dyn PreferenceStore>,
    pub inbox: Arc<dyn Inbox>,
    pub subscriptions: Arc<PgSubscriptionStore>,
    pub push: Arc<PushService>,
    pub backups: Arc<BackupService>,
    pub activity: Arc<ActivityRecorder>,
    pub settings: Arc<SettingsService>,
}

impl AppState {
    /// Wire PostgreSQL-backed services; backup jobs go to `queue`.
    pub fn new(pool: PgPool, config: AppConfig, queue: Arc<dyn JobQueue>) -> Result<Self, AppError> {
        let dispatcher = Arc::new(pg_dispatcher(&pool, &config)?);
        let links = app_links(&config);
        let users: Arc<dyn UserDirectory> = Arc::new(PgUserDirectory::new(pool.clone()));
        let subscriptions = Arc::new(PgSubscriptionStore::new(pool.clone()));

        let push = Arc::new(PushService::new(
            subscriptions.clone(),
            users.clone(),
            dispatcher.clone(),
            links.clone(),
        ));
        let backups = Arc::new(BackupService::new(
            Arc::new(PgBackupRepository::new(pool.clone())),
            disk_registry(&config),
            queue,
        ));
        let activity = Arc::new(ActivityRecorder::new(
            Arc::new(PgActivityStore::new(pool.clone())),
            vec![Box::new(SecurityAlerts::new(
                users.clone(),
                dispatcher.clone(),
                links.clone(),
            ))],
        ));

        Ok(Self {
            users,
            dispatcher,
            links,
            preferences: Arc::new(PgPreferenceStore::new(pool.clone())),
            inbox: Arc::new(PgInbox::new(pool.clone())),
            subscriptions,
            push,
            backups,
            activity,
            settings: Arc::new(SettingsService::new(pool.clone())),
            pool,
            config,
        })
    }
}
