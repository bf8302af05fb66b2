//! Preference store: per-user, per-category channel toggles.
//!
//! A missing row means "every channel enabled". The first read of a
//! (user, category) pair materializes that default row.

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use keeper_common::error::AppError;
use keeper_common::types::{ChannelToggles, NotificationCategory, NotificationPreference};

#[async_trait]
pub trait PreferenceStore: Send + Sync {
    /// Return the preference row, creating it with all channels enabled if absent.
    async fn resolve(
        &self,
        user_id: Uuid,
        category: NotificationCategory,
    ) -> Result<NotificationPreference, AppError>;

    /// Set the toggles for a (user, category) pair, creating the row if needed.
    async fn update(
        &self,
        user_id: Uuid,
        category: NotificationCategory,
        toggles: ChannelToggles,
    ) -> Result<NotificationPreference, AppError>;

    /// All categories for a user, in `NotificationCategory::ALL` order.
    async fn list(&self, user_id: Uuid) -> Result<Vec<NotificationPreference>, AppError> {
        let mut prefs = Vec::with_capacity(NotificationCategory::ALL.len());
        for category in NotificationCategory::ALL {
            prefs.push(self.resolve(user_id, category).await?);
        }
        Ok(prefs)
    }
}

/// PostgreSQL-backed preference store.
pub struct PgPreferenceStore {
    pool: PgPool,
}

impl PgPreferenceStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const PREFERENCE_COLUMNS: &str =
    "user_id, category, push_enabled, email_enabled, database_enabled, settings, created_at, updated_at";

#[async_trait]
impl PreferenceStore for PgPreferenceStore {
    async fn resolve(
        &self,
        user_id: Uuid,
        category: NotificationCategory,
    ) -> Result<NotificationPreference, AppError> {
        let existing: Option<NotificationPreference> = sqlx::query_as(&format!(
            "SELECT {PREFERENCE_COLUMNS} FROM notification_preferences WHERE user_id = $1 AND category = $2"
        ))
        .bind(user_id)
        .bind(category.as_str())
        .fetch_optional(&self.pool)
        .await?;

        if let Some(pref) = existing {
            return Ok(pref);
        }

        // Concurrent first reads race here; the no-op DO UPDATE makes the loser
        // return the winner's row instead of inserting a duplicate.
        let pref: NotificationPreference = sqlx::query_as(&format!(
            r#"
            INSERT INTO notification_preferences (user_id, category)
            VALUES ($1, $2)
            ON CONFLICT (user_id, category) DO UPDATE SET user_id = EXCLUDED.user_id
            RETURNING {PREFERENCE_COLUMNS}
            "#
        ))
        .bind(user_id)
        .bind(category.as_str())
        .fetch_one(&self.pool)
        .await?;

        tracing::debug!(
            user_id = %user_id,
            category = %category,
            "Materialized default notification preference"
        );

        Ok(pref)
    }

    async fn update(
        &self,
        user_id: Uuid,
        category: NotificationCategory,
        toggles: ChannelToggles,
    ) -> Result<NotificationPreference, AppError> {
        let pref: NotificationPreference = sqlx::query_as(&format!(
            r#"
            INSERT INTO notification_preferences
                (user_id, category, push_enabled, email_enabled, database_enabled)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (user_id, category) DO UPDATE SET
                push_enabled = EXCLUDED.push_enabled,
                email_enabled = EXCLUDED.email_enabled,
                database_enabled = EXCLUDED.database_enabled,
                updated_at = NOW()
            RETURNING {PREFERENCE_COLUMNS}
            "#
        ))
        .bind(user_id)
        .bind(category.as_str())
        .bind(toggles.push)
        .bind(toggles.email)
        .bind(toggles.database)
        .fetch_one(&self.pool)
        .await?;

        tracing::info!(
            user_id = %user_id,
            category = %category,
            push = toggles.push,
            email = toggles.email,
            database = toggles.database,
            "Notification preference updated"
        );

        Ok(pref)
    }
}
