//! Typed activity recorder.
//!
//! Every write site calls the recorder explicitly. After an entry is stored
//! it is handed to each subscriber in registration order; subscriber
//! failures are logged and never fail the write.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::json;

use keeper_common::error::AppError;
use keeper_common::types::{Activity, User, days_before};

use crate::store::{ActivityStore, NewActivity, RequestContext, Subject};

/// Default retention for `activities:clean`.
pub const DEFAULT_RETENTION_DAYS: i64 = 90;

pub mod log_names {
    pub const AUTHENTICATION: &str = "authentication";
    pub const SECURITY: &str = "security";
    pub const PROFILE: &str = "profile";
    pub const SYSTEM: &str = "system";
    pub const BACKUP: &str = "backup";
    pub const NOTIFICATIONS: &str = "notifications";
}

pub mod events {
    pub const LOGIN: &str = "login";
    pub const LOGOUT: &str = "logout";
    pub const FAILED_LOGIN: &str = "failed_login";
    pub const PASSWORD_CHANGED: &str = "password_changed";
    pub const PROFILE_UPDATED: &str = "profile_updated";
    pub const EMAIL_VERIFIED: &str = "email_verified";
}

/// Reacts to stored activity entries.
#[async_trait]
pub trait ActivitySubscriber: Send + Sync {
    fn name(&self) -> &'static str;

    async fn on_recorded(&self, activity: &Activity) -> Result<(), AppError>;
}

pub struct ActivityRecorder {
    store: Arc<dyn ActivityStore>,
    subscribers: Vec<Box<dyn ActivitySubscriber>>,
}

impl ActivityRecorder {
    pub fn new(store: Arc<dyn ActivityStore>, subscribers: Vec<Box<dyn ActivitySubscriber>>) -> Self {
        Self { store, subscribers }
    }

    /// Store an entry and notify subscribers.
    pub async fn log(&self, activity: NewActivity) -> Result<Activity, AppError> {
        let stored = self.store.insert(activity).await?;

        tracing::debug!(
            activity_id = %stored.id,
            log_name = %stored.log_name,
            event = stored.event.as_deref().unwrap_or(""),
            "Activity recorded"
        );

        for subscriber in &self.subscribers {
            if let Err(e) = subscriber.on_recorded(&stored).await {
                tracing::warn!(
                    subscriber = subscriber.name(),
                    activity_id = %stored.id,
                    error = %e,
                    "Activity subscriber failed"
                );
            }
        }

        Ok(stored)
    }

    pub async fn login(&self, ctx: RequestContext, user: &User) -> Result<Activity, AppError> {
        self.log(
            NewActivity::new(log_names::AUTHENTICATION, "User logged in")
                .subject(Subject::user(user.id))
                .event(events::LOGIN)
                .properties(json!({ "user_name": user.name, "user_email": user.email }))
                .context(ctx),
        )
        .await
    }

    pub async fn logout(&self, ctx: RequestContext, user: &User) -> Result<Activity, AppError> {
        self.log(
            NewActivity::new(log_names::AUTHENTICATION, "User logged out")
                .subject(Subject::user(user.id))
                .event(events::LOGOUT)
                .properties(json!({ "user_name": user.name, "user_email": user.email }))
                .context(ctx),
        )
        .await
    }

    pub async fn failed_login(&self, ctx: RequestContext, email: &str) -> Result<Activity, AppError> {
        self.log(
            NewActivity::new(log_names::AUTHENTICATION, "Failed login attempt")
                .event(events::FAILED_LOGIN)
                .properties(json!({ "email": email }))
                .context(ctx),
        )
        .await
    }

    pub async fn password_changed(
        &self,
        ctx: RequestContext,
        user: &User,
    ) -> Result<Activity, AppError> {
        self.log(
            NewActivity::new(log_names::SECURITY, "Password changed")
                .subject(Subject::user(user.id))
                .event(events::PASSWORD_CHANGED)
                .properties(json!({ "user_name": user.name }))
                .context(ctx),
        )
        .await
    }

    pub async fn profile_updated(
        &self,
        ctx: RequestContext,
        user: &User,
        changes: serde_json::Value,
    ) -> Result<Activity, AppError> {
        self.log(
            NewActivity::new(log_names::PROFILE, "Profile updated")
                .subject(Subject::user(user.id))
                .event(events::PROFILE_UPDATED)
                .properties(json!({ "changes": changes }))
                .context(ctx),
        )
        .await
    }

    pub async fn email_verified(
        &self,
        ctx: RequestContext,
        user: &User,
    ) -> Result<Activity, AppError> {
        self.log(
            NewActivity::new(log_names::AUTHENTICATION, "Email verified")
                .subject(Subject::user(user.id))
                .event(events::EMAIL_VERIFIED)
                .properties(json!({ "email": user.email }))
                .context(ctx),
        )
        .await
    }

    pub async fn system(
        &self,
        description: &str,
        properties: serde_json::Value,
    ) -> Result<Activity, AppError> {
        self.log(NewActivity::new(log_names::SYSTEM, description).properties(properties))
            .await
    }

    /// Newest entries first.
    pub async fn recent(&self, limit: i64) -> Result<Vec<Activity>, AppError> {
        self.store.recent(limit).await
    }

    /// Delete entries older than `days` days as of `now`.
    pub async fn prune_older_than(&self, days: i64, now: DateTime<Utc>) -> Result<u64, AppError> {
        if days < 1 {
            return Err(AppError::Validation(
                "days must be a positive integer".to_string(),
            ));
        }

        let cutoff = days_before(now, days)
            .ok_or_else(|| AppError::Validation("Days out of range".to_string()))?;
        let removed = self.store.delete_before(cutoff).await?;

        tracing::info!(removed, days, cutoff = %cutoff, "Pruned old activities");
        Ok(removed)
    }
}
