//! Security alert subscriber: warns users about sensitive account changes.

use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use keeper_common::error::AppError;
use keeper_common::types::{Activity, Severity};
use keeper_notifier::dispatcher::Dispatcher;
use keeper_notifier::kinds::{self, AppLinks};
use keeper_notifier::users::UserDirectory;

use crate::recorder::{ActivitySubscriber, events};

pub struct SecurityAlerts {
    users: Arc<dyn UserDirectory>,
    dispatcher: Arc<Dispatcher>,
    links: AppLinks,
}

impl SecurityAlerts {
    pub fn new(users: Arc<dyn UserDirectory>, dispatcher: Arc<Dispatcher>, links: AppLinks) -> Self {
        Self {
            users,
            dispatcher,
            links,
        }
    }
}

#[async_trait]
impl ActivitySubscriber for SecurityAlerts {
    fn name(&self) -> &'static str {
        "security_alerts"
    }

    async fn on_recorded(&self, activity: &Activity) -> Result<(), AppError> {
        if activity.event.as_deref() != Some(events::PASSWORD_CHANGED)
            || activity.subject_type.as_deref() != Some("user")
        {
            return Ok(());
        }

        let user_id = activity
            .subject_id
            .as_deref()
            .and_then(|id| id.parse::<Uuid>().ok())
            .ok_or_else(|| AppError::Internal("password change without user subject".to_string()))?;

        let Some(user) = self.users.find(user_id).await? else {
            tracing::warn!(user_id = %user_id, "Password changed for unknown user");
            return Ok(());
        };

        let notification = kinds::system_alert(
            &self.links,
            "Your password was changed",
            "The password on your account was just changed. If this wasn't you, reset it immediately.",
            Severity::Warning,
            None,
        );
        self.dispatcher
            .dispatch(&notification, std::slice::from_ref(&user))
            .await;

        Ok(())
    }
}
