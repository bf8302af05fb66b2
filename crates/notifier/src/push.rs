//! Push subscription lifecycle: subscribe with a welcome push, unsubscribe,
//! status, age-based cleanup, and ad-hoc sends to subscribed users.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use uuid::Uuid;

use keeper_common::error::AppError;
use keeper_common::types::{PushSubscription, User};

use crate::dispatcher::{DispatchResult, Dispatcher};
use crate::kinds::{self, AppLinks};
use crate::notification::Notification;
use crate::subscriptions::{NewPushSubscription, SubscriptionStore};
use crate::users::UserDirectory;

/// Subscriptions not refreshed for this many days are pruned.
pub const IDLE_SUBSCRIPTION_DAYS: i64 = 365;

#[derive(Debug, Clone, Serialize)]
pub struct PushStatus {
    pub subscribed: bool,
    pub subscription_count: i64,
}

pub struct PushService {
    subscriptions: Arc<dyn SubscriptionStore>,
    users: Arc<dyn UserDirectory>,
    dispatcher: Arc<Dispatcher>,
    links: AppLinks,
}

impl PushService {
    pub fn new(
        subscriptions: Arc<dyn SubscriptionStore>,
        users: Arc<dyn UserDirectory>,
        dispatcher: Arc<Dispatcher>,
        links: AppLinks,
    ) -> Self {
        Self {
            subscriptions,
            users,
            dispatcher,
            links,
        }
    }

    /// Store the subscription, then greet the user on it.
    ///
    /// The welcome push is best-effort; its outcome never fails the subscribe.
    pub async fn subscribe(
        &self,
        user: &User,
        params: &NewPushSubscription,
    ) -> Result<PushSubscription, AppError> {
        let subscription = self.subscriptions.subscribe(user.id, params).await?;
        self.send_welcome(user).await;
        Ok(subscription)
    }

    pub async fn send_welcome(&self, user: &User) -> DispatchResult {
        let notification = kinds::welcome(&self.links);
        self.dispatcher
            .dispatch(&notification, std::slice::from_ref(user))
            .await
    }

    pub async fn unsubscribe(&self, user: &User, endpoint: &str) -> Result<bool, AppError> {
        self.subscriptions.unsubscribe(user.id, endpoint).await
    }

    pub async fn status(&self, user: &User) -> Result<PushStatus, AppError> {
        let subscription_count = self.subscriptions.count_for_user(user.id).await?;
        Ok(PushStatus {
            subscribed: subscription_count > 0,
            subscription_count,
        })
    }

    /// Send `notification` to those of `user_ids` holding a subscription.
    pub async fn send_to_users(
        &self,
        user_ids: &[Uuid],
        notification: &Notification,
    ) -> Result<DispatchResult, AppError> {
        let subscribed = self.subscriptions.subscribed_user_ids().await?;
        let targets: Vec<Uuid> = subscribed
            .into_iter()
            .filter(|id| user_ids.contains(id))
            .collect();
        self.send_to_subscribed(&targets, notification).await
    }

    /// Send `notification` to every user holding a subscription.
    pub async fn send_to_all(&self, notification: &Notification) -> Result<DispatchResult, AppError> {
        let subscribed = self.subscriptions.subscribed_user_ids().await?;
        self.send_to_subscribed(&subscribed, notification).await
    }

    async fn send_to_subscribed(
        &self,
        user_ids: &[Uuid],
        notification: &Notification,
    ) -> Result<DispatchResult, AppError> {
        let mut recipients = Vec::with_capacity(user_ids.len());
        for id in user_ids {
            match self.users.find(*id).await? {
                Some(user) => recipients.push(user),
                None => tracing::warn!(user_id = %id, "Subscription held by unknown user"),
            }
        }
        if recipients.is_empty() {
            return Err(AppError::NotFound(
                "No users with push subscriptions found".to_string(),
            ));
        }

        tracing::info!(
            kind = notification.kind,
            recipients = recipients.len(),
            "Sending push notification"
        );
        Ok(self.dispatcher.dispatch(notification, &recipients).await)
    }

    /// Remove subscriptions idle for more than a year as of `now`.
    pub async fn cleanup(&self, now: DateTime<Utc>) -> Result<u64, AppError> {
        let cutoff = now - Duration::days(IDLE_SUBSCRIPTION_DAYS);
        self.subscriptions.prune_idle(cutoff).await
    }
}
