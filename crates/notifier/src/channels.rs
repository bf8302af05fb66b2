//! Channel senders: one per delivery mechanism.

use std::sync::Arc;

use async_trait::async_trait;

use keeper_common::error::AppError;
use keeper_common::types::{Channel, User};

use crate::inbox::Inbox;
use crate::notification::Notification;
use crate::subscriptions::SubscriptionStore;
use crate::transport::{EmailTransport, PushTransport};

/// Trait that every delivery channel implements.
#[async_trait]
pub trait ChannelSender: Send + Sync {
    fn channel(&self) -> Channel;

    /// Structural precondition: whether the user can be reached on this channel at all.
    async fn is_reachable(&self, user: &User) -> Result<bool, AppError>;

    /// Render and deliver the notification to one user.
    async fn send(&self, user: &User, notification: &Notification) -> Result<(), AppError>;
}

/// Web Push to every live subscription of the user.
pub struct PushChannel {
    subscriptions: Arc<dyn SubscriptionStore>,
    transport: Arc<dyn PushTransport>,
    default_icon: String,
}

impl PushChannel {
    pub fn new(
        subscriptions: Arc<dyn SubscriptionStore>,
        transport: Arc<dyn PushTransport>,
        default_icon: String,
    ) -> Self {
        Self {
            subscriptions,
            transport,
            default_icon,
        }
    }
}

#[async_trait]
impl ChannelSender for PushChannel {
    fn channel(&self) -> Channel {
        Channel::Push
    }

    async fn is_reachable(&self, user: &User) -> Result<bool, AppError> {
        Ok(self.subscriptions.count_for_user(user.id).await? > 0)
    }

    /// Succeeds if at least one endpoint accepted the message. Stale endpoints
    /// are logged and left in place; pruning is age-based only.
    async fn send(&self, user: &User, notification: &Notification) -> Result<(), AppError> {
        let subscriptions = self.subscriptions.list_for_user(user.id).await?;
        if subscriptions.is_empty() {
            return Err(AppError::Transport(
                "No live push subscriptions".to_string(),
            ));
        }

        let message = notification.to_push_message(&self.default_icon);
        let mut delivered = 0usize;
        let mut last_error = None;

        for subscription in &subscriptions {
            match self.transport.deliver(subscription, &message).await {
                Ok(()) => delivered += 1,
                Err(e) => {
                    tracing::warn!(
                        user_id = %user.id,
                        subscription_id = %subscription.id,
                        error = %e,
                        "Push delivery to endpoint failed"
                    );
                    last_error = Some(e);
                }
            }
        }

        match last_error {
            Some(e) if delivered == 0 => Err(AppError::Transport(format!(
                "All {} push endpoints failed: {}",
                subscriptions.len(),
                e
            ))),
            _ => Ok(()),
        }
    }
}

/// Email to the user's address.
pub struct EmailChannel {
    transport: Arc<dyn EmailTransport>,
}

impl EmailChannel {
    pub fn new(transport: Arc<dyn EmailTransport>) -> Self {
        Self { transport }
    }
}

#[async_trait]
impl ChannelSender for EmailChannel {
    fn channel(&self) -> Channel {
        Channel::Email
    }

    async fn is_reachable(&self, user: &User) -> Result<bool, AppError> {
        Ok(!user.email.trim().is_empty())
    }

    async fn send(&self, user: &User, notification: &Notification) -> Result<(), AppError> {
        let mail = notification.to_mail(user);
        self.transport.send(&user.email, &mail).await
    }
}

/// Persisted in-app record, created unread.
pub struct DatabaseChannel {
    inbox: Arc<dyn Inbox>,
}

impl DatabaseChannel {
    pub fn new(inbox: Arc<dyn Inbox>) -> Self {
        Self { inbox }
    }
}

#[async_trait]
impl ChannelSender for DatabaseChannel {
    fn channel(&self) -> Channel {
        Channel::Database
    }

    async fn is_reachable(&self, _user: &User) -> Result<bool, AppError> {
        Ok(true)
    }

    async fn send(&self, user: &User, notification: &Notification) -> Result<(), AppError> {
        self.inbox
            .record(user.id, notification.kind, notification.to_database_record())
            .await?;
        Ok(())
    }
}
