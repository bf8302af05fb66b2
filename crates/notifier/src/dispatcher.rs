//! Notification dispatcher: fans one notification out to every recipient
//! on every channel their preferences and the notification allow.
//!
//! For each recipient:
//! 1. Resolve the category preference (materialized with defaults if absent)
//! 2. For each channel: stored toggle → notification predicate → structural precondition
//! 3. Invoke each remaining channel independently and record the outcome
//!
//! Transport failures are logged and recorded, never returned: one recipient's
//! failing mailbox must not stop delivery to the rest of the batch.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use serde::Serialize;
use uuid::Uuid;

use keeper_common::types::{Channel, User};

use crate::channels::ChannelSender;
use crate::notification::Notification;
use crate::preferences::PreferenceStore;

/// What happened on one channel for one recipient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "error", rename_all = "snake_case")]
pub enum DeliveryOutcome {
    Delivered,
    /// Disabled by the stored toggle or narrowed out by the notification's own rules
    SkippedByPreference,
    /// The user cannot be reached on this channel (e.g. no push subscription)
    SkippedNoEndpoint,
    Failed(String),
}

impl DeliveryOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, DeliveryOutcome::Delivered)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, DeliveryOutcome::Failed(_))
    }
}

/// Per-channel outcomes for one recipient.
#[derive(Debug, Clone, Serialize)]
pub struct RecipientReport {
    pub user_id: Uuid,
    pub outcomes: BTreeMap<Channel, DeliveryOutcome>,
}

impl RecipientReport {
    /// Channels that were actually attempted (delivered or failed).
    pub fn attempted_channels(&self) -> Vec<Channel> {
        self.outcomes
            .iter()
            .filter(|(_, outcome)| outcome.is_delivered() || outcome.is_failed())
            .map(|(channel, _)| *channel)
            .collect()
    }
}

/// Result of one `dispatch` call.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DispatchResult {
    pub recipients: Vec<RecipientReport>,
}

impl DispatchResult {
    pub fn report(&self, user_id: Uuid) -> Option<&RecipientReport> {
        self.recipients.iter().find(|r| r.user_id == user_id)
    }

    pub fn outcome(&self, user_id: Uuid, channel: Channel) -> Option<&DeliveryOutcome> {
        self.report(user_id)?.outcomes.get(&channel)
    }

    pub fn delivered_count(&self) -> usize {
        self.count_matching(DeliveryOutcome::is_delivered)
    }

    pub fn failed_count(&self) -> usize {
        self.count_matching(DeliveryOutcome::is_failed)
    }

    fn count_matching(&self, predicate: fn(&DeliveryOutcome) -> bool) -> usize {
        self.recipients
            .iter()
            .flat_map(|r| r.outcomes.values())
            .filter(|o| predicate(o))
            .count()
    }
}

/// Preference-aware multi-channel dispatcher.
pub struct Dispatcher {
    preferences: Arc<dyn PreferenceStore>,
    senders: Vec<Box<dyn ChannelSender>>,
}

impl Dispatcher {
    pub fn new(preferences: Arc<dyn PreferenceStore>, senders: Vec<Box<dyn ChannelSender>>) -> Self {
        Self {
            preferences,
            senders,
        }
    }

    /// Deliver `notification` to each distinct recipient.
    pub async fn dispatch(&self, notification: &Notification, recipients: &[User]) -> DispatchResult {
        let mut seen = HashSet::new();
        let mut result = DispatchResult::default();

        for user in recipients {
            if !seen.insert(user.id) {
                continue;
            }
            result.recipients.push(self.deliver_to(notification, user).await);
        }

        tracing::info!(
            kind = notification.kind,
            category = %notification.category,
            recipients = result.recipients.len(),
            delivered = result.delivered_count(),
            failed = result.failed_count(),
            "Notification dispatched"
        );

        result
    }

    async fn deliver_to(&self, notification: &Notification, user: &User) -> RecipientReport {
        let mut outcomes = BTreeMap::new();

        let toggles = match self.preferences.resolve(user.id, notification.category).await {
            Ok(pref) => pref.toggles(),
            Err(e) => {
                tracing::error!(
                    user_id = %user.id,
                    category = %notification.category,
                    error = %e,
                    "Failed to resolve notification preference"
                );
                for channel in Channel::ALL {
                    outcomes.insert(channel, DeliveryOutcome::Failed(e.to_string()));
                }
                return RecipientReport {
                    user_id: user.id,
                    outcomes,
                };
            }
        };

        for channel in Channel::ALL {
            let outcome = if !toggles.allows(channel) || !notification.permits(channel) {
                DeliveryOutcome::SkippedByPreference
            } else {
                match self.sender_for(channel) {
                    Some(sender) => self.attempt(sender, notification, user).await,
                    None => DeliveryOutcome::SkippedNoEndpoint,
                }
            };
            outcomes.insert(channel, outcome);
        }

        RecipientReport {
            user_id: user.id,
            outcomes,
        }
    }

    async fn attempt(
        &self,
        sender: &dyn ChannelSender,
        notification: &Notification,
        user: &User,
    ) -> DeliveryOutcome {
        let channel = sender.channel();

        match sender.is_reachable(user).await {
            Ok(true) => {}
            Ok(false) => return DeliveryOutcome::SkippedNoEndpoint,
            Err(e) => {
                tracing::warn!(
                    user_id = %user.id,
                    channel = %channel,
                    category = %notification.category,
                    error = %e,
                    "Channel precondition check failed"
                );
                return DeliveryOutcome::Failed(e.to_string());
            }
        }

        match sender.send(user, notification).await {
            Ok(()) => {
                tracing::debug!(
                    user_id = %user.id,
                    channel = %channel,
                    kind = notification.kind,
                    "Notification delivered"
                );
                DeliveryOutcome::Delivered
            }
            Err(e) => {
                tracing::warn!(
                    user_id = %user.id,
                    channel = %channel,
                    category = %notification.category,
                    error = %e,
                    "Notification delivery failed"
                );
                DeliveryOutcome::Failed(e.to_string())
            }
        }
    }

    fn sender_for(&self, channel: Channel) -> Option<&dyn ChannelSender> {
        self.senders
            .iter()
            .find(|s| s.channel() == channel)
            .map(|s| s.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kinds;
    use crate::memory::{
        MemoryInbox, MemoryPreferenceStore, MemorySubscriptionStore, RecordingEmailTransport,
        RecordingPushTransport, test_user,
    };
    use crate::channels::{DatabaseChannel, EmailChannel, PushChannel};
    use crate::subscriptions::{NewPushSubscription, SubscriptionStore};
    use keeper_common::types::{ChannelToggles, NotificationCategory, Severity};

    struct Harness {
        preferences: Arc<MemoryPreferenceStore>,
        subscriptions: Arc<MemorySubscriptionStore>,
        inbox: Arc<MemoryInbox>,
        push: Arc<RecordingPushTransport>,
        email: Arc<RecordingEmailTransport>,
        dispatcher: Dispatcher,
    }

    fn harness() -> Harness {
        let preferences = Arc::new(MemoryPreferenceStore::new());
        let subscriptions = Arc::new(MemorySubscriptionStore::new());
        let inbox = Arc::new(MemoryInbox::new());
        let push = Arc::new(RecordingPushTransport::new());
        let email = Arc::new(RecordingEmailTransport::new());

        let dispatcher = Dispatcher::new(
            preferences.clone(),
            vec![
                Box::new(PushChannel::new(
                    subscriptions.clone(),
                    push.clone(),
                    "https://app.test/logo.png".to_string(),
                )),
                Box::new(EmailChannel::new(email.clone())),
                Box::new(DatabaseChannel::new(inbox.clone())),
            ],
        );

        Harness {
            preferences,
            subscriptions,
            inbox,
            push,
            email,
            dispatcher,
        }
    }

    async fn subscribe(h: &Harness, user: &User, endpoint: &str) {
        h.subscriptions
            .subscribe(
                user.id,
                &NewPushSubscription {
                    endpoint: endpoint.to_string(),
                    public_key: "p256dh".to_string(),
                    auth_token: "auth".to_string(),
                },
            )
            .await
            .unwrap();
    }

    fn links() -> kinds::AppLinks {
        kinds::AppLinks::new("https://app.test", "Keeper")
    }

    fn general() -> Notification {
        Notification::new("test", NotificationCategory::General, "Hello", "World")
    }

    #[tokio::test]
    async fn test_all_channels_delivered_by_default() {
        let h = harness();
        let user = test_user("ada@example.com");
        subscribe(&h, &user, "https://push.example.com/1").await;

        let result = h.dispatcher.dispatch(&general(), &[user.clone()]).await;

        for channel in Channel::ALL {
            assert_eq!(
                result.outcome(user.id, channel),
                Some(&DeliveryOutcome::Delivered)
            );
        }
        assert_eq!(h.push.sent_count(), 1);
        assert_eq!(h.email.sent_count(), 1);
        assert_eq!(h.inbox.len(), 1);
        assert_eq!(h.preferences.row_count(), 1);
    }

    #[tokio::test]
    async fn test_push_skipped_without_subscription() {
        let h = harness();
        let user = test_user("bob@example.com");

        let result = h.dispatcher.dispatch(&general(), &[user.clone()]).await;

        assert_eq!(
            result.outcome(user.id, Channel::Push),
            Some(&DeliveryOutcome::SkippedNoEndpoint)
        );
        assert_eq!(
            result.outcome(user.id, Channel::Email),
            Some(&DeliveryOutcome::Delivered)
        );
    }

    #[tokio::test]
    async fn test_failing_push_does_not_block_other_channels() {
        let h = harness();
        let user = test_user("carol@example.com");
        subscribe(&h, &user, "https://push.example.com/stale").await;
        h.push.fail_all(true);

        let result = h.dispatcher.dispatch(&general(), &[user.clone()]).await;

        assert!(result.outcome(user.id, Channel::Push).unwrap().is_failed());
        assert_eq!(
            result.outcome(user.id, Channel::Email),
            Some(&DeliveryOutcome::Delivered)
        );
        assert_eq!(
            result.outcome(user.id, Channel::Database),
            Some(&DeliveryOutcome::Delivered)
        );
        // Stale subscriptions are not pruned on failure
        assert_eq!(h.subscriptions.len(), 1);
    }

    #[tokio::test]
    async fn test_one_failing_recipient_does_not_block_the_batch() {
        let h = harness();
        let failing = test_user("bounce@example.com");
        let healthy = test_user("dave@example.com");
        h.email.fail_for("bounce@example.com");

        let result = h
            .dispatcher
            .dispatch(&general(), &[failing.clone(), healthy.clone()])
            .await;

        assert!(result.outcome(failing.id, Channel::Email).unwrap().is_failed());
        assert_eq!(
            result.outcome(healthy.id, Channel::Email),
            Some(&DeliveryOutcome::Delivered)
        );
        assert_eq!(result.failed_count(), 1);
    }

    #[tokio::test]
    async fn test_push_delivered_when_any_endpoint_accepts() {
        let h = harness();
        let user = test_user("pat@example.com");
        subscribe(&h, &user, "https://push.example.com/laptop").await;
        subscribe(&h, &user, "https://push.example.com/phone").await;
        h.push.fail_endpoint("https://push.example.com/phone");

        let result = h.dispatcher.dispatch(&general(), &[user.clone()]).await;

        assert_eq!(
            result.outcome(user.id, Channel::Push),
            Some(&DeliveryOutcome::Delivered)
        );
        assert_eq!(h.push.sent_count(), 1);
    }

    #[tokio::test]
    async fn test_preference_failure_marks_recipient_failed() {
        let h = harness();
        let user = test_user("quinn@example.com");
        h.preferences.set_unavailable(true);

        let result = h.dispatcher.dispatch(&general(), &[user.clone()]).await;

        for channel in Channel::ALL {
            assert!(result.outcome(user.id, channel).unwrap().is_failed());
        }
        assert_eq!(h.inbox.len(), 0);
    }

    #[tokio::test]
    async fn test_toggle_off_skips_channel() {
        let h = harness();
        let user = test_user("erin@example.com");
        h.preferences
            .update(
                user.id,
                NotificationCategory::General,
                ChannelToggles {
                    push: true,
                    email: false,
                    database: true,
                },
            )
            .await
            .unwrap();

        let result = h.dispatcher.dispatch(&general(), &[user.clone()]).await;

        assert_eq!(
            result.outcome(user.id, Channel::Email),
            Some(&DeliveryOutcome::SkippedByPreference)
        );
        assert_eq!(h.email.sent_count(), 0);
    }

    #[tokio::test]
    async fn test_system_info_alert_is_not_emailed() {
        let h = harness();
        let user = test_user("frank@example.com");
        h.preferences
            .update(user.id, NotificationCategory::System, ChannelToggles::default())
            .await
            .unwrap();

        let info = kinds::system_alert(&links(), "Heads up", "Maintenance tonight", Severity::Info, None);
        let result = h.dispatcher.dispatch(&info, &[user.clone()]).await;
        let report = result.report(user.id).unwrap();
        assert!(!report.attempted_channels().contains(&Channel::Email));

        let error = kinds::system_alert(&links(), "Outage", "Database unreachable", Severity::Error, None);
        let result = h.dispatcher.dispatch(&error, &[user.clone()]).await;
        let report = result.report(user.id).unwrap();
        assert!(report.attempted_channels().contains(&Channel::Email));
    }

    #[tokio::test]
    async fn test_predicate_never_widens_disabled_toggle() {
        let h = harness();
        let user = test_user("grace@example.com");
        h.preferences
            .update(
                user.id,
                NotificationCategory::System,
                ChannelToggles {
                    push: true,
                    email: false,
                    database: true,
                },
            )
            .await
            .unwrap();

        let error = kinds::system_alert(&links(), "Outage", "Database unreachable", Severity::Error, None);
        let result = h.dispatcher.dispatch(&error, &[user.clone()]).await;

        assert_eq!(
            result.outcome(user.id, Channel::Email),
            Some(&DeliveryOutcome::SkippedByPreference)
        );
        assert_eq!(h.email.sent_count(), 0);
    }

    #[tokio::test]
    async fn test_duplicate_recipients_are_notified_once() {
        let h = harness();
        let user = test_user("heidi@example.com");

        let result = h
            .dispatcher
            .dispatch(&general(), &[user.clone(), user.clone()])
            .await;

        assert_eq!(result.recipients.len(), 1);
        assert_eq!(h.inbox.len(), 1);
    }

    #[tokio::test]
    async fn test_missing_sender_is_reported_as_no_endpoint() {
        let preferences = Arc::new(MemoryPreferenceStore::new());
        let inbox = Arc::new(MemoryInbox::new());
        let dispatcher = Dispatcher::new(
            preferences,
            vec![Box::new(DatabaseChannel::new(inbox.clone()))],
        );
        let user = test_user("ivan@example.com");

        let result = dispatcher.dispatch(&general(), &[user.clone()]).await;

        assert_eq!(
            result.outcome(user.id, Channel::Email),
            Some(&DeliveryOutcome::SkippedNoEndpoint)
        );
        assert_eq!(
            result.outcome(user.id, Channel::Database),
            Some(&DeliveryOutcome::Delivered)
        );
    }
}
