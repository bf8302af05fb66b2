//! In-memory implementations of the notifier's storage and transport traits.
//!
//! Used by unit tests across the workspace and by local runs without
//! external push/email providers.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use keeper_common::error::AppError;
use keeper_common::types::{
    ChannelToggles, DatabaseNotification, NotificationCategory, NotificationPreference,
    PushSubscription, User,
};

use crate::inbox::{Inbox, InboxFilter, PER_PAGE, page_offset};
use crate::notification::MailMessage;
use crate::preferences::PreferenceStore;
use crate::subscriptions::{NewPushSubscription, SubscriptionStore};
use crate::transport::{EmailTransport, PushMessage, PushTransport};
use crate::users::UserDirectory;

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Build a user with a random id and the local part of `email` as its name.
pub fn test_user(email: &str) -> User {
    User {
        id: Uuid::new_v4(),
        name: email.split('@').next().unwrap_or(email).to_string(),
        email: email.to_string(),
        created_at: Utc::now(),
    }
}

// ---------------------------------------------------------------------------
// Preferences
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemoryPreferenceStore {
    rows: Mutex<HashMap<(Uuid, NotificationCategory), NotificationPreference>>,
    unavailable: Mutex<bool>,
}

impl MemoryPreferenceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn row_count(&self) -> usize {
        lock(&self.rows).len()
    }

    /// Make every call fail as if the database were unreachable.
    pub fn set_unavailable(&self, unavailable: bool) {
        *lock(&self.unavailable) = unavailable;
    }

    fn check_available(&self) -> Result<(), AppError> {
        if *lock(&self.unavailable) {
            return Err(AppError::Internal("preference store unavailable".to_string()));
        }
        Ok(())
    }
}

fn default_preference(user_id: Uuid, category: NotificationCategory) -> NotificationPreference {
    let now = Utc::now();
    NotificationPreference {
        user_id,
        category,
        push_enabled: true,
        email_enabled: true,
        database_enabled: true,
        settings: serde_json::json!({}),
        created_at: now,
        updated_at: now,
    }
}

#[async_trait]
impl PreferenceStore for MemoryPreferenceStore {
    async fn resolve(
        &self,
        user_id: Uuid,
        category: NotificationCategory,
    ) -> Result<NotificationPreference, AppError> {
        self.check_available()?;
        let mut rows = lock(&self.rows);
        Ok(rows
            .entry((user_id, category))
            .or_insert_with(|| default_preference(user_id, category))
            .clone())
    }

    async fn update(
        &self,
        user_id: Uuid,
        category: NotificationCategory,
        toggles: ChannelToggles,
    ) -> Result<NotificationPreference, AppError> {
        self.check_available()?;
        let mut rows = lock(&self.rows);
        let pref = rows
            .entry((user_id, category))
            .or_insert_with(|| default_preference(user_id, category));
        pref.push_enabled = toggles.push;
        pref.email_enabled = toggles.email;
        pref.database_enabled = toggles.database;
        pref.updated_at = Utc::now();
        Ok(pref.clone())
    }
}

// ---------------------------------------------------------------------------
// Push subscriptions
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemorySubscriptionStore {
    rows: Mutex<Vec<PushSubscription>>,
}

impl MemorySubscriptionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        lock(&self.rows).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Pretend the subscription for `endpoint` was last refreshed at `at`.
    pub fn backdate(&self, endpoint: &str, at: DateTime<Utc>) {
        for sub in lock(&self.rows).iter_mut().filter(|s| s.endpoint == endpoint) {
            sub.updated_at = at;
        }
    }
}

#[async_trait]
impl SubscriptionStore for MemorySubscriptionStore {
    async fn subscribe(
        &self,
        user_id: Uuid,
        params: &NewPushSubscription,
    ) -> Result<PushSubscription, AppError> {
        params.validate()?;
        let now = Utc::now();
        let sub = PushSubscription {
            id: Uuid::new_v4(),
            user_id,
            endpoint: params.endpoint.clone(),
            auth_token: params.auth_token.clone(),
            public_key: params.public_key.clone(),
            created_at: now,
            updated_at: now,
        };

        let mut rows = lock(&self.rows);
        rows.retain(|s| s.endpoint != params.endpoint);
        rows.push(sub.clone());
        Ok(sub)
    }

    async fn unsubscribe(&self, user_id: Uuid, endpoint: &str) -> Result<bool, AppError> {
        let mut rows = lock(&self.rows);
        let before = rows.len();
        rows.retain(|s| !(s.user_id == user_id && s.endpoint == endpoint));
        Ok(rows.len() < before)
    }

    async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<PushSubscription>, AppError> {
        Ok(lock(&self.rows)
            .iter()
            .filter(|s| s.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn count_for_user(&self, user_id: Uuid) -> Result<i64, AppError> {
        Ok(lock(&self.rows).iter().filter(|s| s.user_id == user_id).count() as i64)
    }

    async fn subscribed_user_ids(&self) -> Result<Vec<Uuid>, AppError> {
        let mut ids: Vec<Uuid> = lock(&self.rows).iter().map(|s| s.user_id).collect();
        ids.sort();
        ids.dedup();
        Ok(ids)
    }

    async fn prune_idle(&self, cutoff: DateTime<Utc>) -> Result<u64, AppError> {
        let mut rows = lock(&self.rows);
        let before = rows.len();
        rows.retain(|s| s.updated_at >= cutoff);
        Ok((before - rows.len()) as u64)
    }
}

// ---------------------------------------------------------------------------
// Inbox
// ---------------------------------------------------------------------------

/// Records are kept in insertion order; listings walk it backwards.
#[derive(Default)]
pub struct MemoryInbox {
    rows: Mutex<Vec<DatabaseNotification>>,
}

impl MemoryInbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        lock(&self.rows).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every record for `user_id`, newest first.
    pub fn records_for(&self, user_id: Uuid) -> Vec<DatabaseNotification> {
        lock(&self.rows)
            .iter()
            .rev()
            .filter(|n| n.user_id == user_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl Inbox for MemoryInbox {
    async fn record(
        &self,
        user_id: Uuid,
        kind: &str,
        data: serde_json::Value,
    ) -> Result<DatabaseNotification, AppError> {
        let notification = DatabaseNotification {
            id: Uuid::new_v4(),
            user_id,
            kind: kind.to_string(),
            data,
            read_at: None,
            created_at: Utc::now(),
        };
        lock(&self.rows).push(notification.clone());
        Ok(notification)
    }

    async fn list(
        &self,
        user_id: Uuid,
        filter: InboxFilter,
        page: i64,
    ) -> Result<Vec<DatabaseNotification>, AppError> {
        let offset = usize::try_from(page_offset(page)).unwrap_or(usize::MAX);
        Ok(lock(&self.rows)
            .iter()
            .rev()
            .filter(|n| n.user_id == user_id && filter.matches(n))
            .skip(offset)
            .take(PER_PAGE as usize)
            .cloned()
            .collect())
    }

    async fn unread_count(&self, user_id: Uuid) -> Result<i64, AppError> {
        Ok(lock(&self.rows)
            .iter()
            .filter(|n| n.user_id == user_id && !n.is_read())
            .count() as i64)
    }

    async fn mark_read(&self, user_id: Uuid, id: Uuid) -> Result<bool, AppError> {
        let mut rows = lock(&self.rows);
        match rows.iter_mut().find(|n| n.id == id && n.user_id == user_id) {
            Some(n) => {
                n.read_at.get_or_insert_with(Utc::now);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn mark_all_read(&self, user_id: Uuid) -> Result<u64, AppError> {
        let now = Utc::now();
        let mut marked = 0;
        for n in lock(&self.rows)
            .iter_mut()
            .filter(|n| n.user_id == user_id && !n.is_read())
        {
            n.read_at = Some(now);
            marked += 1;
        }
        Ok(marked)
    }

    async fn delete(&self, user_id: Uuid, id: Uuid) -> Result<bool, AppError> {
        let mut rows = lock(&self.rows);
        let before = rows.len();
        rows.retain(|n| !(n.id == id && n.user_id == user_id));
        Ok(rows.len() < before)
    }

    async fn delete_all(&self, user_id: Uuid) -> Result<u64, AppError> {
        let mut rows = lock(&self.rows);
        let before = rows.len();
        rows.retain(|n| n.user_id != user_id);
        Ok((before - rows.len()) as u64)
    }
}

// ---------------------------------------------------------------------------
// Users
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemoryUserDirectory {
    users: Mutex<HashMap<Uuid, User>>,
}

impl MemoryUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, user: User) {
        lock(&self.users).insert(user.id, user);
    }
}

#[async_trait]
impl UserDirectory for MemoryUserDirectory {
    async fn find(&self, user_id: Uuid) -> Result<Option<User>, AppError> {
        Ok(lock(&self.users).get(&user_id).cloned())
    }
}

// ---------------------------------------------------------------------------
// Transports
// ---------------------------------------------------------------------------

/// Push transport that records what it was asked to deliver.
#[derive(Default)]
pub struct RecordingPushTransport {
    sent: Mutex<Vec<(String, PushMessage)>>,
    fail_all: Mutex<bool>,
    failing_endpoints: Mutex<HashSet<String>>,
}

impl RecordingPushTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_all(&self, fail: bool) {
        *lock(&self.fail_all) = fail;
    }

    pub fn fail_endpoint(&self, endpoint: &str) {
        lock(&self.failing_endpoints).insert(endpoint.to_string());
    }

    pub fn sent_count(&self) -> usize {
        lock(&self.sent).len()
    }

    /// (endpoint, message) pairs in delivery order.
    pub fn sent(&self) -> Vec<(String, PushMessage)> {
        lock(&self.sent).clone()
    }
}

#[async_trait]
impl PushTransport for RecordingPushTransport {
    async fn deliver(
        &self,
        subscription: &PushSubscription,
        message: &PushMessage,
    ) -> Result<(), AppError> {
        if *lock(&self.fail_all) || lock(&self.failing_endpoints).contains(&subscription.endpoint)
        {
            return Err(AppError::Transport(format!(
                "Push subscription expired or invalid (410): {}",
                subscription.endpoint
            )));
        }
        lock(&self.sent).push((subscription.endpoint.clone(), message.clone()));
        Ok(())
    }
}

/// Email transport that records what it was asked to send.
#[derive(Default)]
pub struct RecordingEmailTransport {
    sent: Mutex<Vec<(String, MailMessage)>>,
    failing_addresses: Mutex<HashSet<String>>,
}

impl RecordingEmailTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_for(&self, address: &str) {
        lock(&self.failing_addresses).insert(address.to_string());
    }

    pub fn sent_count(&self) -> usize {
        lock(&self.sent).len()
    }

    /// (address, message) pairs in send order.
    pub fn sent(&self) -> Vec<(String, MailMessage)> {
        lock(&self.sent).clone()
    }
}

#[async_trait]
impl EmailTransport for RecordingEmailTransport {
    async fn send(&self, to: &str, message: &MailMessage) -> Result<(), AppError> {
        if lock(&self.failing_addresses).contains(to) {
            return Err(AppError::Transport(format!("Mailbox unavailable: {}", to)));
        }
        lock(&self.sent).push((to.to_string(), message.clone()));
        Ok(())
    }
}
