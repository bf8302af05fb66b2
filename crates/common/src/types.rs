use std::str::FromStr;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use uuid::Uuid;

/// Lifecycle state of a backup job.
///
/// Transitions only move forward: `pending → running → {completed, failed}`,
/// plus `pending → failed` when the queue gives up before a handler ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum BackupStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl BackupStatus {
    /// Whether moving from `self` to `next` respects the forward-only lifecycle.
    pub fn can_transition_to(self, next: BackupStatus) -> bool {
        matches!(
            (self, next),
            (BackupStatus::Pending, BackupStatus::Running)
                | (BackupStatus::Pending, BackupStatus::Failed)
                | (BackupStatus::Running, BackupStatus::Completed)
                | (BackupStatus::Running, BackupStatus::Failed)
        )
    }
}

/// What triggered a backup job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum BackupType {
    Manual,
    Scheduled,
}

/// A part of the application a backup can include.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackupComponent {
    Database,
    Files,
}

/// Notification classification used for preference lookup and channel overrides.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, sqlx::Type,
)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum NotificationCategory {
    General,
    Welcome,
    Mentions,
    System,
    Messages,
    Updates,
}

impl NotificationCategory {
    pub const ALL: [NotificationCategory; 6] = [
        NotificationCategory::General,
        NotificationCategory::Welcome,
        NotificationCategory::Mentions,
        NotificationCategory::System,
        NotificationCategory::Messages,
        NotificationCategory::Updates,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            NotificationCategory::General => "general",
            NotificationCategory::Welcome => "welcome",
            NotificationCategory::Mentions => "mentions",
            NotificationCategory::System => "system",
            NotificationCategory::Messages => "messages",
            NotificationCategory::Updates => "updates",
        }
    }
}

impl FromStr for NotificationCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NotificationCategory::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| {
                format!(
                    "Invalid category '{}'. Valid categories: {}",
                    s,
                    NotificationCategory::ALL.map(|c| c.as_str()).join(", ")
                )
            })
    }
}

/// Severity tag of a notification (the "type" of an alert).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Success,
    Warning,
    Error,
}

impl Severity {
    /// Warnings and errors are the only severities escalated to email.
    pub fn escalates_to_email(self) -> bool {
        matches!(self, Severity::Warning | Severity::Error)
    }
}

/// Notification delivery channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Push,
    Email,
    Database,
}

impl Channel {
    pub const ALL: [Channel; 3] = [Channel::Push, Channel::Email, Channel::Database];
}

/// Per-channel toggles for one (user, category) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelToggles {
    pub push: bool,
    pub email: bool,
    pub database: bool,
}

impl ChannelToggles {
    pub fn allows(&self, channel: Channel) -> bool {
        match channel {
            Channel::Push => self.push,
            Channel::Email => self.email,
            Channel::Database => self.database,
        }
    }
}

impl Default for ChannelToggles {
    fn default() -> Self {
        Self {
            push: true,
            email: true,
            database: true,
        }
    }
}

/// A user of the admin application.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
}

/// A single backup execution and its recorded outcome.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct BackupJob {
    pub id: Uuid,
    pub name: Option<String>,
    pub disk: Option<String>,
    pub path: Option<String>,
    pub backup_type: BackupType,
    pub status: BackupStatus,
    pub file_size: Option<i64>,
    pub includes: Json<Vec<BackupComponent>>,
    pub error_message: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl BackupJob {
    /// Archive name, or a placeholder built from the id while none is recorded.
    pub fn display_name(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| format!("Backup #{}", self.id))
    }

    pub fn formatted_file_size(&self) -> String {
        match self.file_size {
            Some(size) if size > 0 => format_bytes(size as u64),
            _ => "Unknown".to_string(),
        }
    }

    /// Wall-clock time between start and completion, when both are known.
    pub fn duration(&self) -> Option<chrono::Duration> {
        Some(self.completed_at? - self.started_at?)
    }

    /// Disk and path of the artifact, if a verified one was recorded.
    pub fn artifact_location(&self) -> Option<(&str, &str)> {
        Some((self.disk.as_deref()?, self.path.as_deref()?))
    }
}

/// Stored channel preferences for one (user, category) pair.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct NotificationPreference {
    pub user_id: Uuid,
    pub category: NotificationCategory,
    pub push_enabled: bool,
    pub email_enabled: bool,
    pub database_enabled: bool,
    pub settings: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl NotificationPreference {
    pub fn toggles(&self) -> ChannelToggles {
        ChannelToggles {
            push: self.push_enabled,
            email: self.email_enabled,
            database: self.database_enabled,
        }
    }
}

/// A browser Web Push subscription.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct PushSubscription {
    pub id: Uuid,
    pub user_id: Uuid,
    pub endpoint: String,
    /// `keys.auth` from the browser subscription
    pub auth_token: String,
    /// `keys.p256dh` from the browser subscription
    pub public_key: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A notification materialized through the database channel.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct DatabaseNotification {
    pub id: Uuid,
    pub user_id: Uuid,
    pub kind: String,
    pub data: serde_json::Value,
    pub read_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl DatabaseNotification {
    pub fn is_read(&self) -> bool {
        self.read_at.is_some()
    }
}

/// An audit trail entry.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Activity {
    pub id: Uuid,
    pub log_name: String,
    pub description: String,
    pub subject_type: Option<String>,
    pub subject_id: Option<String>,
    pub causer_id: Option<Uuid>,
    pub event: Option<String>,
    pub properties: serde_json::Value,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// `now` minus `days` whole days, or `None` when that falls outside the
/// representable range.
pub fn days_before(now: DateTime<Utc>, days: i64) -> Option<DateTime<Utc>> {
    TimeDelta::try_days(days).and_then(|delta| now.checked_sub_signed(delta))
}

/// Human-readable byte count using binary multiples (`1536` → `"1.5 KB"`).
pub fn format_bytes(bytes: u64) -> String {
    if bytes == 0 {
        return "0 B".to_string();
    }

    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value > 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    let rounded = format!("{:.2}", value);
    let trimmed = rounded.trim_end_matches('0').trim_end_matches('.');
    format!("{} {}", trimmed, UNITS[unit])
}

impl std::fmt::Display for BackupStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackupStatus::Pending => write!(f, "pending"),
            BackupStatus::Running => write!(f, "running"),
            BackupStatus::Completed => write!(f, "completed"),
            BackupStatus::Failed => write!(f, "failed"),
        }
    }
}

impl std::fmt::Display for BackupType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackupType::Manual => write!(f, "manual"),
            BackupType::Scheduled => write!(f, "scheduled"),
        }
    }
}

impl std::fmt::Display for BackupComponent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackupComponent::Database => write!(f, "database"),
            BackupComponent::Files => write!(f, "files"),
        }
    }
}

impl std::fmt::Display for NotificationCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Info => write!(f, "info"),
            Severity::Success => write!(f, "success"),
            Severity::Warning => write!(f, "warning"),
            Severity::Error => write!(f, "error"),
        }
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Channel::Push => write!(f, "push"),
            Channel::Email => write!(f, "email"),
            Channel::Database => write!(f, "database"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_days_before_rejects_out_of_range() {
        let now = Utc::now();
        assert_eq!(days_before(now, 2), Some(now - TimeDelta::days(2)));
        assert_eq!(days_before(now, i64::MAX), None);
        assert_eq!(days_before(now, 1_000_000_000), None);
    }

    #[test]
    fn test_status_transitions_are_forward_only() {
        use BackupStatus::*;
        assert!(Pending.can_transition_to(Running));
        assert!(Pending.can_transition_to(Failed));
        assert!(Running.can_transition_to(Completed));
        assert!(Running.can_transition_to(Failed));

        for terminal in [Completed, Failed] {
            for next in [Pending, Running, Completed, Failed] {
                assert!(!terminal.can_transition_to(next));
            }
        }
        assert!(!Running.can_transition_to(Pending));
        assert!(!Pending.can_transition_to(Completed));
    }

    #[test]
    fn test_category_from_str() {
        assert_eq!(
            "system".parse::<NotificationCategory>().unwrap(),
            NotificationCategory::System
        );
        let err = "backup".parse::<NotificationCategory>().unwrap_err();
        assert!(err.contains("general, welcome, mentions, system, messages, updates"));
    }

    #[test]
    fn test_severity_email_escalation() {
        assert!(!Severity::Info.escalates_to_email());
        assert!(!Severity::Success.escalates_to_email());
        assert!(Severity::Warning.escalates_to_email());
        assert!(Severity::Error.escalates_to_email());
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(0), "0 B");
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(1536), "1.5 KB");
        assert_eq!(format_bytes(5 * 1024 * 1024 + 300 * 1024), "5.29 MB");
        assert_eq!(format_bytes(3 * 1024 * 1024 * 1024), "3 GB");
    }

    #[test]
    fn test_backup_display_helpers() {
        let id = Uuid::new_v4();
        let now = Utc::now();
        let job = BackupJob {
            id,
            name: None,
            disk: None,
            path: None,
            backup_type: BackupType::Manual,
            status: BackupStatus::Pending,
            file_size: None,
            includes: Json(vec![BackupComponent::Database]),
            error_message: None,
            started_at: Some(now),
            completed_at: None,
            created_by: None,
            created_at: now,
        };
        assert_eq!(job.display_name(), format!("Backup #{}", id));
        assert_eq!(job.formatted_file_size(), "Unknown");
        assert!(job.duration().is_none());
        assert!(job.artifact_location().is_none());
    }
}
