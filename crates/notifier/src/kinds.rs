//! Concrete notification kinds sent by the application.

use serde_json::json;

use keeper_common::types::{BackupJob, Channel, NotificationCategory, Severity};

use crate::notification::{MailMessage, Notification, PushAction, PushHints, truncate_chars};

const MENTION_PREVIEW_CHARS: usize = 100;
const MENTION_QUOTE_CHARS: usize = 150;

/// Email only for warnings and errors; push and database follow the toggles.
pub fn email_for_escalations_only(channel: Channel, notification: &Notification) -> bool {
    channel != Channel::Email || notification.severity.escalates_to_email()
}

/// Never email.
pub fn push_and_database_only(channel: Channel, _: &Notification) -> bool {
    channel != Channel::Email
}

/// Absolute links into the web application.
#[derive(Debug, Clone)]
pub struct AppLinks {
    app_url: String,
    app_name: String,
}

impl AppLinks {
    pub fn new(app_url: impl Into<String>, app_name: impl Into<String>) -> Self {
        Self {
            app_url: app_url.into().trim_end_matches('/').to_string(),
            app_name: app_name.into(),
        }
    }

    pub fn app_name(&self) -> &str {
        &self.app_name
    }

    pub fn dashboard(&self) -> String {
        format!("{}/app/dashboard", self.app_url)
    }

    pub fn backups(&self) -> String {
        format!("{}/app/backups", self.app_url)
    }

    pub fn logo(&self) -> String {
        format!("{}/logo.png", self.app_url)
    }
}

fn push_branding(links: &AppLinks) -> PushHints {
    PushHints {
        icon: Some(links.logo()),
        badge: Some(links.logo()),
        ..PushHints::default()
    }
}

pub fn backup_completed(links: &AppLinks, job: &BackupJob) -> Notification {
    let name = job.display_name();
    let size = job.formatted_file_size();
    let backups_url = links.backups();

    let mail = MailMessage::new("Backup Completed Successfully")
        .level(Severity::Success.into())
        .greeting("Backup Completed!")
        .line(format!("Your backup '{}' has been completed successfully.", name))
        .line(format!("Size: {}", size))
        .line(format!("Type: {}", capitalize(&job.backup_type.to_string())))
        .action("View Backups", &backups_url)
        .outro("Thank you for using our application!");

    Notification::new(
        "backup",
        NotificationCategory::System,
        "Backup Completed Successfully",
        format!("Backup '{}' completed successfully. Size: {}", name, size),
    )
    .severity(Severity::Success)
    .icon("o-check-circle")
    .action(&backups_url, "View Backups")
    .data(json!({ "backup_id": job.id, "backup_status": "success" }))
    .push_hints(PushHints {
        title: Some("Backup Completed".to_string()),
        body: Some(format!("'{}' completed successfully", name)),
        tag: Some(format!("backup-{}", job.id)),
        ..push_branding(links)
    })
    .mail(mail)
    .only_when(email_for_escalations_only)
}

pub fn backup_failed(links: &AppLinks, job: &BackupJob, error: &str) -> Notification {
    let name = job.display_name();
    let backups_url = links.backups();
    let error = if error.trim().is_empty() {
        "Unknown error"
    } else {
        error
    };

    let mail = MailMessage::new("Backup Failed")
        .level(Severity::Error.into())
        .greeting("Backup Failed!")
        .line(format!("Your backup '{}' has failed.", name))
        .line(format!("Error: {}", error))
        .action("View Backups", &backups_url)
        .outro("Thank you for using our application!");

    Notification::new(
        "backup",
        NotificationCategory::System,
        "Backup Failed",
        format!("Backup '{}' failed. Error: {}", name, error),
    )
    .severity(Severity::Error)
    .icon("o-x-circle")
    .action(&backups_url, "View Backups")
    .data(json!({ "backup_id": job.id, "backup_status": "failed" }))
    .push_hints(PushHints {
        title: Some("Backup Failed".to_string()),
        body: Some(format!("'{}' failed", name)),
        tag: Some(format!("backup-{}", job.id)),
        require_interaction: true,
        ..push_branding(links)
    })
    .mail(mail)
    .only_when(email_for_escalations_only)
}

pub fn system_alert(
    links: &AppLinks,
    title: &str,
    message: &str,
    severity: Severity,
    action_url: Option<&str>,
) -> Notification {
    let icon = match severity {
        Severity::Error => "o-exclamation-circle",
        Severity::Warning => "o-exclamation-triangle",
        Severity::Success => "o-check-circle",
        Severity::Info => "o-information-circle",
    };

    let mut mail = MailMessage::new(title)
        .level(severity.into())
        .greeting("System Alert")
        .line(message);
    if let Some(url) = action_url {
        mail = mail.action("View Details", url);
    }
    let mail = mail.outro("Thank you for your attention to this matter.");

    let url = action_url
        .map(str::to_string)
        .unwrap_or_else(|| links.dashboard());

    let mut notification =
        Notification::new("system_alert", NotificationCategory::System, title, message)
            .severity(severity)
            .icon(icon)
            .data(json!({ "url": url, "type": severity }))
            .push_hints(PushHints {
                require_interaction: severity.escalates_to_email(),
                tag: Some("system-alert".to_string()),
                ..push_branding(links)
            })
            .mail(mail)
            .only_when(email_for_escalations_only);

    if let Some(url) = action_url {
        notification = notification.action(url, "View Details");
    }
    notification
}

pub fn user_mentioned(links: &AppLinks, mentioned_by: &str, content: &str, url: &str) -> Notification {
    let title = format!("{} mentioned you", mentioned_by);

    let mail = MailMessage::new(&title)
        .line(format!("{} mentioned you in a post:", mentioned_by))
        .line(format!("\"{}\"", truncate_chars(content, MENTION_QUOTE_CHARS)))
        .action("View Post", url)
        .outro("Click the button above to view the full post.");

    Notification::new(
        "user_mentioned",
        NotificationCategory::Mentions,
        &title,
        truncate_chars(content, MENTION_PREVIEW_CHARS),
    )
    .icon("o-at-symbol")
    .action(url, "View Post")
    .data(json!({ "mentioned_by": mentioned_by, "content": content }))
    .push_hints(PushHints {
        tag: Some("mention".to_string()),
        actions: vec![
            PushAction {
                action: "view".to_string(),
                title: "View".to_string(),
                icon: Some(links.logo()),
            },
            PushAction {
                action: "dismiss".to_string(),
                title: "Dismiss".to_string(),
                icon: Some(links.logo()),
            },
        ],
        ..push_branding(links)
    })
    .mail(mail)
}

/// Push-side overrides for an ad-hoc `web_push`.
#[derive(Debug, Clone, Default)]
pub struct WebPushOptions {
    /// Opened on click; defaults to the dashboard
    pub url: Option<String>,
    pub icon: Option<String>,
    pub badge: Option<String>,
    pub tag: Option<String>,
    pub require_interaction: bool,
}

/// Plain push + in-app notification.
pub fn web_push(links: &AppLinks, title: &str, body: &str, options: WebPushOptions) -> Notification {
    let url = options.url.unwrap_or_else(|| links.dashboard());
    let branding = push_branding(links);

    Notification::new("web_push", NotificationCategory::General, title, body)
        .action(url.clone(), "View")
        .data(json!({ "url": url }))
        .push_hints(PushHints {
            icon: options.icon.or(branding.icon),
            badge: options.badge.or(branding.badge),
            tag: options.tag,
            require_interaction: options.require_interaction,
            ..PushHints::default()
        })
        .only_when(push_and_database_only)
}

/// Sent right after a browser subscribes to push.
pub fn welcome(links: &AppLinks) -> Notification {
    Notification::new(
        "welcome",
        NotificationCategory::Welcome,
        format!("Welcome to {}!", links.app_name()),
        "Thank you for subscribing to our notifications. Stay tuned for updates!",
    )
    .action(links.dashboard(), "View")
    .push_hints(PushHints {
        tag: Some("welcome".to_string()),
        ..push_branding(links)
    })
    .only_when(push_and_database_only)
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
