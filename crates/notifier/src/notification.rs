//! Channel-agnostic notification payload and its per-channel renderings.
//!
//! A `Notification` is built once and shaped three ways by the channel
//! senders: a Web Push message, an email, and a JSON record for the in-app
//! inbox.

use serde::{Deserialize, Serialize};
use serde_json::json;

use keeper_common::types::{Channel, NotificationCategory, Severity, User};

use crate::transport::PushMessage;

/// Predicate that can veto a channel for a notification.
///
/// It is AND-ed with the recipient's stored toggle, so it can only narrow
/// the set of channels, never widen it.
pub type ChannelPredicate = fn(Channel, &Notification) -> bool;

/// Call-to-action link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationAction {
    pub url: String,
    pub label: String,
}

/// Button shown on a push notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushAction {
    pub action: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
}

/// Push-specific rendering hints.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PushHints {
    /// Overrides the notification title on the push channel
    pub title: Option<String>,
    /// Overrides the notification body on the push channel
    pub body: Option<String>,
    pub icon: Option<String>,
    pub badge: Option<String>,
    pub tag: Option<String>,
    pub require_interaction: bool,
    pub actions: Vec<PushAction>,
}

/// Visual tone of an email.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MailLevel {
    Info,
    Success,
    Error,
}

impl From<Severity> for MailLevel {
    fn from(severity: Severity) -> Self {
        match severity {
            Severity::Success => MailLevel::Success,
            Severity::Error => MailLevel::Error,
            Severity::Info | Severity::Warning => MailLevel::Info,
        }
    }
}

/// Structured email: subject, greeting, body lines, optional call to action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MailMessage {
    pub subject: String,
    pub level: MailLevel,
    /// Defaults to "Hi {name}!" for the recipient when unset
    pub greeting: Option<String>,
    pub lines: Vec<String>,
    pub action: Option<NotificationAction>,
    pub outro: Vec<String>,
}

impl MailMessage {
    pub fn new(subject: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            level: MailLevel::Info,
            greeting: None,
            lines: Vec::new(),
            action: None,
            outro: Vec::new(),
        }
    }

    pub fn level(mut self, level: MailLevel) -> Self {
        self.level = level;
        self
    }

    pub fn greeting(mut self, greeting: impl Into<String>) -> Self {
        self.greeting = Some(greeting.into());
        self
    }

    pub fn line(mut self, line: impl Into<String>) -> Self {
        self.lines.push(line.into());
        self
    }

    pub fn action(mut self, label: impl Into<String>, url: impl Into<String>) -> Self {
        self.action = Some(NotificationAction {
            url: url.into(),
            label: label.into(),
        });
        self
    }

    pub fn outro(mut self, line: impl Into<String>) -> Self {
        self.outro.push(line.into());
        self
    }

    /// Fill in the recipient-specific greeting.
    pub fn for_recipient(mut self, user: &User) -> Self {
        if self.greeting.is_none() {
            self.greeting = Some(format!("Hi {}!", user.name));
        }
        self
    }

    pub fn render_text(&self) -> String {
        let mut out = String::new();
        if let Some(greeting) = &self.greeting {
            out.push_str(greeting);
            out.push_str("\n\n");
        }
        for line in &self.lines {
            out.push_str(line);
            out.push('\n');
        }
        if let Some(action) = &self.action {
            out.push_str(&format!("\n{}: {}\n", action.label, action.url));
        }
        if !self.outro.is_empty() {
            out.push('\n');
            for line in &self.outro {
                out.push_str(line);
                out.push('\n');
            }
        }
        out
    }

    pub fn render_html(&self) -> String {
        let accent = match self.level {
            MailLevel::Info => "#2d3748",
            MailLevel::Success => "#48bb78",
            MailLevel::Error => "#e53e3e",
        };

        let mut out = String::from("<div style=\"font-family: sans-serif;\">");
        if let Some(greeting) = &self.greeting {
            out.push_str(&format!("<h1>{}</h1>", escape_html(greeting)));
        }
        for line in &self.lines {
            out.push_str(&format!("<p>{}</p>", escape_html(line)));
        }
        if let Some(action) = &self.action {
            out.push_str(&format!(
                "<p><a href=\"{}\" style=\"background: {}; color: #fff; padding: 8px 16px; text-decoration: none;\">{}</a></p>",
                escape_html(&action.url),
                accent,
                escape_html(&action.label)
            ));
        }
        for line in &self.outro {
            out.push_str(&format!("<p>{}</p>", escape_html(line)));
        }
        out.push_str("</div>");
        out
    }
}

/// A logical notification, fanned out to channels by the dispatcher.
#[derive(Debug, Clone)]
pub struct Notification {
    /// Stable identifier of the notification kind (e.g. "backup", "system_alert")
    pub kind: &'static str,
    pub title: String,
    pub body: String,
    pub category: NotificationCategory,
    pub severity: Severity,
    /// In-app icon name
    pub icon: String,
    pub action: Option<NotificationAction>,
    pub data: serde_json::Value,
    pub push: PushHints,
    pub mail: Option<MailMessage>,
    eligibility: Option<ChannelPredicate>,
}

impl Notification {
    pub fn new(
        kind: &'static str,
        category: NotificationCategory,
        title: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            title: title.into(),
            body: body.into(),
            category,
            severity: Severity::Info,
            icon: "o-bell".to_string(),
            action: None,
            data: json!({}),
            push: PushHints::default(),
            mail: None,
            eligibility: None,
        }
    }

    pub fn severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    pub fn icon(mut self, icon: impl Into<String>) -> Self {
        self.icon = icon.into();
        self
    }

    pub fn action(mut self, url: impl Into<String>, label: impl Into<String>) -> Self {
        self.action = Some(NotificationAction {
            url: url.into(),
            label: label.into(),
        });
        self
    }

    pub fn data(mut self, data: serde_json::Value) -> Self {
        self.data = data;
        self
    }

    pub fn push_hints(mut self, hints: PushHints) -> Self {
        self.push = hints;
        self
    }

    pub fn mail(mut self, mail: MailMessage) -> Self {
        self.mail = Some(mail);
        self
    }

    /// Restrict eligible channels beyond the recipient's stored toggles.
    pub fn only_when(mut self, predicate: ChannelPredicate) -> Self {
        self.eligibility = Some(predicate);
        self
    }

    /// Whether this notification's own rules allow `channel`.
    pub fn permits(&self, channel: Channel) -> bool {
        self.eligibility.is_none_or(|predicate| predicate(channel, self))
    }

    /// Web Push rendering. `default_icon` is used when no icon hint is set.
    pub fn to_push_message(&self, default_icon: &str) -> PushMessage {
        let mut data = match &self.data {
            serde_json::Value::Object(map) => map.clone(),
            _ => serde_json::Map::new(),
        };
        if let Some(action) = &self.action {
            data.entry("url")
                .or_insert_with(|| serde_json::Value::String(action.url.clone()));
        }
        data.entry("category")
            .or_insert_with(|| serde_json::Value::String(self.category.to_string()));

        PushMessage {
            title: self.push.title.clone().unwrap_or_else(|| self.title.clone()),
            body: self.push.body.clone().unwrap_or_else(|| self.body.clone()),
            icon: Some(
                self.push
                    .icon
                    .clone()
                    .unwrap_or_else(|| default_icon.to_string()),
            ),
            badge: self.push.badge.clone(),
            data: serde_json::Value::Object(data),
            tag: self.push.tag.clone(),
            require_interaction: self.push.require_interaction,
            actions: self.push.actions.clone(),
        }
    }

    /// Email rendering for one recipient.
    pub fn to_mail(&self, user: &User) -> MailMessage {
        let mail = match &self.mail {
            Some(mail) => mail.clone(),
            None => {
                let mut mail = MailMessage::new(&self.title)
                    .level(self.severity.into())
                    .line(&self.body);
                if let Some(action) = &self.action {
                    mail = mail.action(&action.label, &action.url);
                }
                mail
            }
        };
        mail.for_recipient(user)
    }

    /// JSON stored by the database channel.
    pub fn to_database_record(&self) -> serde_json::Value {
        json!({
            "title": self.title,
            "message": self.body,
            "action_url": self.action.as_ref().map(|a| a.url.clone()),
            "action_text": self.action.as_ref().map(|a| a.label.clone()),
            "icon": self.icon,
            "type": self.severity,
            "category": self.category,
            "data": self.data,
        })
    }
}

/// Truncate to `limit` characters, appending "..." when shortened.
pub fn truncate_chars(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text.to_string();
    }
    let cut: String = text.chars().take(limit).collect();
    format!("{}...", cut.trim_end())
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
