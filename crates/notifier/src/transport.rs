//! Outbound transports for the push and email channels.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;

use keeper_common::error::AppError;
use keeper_common::types::PushSubscription;

use crate::notification::{MailMessage, PushAction};

const RESEND_API_URL: &str = "https://api.resend.com/emails";

/// Payload handed to the browser's service worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushMessage {
    pub title: String,
    pub body: String,
    pub icon: Option<String>,
    pub badge: Option<String>,
    pub data: serde_json::Value,
    pub tag: Option<String>,
    pub require_interaction: bool,
    pub actions: Vec<PushAction>,
}

/// Delivers one push message to one subscription endpoint.
#[async_trait]
pub trait PushTransport: Send + Sync {
    async fn deliver(
        &self,
        subscription: &PushSubscription,
        message: &PushMessage,
    ) -> Result<(), AppError>;
}

/// Delivers one email to one address.
#[async_trait]
pub trait EmailTransport: Send + Sync {
    async fn send(&self, to: &str, message: &MailMessage) -> Result<(), AppError>;
}

/// Build the shared HTTP client with a bounded request timeout.
pub fn http_client(timeout: Duration) -> Result<reqwest::Client, AppError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| AppError::Config(format!("Failed to build HTTP client: {}", e)))
}

/// Web Push through an HTTP relay that owns VAPID signing and payload encryption.
pub struct RelayPushTransport {
    client: reqwest::Client,
    relay_url: String,
    vapid_public_key: Option<String>,
}

impl RelayPushTransport {
    pub fn new(client: reqwest::Client, relay_url: String, vapid_public_key: Option<String>) -> Self {
        Self {
            client,
            relay_url,
            vapid_public_key,
        }
    }
}

#[async_trait]
impl PushTransport for RelayPushTransport {
    async fn deliver(
        &self,
        subscription: &PushSubscription,
        message: &PushMessage,
    ) -> Result<(), AppError> {
        let body = json!({
            "subscription": {
                "endpoint": subscription.endpoint,
                "keys": {
                    "p256dh": subscription.public_key,
                    "auth": subscription.auth_token,
                },
            },
            "vapidPublicKey": self.vapid_public_key,
            "payload": message,
        });

        let response = self
            .client
            .post(&self.relay_url)
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::Transport(format!("Push relay request failed: {}", e)))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        // 404/410 from the push service means the browser dropped the subscription
        if status == reqwest::StatusCode::NOT_FOUND || status == reqwest::StatusCode::GONE {
            return Err(AppError::Transport(format!(
                "Push subscription expired or invalid ({})",
                status.as_u16()
            )));
        }

        let detail = response.text().await.unwrap_or_default();
        Err(AppError::Transport(format!(
            "Push relay returned {}: {}",
            status.as_u16(),
            detail
        )))
    }
}

/// Email through the Resend HTTP API.
pub struct ResendEmailTransport {
    client: reqwest::Client,
    api_key: String,
    from: String,
}

impl ResendEmailTransport {
    pub fn new(client: reqwest::Client, api_key: String, from: String) -> Self {
        Self {
            client,
            api_key,
            from,
        }
    }
}

#[async_trait]
impl EmailTransport for ResendEmailTransport {
    async fn send(&self, to: &str, message: &MailMessage) -> Result<(), AppError> {
        let body = json!({
            "from": self.from,
            "to": [to],
            "subject": message.subject,
            "html": message.render_html(),
            "text": message.render_text(),
        });

        let response = self
            .client
            .post(RESEND_API_URL)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::Transport(format!("Email request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(AppError::Transport(format!(
                "Email API returned {}: {}",
                status.as_u16(),
                detail
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_message_wire_format_is_camel_case() {
        let msg = PushMessage {
            title: "t".into(),
            body: "b".into(),
            icon: None,
            badge: None,
            data: json!({}),
            tag: Some("welcome".into()),
            require_interaction: true,
            actions: vec![],
        };
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["requireInteraction"], true);
        assert_eq!(value["tag"], "welcome");
    }

    #[test]
    fn test_http_client_builds() {
        assert!(http_client(Duration::from_secs(5)).is_ok());
    }
}
