//! Preference-aware, multi-channel notification delivery.
//!
//! A `Notification` is dispatched to a set of users; each user's per-category
//! preference decides which of push, email and the in-app inbox receive it.

pub mod channels;
pub mod dispatcher;
pub mod inbox;
pub mod kinds;
#[cfg(any(test, feature = "test-util"))]
pub mod memory;
pub mod notification;
pub mod preferences;
pub mod push;
pub mod subscriptions;
pub mod transport;
pub mod users;

use std::sync::Arc;
use std::time::Duration;

use sqlx::PgPool;

use keeper_common::config::AppConfig;
use keeper_common::error::AppError;

use channels::{ChannelSender, DatabaseChannel, EmailChannel, PushChannel};
use dispatcher::Dispatcher;
use inbox::PgInbox;
use kinds::AppLinks;
use preferences::PgPreferenceStore;
use subscriptions::PgSubscriptionStore;
use transport::{RelayPushTransport, ResendEmailTransport, http_client};

/// Build a PostgreSQL-backed dispatcher from configuration.
///
/// Push is wired only when a relay URL is configured, email only when both
/// an API key and a sender address are; unwired channels are reported as
/// having no endpoint.
pub fn pg_dispatcher(pool: &PgPool, config: &AppConfig) -> Result<Dispatcher, AppError> {
    let client = http_client(Duration::from_secs(config.http_timeout_secs))?;
    let links = app_links(config);
    let mut senders: Vec<Box<dyn ChannelSender>> = Vec::new();

    match &config.push_relay_url {
        Some(relay_url) => senders.push(Box::new(PushChannel::new(
            Arc::new(PgSubscriptionStore::new(pool.clone())),
            Arc::new(RelayPushTransport::new(
                client.clone(),
                relay_url.clone(),
                config.vapid_public_key.clone(),
            )),
            links.logo(),
        ))),
        None => tracing::warn!("PUSH_RELAY_URL not set, push notifications disabled"),
    }

    match (&config.resend_api_key, &config.email_from) {
        (Some(api_key), Some(from)) => senders.push(Box::new(EmailChannel::new(Arc::new(
            ResendEmailTransport::new(client, api_key.clone(), from.clone()),
        )))),
        _ => tracing::warn!("RESEND_API_KEY or EMAIL_FROM not set, email notifications disabled"),
    }

    senders.push(Box::new(DatabaseChannel::new(Arc::new(PgInbox::new(
        pool.clone(),
    )))));

    Ok(Dispatcher::new(
        Arc::new(PgPreferenceStore::new(pool.clone())),
        senders,
    ))
}

pub fn app_links(config: &AppConfig) -> AppLinks {
    AppLinks::new(&config.app_url, &config.app_name)
}
