//! Web Push subscription routes.

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;

use keeper_audit::recorder::log_names;
use keeper_audit::store::{NewActivity, Subject};
use keeper_common::error::AppError;
use keeper_notifier::push::PushStatus;
use keeper_notifier::subscriptions::{NewPushSubscription, SubscriptionStats};

use crate::middleware::auth::AuthUser;
use crate::routes::record;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/push/subscribe", post(subscribe))
        .route("/api/push/unsubscribe", post(unsubscribe))
        .route("/api/push/status", get(status))
        .route("/api/push/stats", get(stats))
        .route("/api/push/vapid-public-key", get(vapid_public_key))
}

/// Subscription keys as sent by the browser's `PushSubscription.toJSON()`.
#[derive(Debug, Deserialize)]
pub struct SubscriptionKeys {
    pub p256dh: String,
    pub auth: String,
}

#[derive(Debug, Deserialize)]
pub struct SubscribeRequest {
    pub endpoint: String,
    pub keys: SubscriptionKeys,
}

#[derive(Debug, Deserialize)]
pub struct UnsubscribeRequest {
    pub endpoint: String,
}

/// POST /api/push/subscribe: Store a subscription and send the welcome push.
async fn subscribe(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(req): Json<SubscribeRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    let params = NewPushSubscription {
        endpoint: req.endpoint,
        public_key: req.keys.p256dh,
        auth_token: req.keys.auth,
    };
    params.validate()?;

    let user = auth.user(&state).await?;
    let subscription = state.push.subscribe(&user, &params).await?;

    record(
        &state,
        NewActivity::new(log_names::NOTIFICATIONS, "Push notifications enabled")
            .subject(Subject::user(user.id))
            .event("push_subscribed")
            .context(auth.context()),
    )
    .await;

    Ok(Json(json!({
        "success": true,
        "message": "Successfully subscribed to push notifications",
        "subscription_id": subscription.id
    })))
}

/// POST /api/push/unsubscribe: Remove the caller's subscription for an endpoint.
async fn unsubscribe(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(req): Json<UnsubscribeRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    let user = auth.user(&state).await?;
    if !state.push.unsubscribe(&user, &req.endpoint).await? {
        return Err(AppError::NotFound("Subscription not found".to_string()));
    }

    record(
        &state,
        NewActivity::new(log_names::NOTIFICATIONS, "Push notifications disabled")
            .subject(Subject::user(user.id))
            .event("push_unsubscribed")
            .context(auth.context()),
    )
    .await;

    Ok(Json(json!({
        "success": true,
        "message": "Successfully unsubscribed from push notifications"
    })))
}

/// GET /api/push/status
async fn status(State(state): State<AppState>, auth: AuthUser) -> Result<Json<PushStatus>, AppError> {
    let user = auth.user(&state).await?;
    Ok(Json(state.push.status(&user).await?))
}

/// GET /api/push/stats: Subscription totals across all users.
async fn stats(
    State(state): State<AppState>,
    _auth: AuthUser,
) -> Result<Json<SubscriptionStats>, AppError> {
    Ok(Json(state.subscriptions.stats().await?))
}

/// GET /api/push/vapid-public-key: Public; browsers need it before they can subscribe.
async fn vapid_public_key(State(state): State<AppState>) -> Result<Json<serde_json::Value>, AppError> {
    let key = state
        .config
        .vapid_public_key
        .as_deref()
        .ok_or_else(|| AppError::NotFound("Push notifications are not configured".to_string()))?;
    Ok(Json(json!({ "public_key": key })))
}
