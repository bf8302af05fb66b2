//! In-app notification inbox routes.

use axum::extract::{Path, Query, State};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use keeper_common::error::AppError;
use keeper_notifier::inbox::{InboxFilter, PER_PAGE};
use keeper_notifier::kinds;

use crate::middleware::auth::AuthUser;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/notifications", get(list_notifications))
        .route("/api/notifications", delete(delete_all))
        .route("/api/notifications/unread-count", get(unread_count))
        .route("/api/notifications/read-all", post(mark_all_read))
        .route("/api/notifications/mentions", post(send_mention))
        .route("/api/notifications/{id}/read", post(mark_read))
        .route("/api/notifications/{id}", delete(delete_notification))
}

#[derive(Debug, Deserialize)]
pub struct MentionRequest {
    pub user_id: Uuid,
    pub content: String,
    /// Link to the post containing the mention
    pub url: String,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub filter: InboxFilter,
    pub page: Option<i64>,
}

/// GET /api/notifications?filter=all|unread|read&page=N
async fn list_notifications(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(query): Query<ListQuery>,
) -> Result<Json<serde_json::Value>, AppError> {
    let page = query.page.unwrap_or(1).max(1);
    let notifications = state.inbox.list(auth.user_id, query.filter, page).await?;
    let unread = state.inbox.unread_count(auth.user_id).await?;

    Ok(Json(json!({
        "notifications": notifications,
        "page": page,
        "per_page": PER_PAGE,
        "unread_count": unread
    })))
}

/// GET /api/notifications/unread-count
async fn unread_count(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<serde_json::Value>, AppError> {
    let count = state.inbox.unread_count(auth.user_id).await?;
    Ok(Json(json!({ "count": count })))
}

/// POST /api/notifications/:id/read
async fn mark_read(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, AppError> {
    if !state.inbox.mark_read(auth.user_id, id).await? {
        return Err(AppError::NotFound(format!("Notification {} not found", id)));
    }
    Ok(Json(json!({ "success": true })))
}

/// POST /api/notifications/read-all
async fn mark_all_read(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<serde_json::Value>, AppError> {
    let updated = state.inbox.mark_all_read(auth.user_id).await?;
    Ok(Json(json!({ "success": true, "updated": updated })))
}

/// DELETE /api/notifications/:id
async fn delete_notification(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, AppError> {
    if !state.inbox.delete(auth.user_id, id).await? {
        return Err(AppError::NotFound(format!("Notification {} not found", id)));
    }
    Ok(Json(json!({ "deleted": true })))
}

/// DELETE /api/notifications: Clear the caller's inbox.
async fn delete_all(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<serde_json::Value>, AppError> {
    let deleted = state.inbox.delete_all(auth.user_id).await?;
    Ok(Json(json!({ "deleted": deleted })))
}

/// POST /api/notifications/mentions: Tell a user the caller mentioned them.
async fn send_mention(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(req): Json<MentionRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    if req.content.trim().is_empty() {
        return Err(AppError::Validation("content is required".to_string()));
    }
    if !(req.url.starts_with("https://") || req.url.starts_with("http://")) {
        return Err(AppError::Validation("url must be a valid URL".to_string()));
    }

    let author = auth.user(&state).await?;
    let recipient = state
        .users
        .find(req.user_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("User {} not found", req.user_id)))?;

    let notification = kinds::user_mentioned(&state.links, &author.name, &req.content, &req.url);
    let result = state
        .dispatcher
        .dispatch(&notification, std::slice::from_ref(&recipient))
        .await;

    Ok(Json(json!({
        "success": true,
        "delivered": result.delivered_count(),
        "failed": result.failed_count()
    })))
}
