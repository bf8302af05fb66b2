//! Notification preference routes.

use axum::extract::{Path, State};
use axum::routing::{get, put};
use axum::{Json, Router};
use serde_json::json;

use keeper_audit::recorder::log_names;
use keeper_audit::store::{NewActivity, Subject};
use keeper_common::error::AppError;
use keeper_common::types::{ChannelToggles, NotificationCategory, NotificationPreference};

use crate::middleware::auth::AuthUser;
use crate::routes::record;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/notification-preferences", get(list_preferences))
        .route(
            "/api/notification-preferences/{category}",
            put(update_preference),
        )
}

/// GET /api/notification-preferences: Every category, defaults materialized.
async fn list_preferences(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<Vec<NotificationPreference>>, AppError> {
    let preferences = state.preferences.list(auth.user_id).await?;
    Ok(Json(preferences))
}

/// PUT /api/notification-preferences/:category: Replace the channel toggles.
async fn update_preference(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(category): Path<String>,
    Json(toggles): Json<ChannelToggles>,
) -> Result<Json<NotificationPreference>, AppError> {
    let category: NotificationCategory = category.parse().map_err(AppError::Validation)?;
    let preference = state
        .preferences
        .update(auth.user_id, category, toggles)
        .await?;

    record(
        &state,
        NewActivity::new(log_names::NOTIFICATIONS, "Notification preferences updated")
            .subject(Subject::user(auth.user_id))
            .event("updated")
            .properties(json!({ "category": category, "toggles": toggles }))
            .context(auth.context()),
    )
    .await;

    Ok(Json(preference))
}
