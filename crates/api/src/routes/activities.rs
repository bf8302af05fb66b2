//! Activity feed and authentication event intake.
//!
//! The host application owns sign-in and account management; it reports
//! those events here with the affected user's token so they land in the
//! audit trail and reach the security alert subscriber.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;

use keeper_common::error::AppError;
use keeper_common::types::Activity;

use crate::middleware::auth::AuthUser;
use crate::state::AppState;

const DEFAULT_FEED_LIMIT: i64 = 50;
const MAX_FEED_LIMIT: i64 = 100;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/activities", get(list_activities))
        .route("/api/activities/auth-events", post(record_auth_event))
}

#[derive(Debug, Deserialize)]
pub struct FeedQuery {
    pub limit: Option<i64>,
}

/// An account event reported by the host application.
#[derive(Debug, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AuthEvent {
    Login,
    Logout,
    FailedLogin {
        email: String,
    },
    PasswordChanged,
    ProfileUpdated {
        #[serde(default)]
        changes: serde_json::Value,
    },
    EmailVerified,
}

/// GET /api/activities?limit=N: Newest entries first.
async fn list_activities(
    State(state): State<AppState>,
    _auth: AuthUser,
    Query(query): Query<FeedQuery>,
) -> Result<Json<Vec<Activity>>, AppError> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_FEED_LIMIT)
        .clamp(1, MAX_FEED_LIMIT);
    Ok(Json(state.activity.recent(limit).await?))
}

/// POST /api/activities/auth-events
async fn record_auth_event(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(event): Json<AuthEvent>,
) -> Result<(StatusCode, Json<Activity>), AppError> {
    let ctx = auth.context();
    let recorder = &state.activity;

    let activity = match event {
        AuthEvent::FailedLogin { email } => {
            let email = email.trim();
            if email.is_empty() {
                return Err(AppError::Validation("email is required".to_string()));
            }
            recorder.failed_login(ctx, email).await?
        }
        AuthEvent::Login => recorder.login(ctx, &auth.user(&state).await?).await?,
        AuthEvent::Logout => recorder.logout(ctx, &auth.user(&state).await?).await?,
        AuthEvent::PasswordChanged => {
            recorder
                .password_changed(ctx, &auth.user(&state).await?)
                .await?
        }
        AuthEvent::ProfileUpdated { changes } => {
            recorder
                .profile_updated(ctx, &auth.user(&state).await?, changes)
                .await?
        }
        AuthEvent::EmailVerified => {
            recorder
                .email_verified(ctx, &auth.user(&state).await?)
                .await?
        }
    };

    Ok((StatusCode::CREATED, Json(activity)))
}
