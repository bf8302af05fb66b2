//! Application settings routes.

use axum::extract::{Path, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;

use keeper_audit::recorder::log_names;
use keeper_audit::store::NewActivity;
use keeper_common::error::AppError;

use crate::middleware::auth::AuthUser;
use crate::routes::record;
use crate::state::AppState;

const MAX_KEY_LEN: usize = 255;

pub fn router() -> Router<AppState> {
    Router::new().route("/api/settings/{key}", get(get_setting).put(put_setting))
}

#[derive(Debug, Deserialize)]
pub struct SettingValue {
    pub value: String,
}

fn validate_key(key: &str) -> Result<(), AppError> {
    let valid = !key.is_empty()
        && key.len() <= MAX_KEY_LEN
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'));
    if !valid {
        return Err(AppError::Validation(format!("Invalid setting key: {}", key)));
    }
    Ok(())
}

/// GET /api/settings/:key: `value` is null when unset.
async fn get_setting(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path(key): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    validate_key(&key)?;
    let value = state.settings.get(&key).await?;
    Ok(Json(json!({ "key": key, "value": value })))
}

/// PUT /api/settings/:key
async fn put_setting(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(key): Path<String>,
    Json(body): Json<SettingValue>,
) -> Result<Json<serde_json::Value>, AppError> {
    validate_key(&key)?;
    state.settings.set(&key, &body.value).await?;

    record(
        &state,
        NewActivity::new(log_names::SYSTEM, "Setting updated")
            .event("updated")
            .properties(json!({ "key": key }))
            .context(auth.context()),
    )
    .await;

    Ok(Json(json!({ "key": key, "value": body.value })))
}
