//! Backup management routes.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{delete, get};
use axum::{Json, Router};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use keeper_audit::recorder::log_names;
use keeper_audit::store::{NewActivity, Subject};
use keeper_backup::repository::{BackupListing, BackupStats};
use keeper_backup::service::{DEFAULT_LIST_LIMIT, components_for};
use keeper_common::error::AppError;
use keeper_common::types::{BackupJob, BackupType};

use crate::middleware::auth::AuthUser;
use crate::routes::record;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/backups", get(list_backups).post(create_backup))
        .route("/api/backups/status", get(backup_status))
        .route("/api/backups/{id}", delete(delete_backup))
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct CreateBackupRequest {
    /// `database`, `files` or `both`
    #[serde(rename = "type", default = "default_selection")]
    pub selection: String,
}

fn default_selection() -> String {
    "both".to_string()
}

/// GET /api/backups: Latest backups with their creator.
async fn list_backups(
    State(state): State<AppState>,
    _auth: AuthUser,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<BackupListing>>, AppError> {
    let listing = state
        .backups
        .list_recent(query.limit.unwrap_or(DEFAULT_LIST_LIMIT))
        .await?;
    Ok(Json(listing))
}

/// GET /api/backups/status
async fn backup_status(
    State(state): State<AppState>,
    _auth: AuthUser,
) -> Result<Json<BackupStats>, AppError> {
    Ok(Json(state.backups.status(Utc::now()).await?))
}

/// POST /api/backups: Queue a manual backup.
async fn create_backup(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(req): Json<CreateBackupRequest>,
) -> Result<(StatusCode, Json<BackupJob>), AppError> {
    let components = components_for(&req.selection)?;
    let job = state
        .backups
        .create(BackupType::Manual, &components, Some(auth.user_id))
        .await?;

    record(
        &state,
        NewActivity::new(log_names::BACKUP, "Manual backup requested")
            .subject(Subject::backup(job.id))
            .event("created")
            .properties(json!({ "type": req.selection }))
            .context(auth.context()),
    )
    .await;

    Ok((StatusCode::CREATED, Json(job)))
}

/// DELETE /api/backups/:id: Delete a backup and its archive.
async fn delete_backup(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, AppError> {
    state.backups.delete(id).await?;

    record(
        &state,
        NewActivity::new(log_names::BACKUP, "Backup deleted")
            .subject(Subject::backup(id))
            .event("deleted")
            .context(auth.context()),
    )
    .await;

    Ok(Json(json!({ "deleted": true })))
}
