pub mod activities;
pub mod backups;
pub mod health;
pub mod notifications;
pub mod preferences;
pub mod push;
pub mod settings;

use axum::Router;

use keeper_audit::store::NewActivity;

use crate::state::AppState;

/// Build the complete API router with all routes.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .merge(health::router())
        .merge(preferences::router())
        .merge(push::router())
        .merge(notifications::router())
        .merge(backups::router())
        .merge(settings::router())
        .merge(activities::router())
        .with_state(state)
}

/// Record an activity for a write that already succeeded.
///
/// A failed audit write is logged and does not fail the request.
pub(crate) async fn record(state: &AppState, activity: NewActivity) {
    let description = activity.description.clone();
    if let Err(e) = state.activity.log(activity).await {
        tracing::warn!(description = %description, error = %e, "Failed to record activity");
    }
}
