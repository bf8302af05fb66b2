//! HTTP API: notification preferences, push subscriptions, the in-app
//! inbox, backup management and settings.

pub mod middleware;
pub mod routes;
pub mod state;
