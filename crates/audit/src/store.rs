//! Activity persistence.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

use keeper_common::error::AppError;
use keeper_common::types::Activity;

/// The thing an activity is about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Subject {
    pub kind: &'static str,
    pub id: String,
}

impl Subject {
    pub fn user(id: Uuid) -> Self {
        Self {
            kind: "user",
            id: id.to_string(),
        }
    }

    pub fn backup(id: Uuid) -> Self {
        Self {
            kind: "backup",
            id: id.to_string(),
        }
    }
}

/// Who triggered the write and from where.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestContext {
    pub causer_id: Option<Uuid>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

impl RequestContext {
    /// Context for writes made by background processes.
    pub fn system() -> Self {
        Self::default()
    }

    pub fn for_user(user_id: Uuid) -> Self {
        Self {
            causer_id: Some(user_id),
            ..Self::default()
        }
    }
}

/// An activity about to be written.
#[derive(Debug, Clone)]
pub struct NewActivity {
    pub log_name: String,
    pub description: String,
    pub subject: Option<Subject>,
    pub event: Option<String>,
    pub properties: serde_json::Value,
    pub context: RequestContext,
}

impl NewActivity {
    pub fn new(log_name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            log_name: log_name.into(),
            description: description.into(),
            subject: None,
            event: None,
            properties: serde_json::json!({}),
            context: RequestContext::default(),
        }
    }

    pub fn subject(mut self, subject: Subject) -> Self {
        self.subject = Some(subject);
        self
    }

    pub fn event(mut self, event: impl Into<String>) -> Self {
        self.event = Some(event.into());
        self
    }

    pub fn properties(mut self, properties: serde_json::Value) -> Self {
        self.properties = properties;
        self
    }

    pub fn context(mut self, context: RequestContext) -> Self {
        self.context = context;
        self
    }
}

#[async_trait]
pub trait ActivityStore: Send + Sync {
    async fn insert(&self, activity: NewActivity) -> Result<Activity, AppError>;

    /// Newest first.
    async fn recent(&self, limit: i64) -> Result<Vec<Activity>, AppError>;

    /// Delete entries created before `cutoff`. Returns the number removed.
    async fn delete_before(&self, cutoff: DateTime<Utc>) -> Result<u64, AppError>;
}

pub struct PgActivityStore {
    pool: PgPool,
}

impl PgActivityStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ActivityStore for PgActivityStore {
    async fn insert(&self, activity: NewActivity) -> Result<Activity, AppError> {
        let (subject_type, subject_id) = match activity.subject {
            Some(subject) => (Some(subject.kind), Some(subject.id)),
            None => (None, None),
        };

        let row: Activity = sqlx::query_as(
            r#"
            INSERT INTO activities
                (id, log_name, description, subject_type, subject_id, causer_id,
                 event, properties, ip_address, user_agent)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&activity.log_name)
        .bind(&activity.description)
        .bind(subject_type)
        .bind(subject_id)
        .bind(activity.context.causer_id)
        .bind(&activity.event)
        .bind(&activity.properties)
        .bind(&activity.context.ip_address)
        .bind(&activity.context.user_agent)
        .fetch_one(&self.pool)
        .await?;

        Ok(row)
    }

    async fn recent(&self, limit: i64) -> Result<Vec<Activity>, AppError> {
        let rows: Vec<Activity> =
            sqlx::query_as("SELECT * FROM activities ORDER BY created_at DESC LIMIT $1")
                .bind(limit)
                .fetch_all(&self.pool)
                .await?;
        Ok(rows)
    }

    async fn delete_before(&self, cutoff: DateTime<Utc>) -> Result<u64, AppError> {
        let result = sqlx::query("DELETE FROM activities WHERE created_at < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
