use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use keeper_common::error::AppError;
use keeper_common::types::Activity;

use crate::store::{ActivityStore, NewActivity};

/// In-memory activity store for tests.
#[derive(Default)]
pub struct MemoryActivityStore {
    rows: Mutex<Vec<Activity>>,
}

impl MemoryActivityStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rows.lock().map(|rows| rows.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Store an entry with an explicit creation time.
    pub fn insert_at(&self, activity: NewActivity, created_at: DateTime<Utc>) -> Activity {
        let (subject_type, subject_id) = match activity.subject {
            Some(subject) => (Some(subject.kind.to_string()), Some(subject.id)),
            None => (None, None),
        };
        let row = Activity {
            id: Uuid::new_v4(),
            log_name: activity.log_name,
            description: activity.description,
            subject_type,
            subject_id,
            causer_id: activity.context.causer_id,
            event: activity.event,
            properties: activity.properties,
            ip_address: activity.context.ip_address,
            user_agent: activity.context.user_agent,
            created_at,
        };
        if let Ok(mut rows) = self.rows.lock() {
            rows.push(row.clone());
        }
        row
    }

    pub fn entries(&self) -> Vec<Activity> {
        self.rows.lock().map(|rows| rows.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl ActivityStore for MemoryActivityStore {
    async fn insert(&self, activity: NewActivity) -> Result<Activity, AppError> {
        Ok(self.insert_at(activity, Utc::now()))
    }

    async fn recent(&self, limit: i64) -> Result<Vec<Activity>, AppError> {
        let mut rows = self.entries();
        rows.reverse();
        rows.truncate(limit.max(0) as usize);
        Ok(rows)
    }

    async fn delete_before(&self, cutoff: DateTime<Utc>) -> Result<u64, AppError> {
        let mut rows = self
            .rows
            .lock()
            .map_err(|_| AppError::Internal("activity store lock poisoned".to_string()))?;
        let before = rows.len();
        rows.retain(|a| a.created_at >= cutoff);
        Ok((before - rows.len()) as u64)
    }
}
