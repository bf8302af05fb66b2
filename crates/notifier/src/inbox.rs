//! In-app notification inbox (the database channel's backing store).

use async_trait::async_trait;
use serde::Deserialize;
use sqlx::PgPool;
use uuid::Uuid;

use keeper_common::error::AppError;
use keeper_common::types::DatabaseNotification;

/// Default page size for inbox listings.
pub const PER_PAGE: i64 = 10;

/// Read-state filter for inbox listings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InboxFilter {
    #[default]
    All,
    Unread,
    Read,
}

/// Row offset of a 1-based page; pages below 1 read as the first page.
pub fn page_offset(page: i64) -> i64 {
    page.max(1).saturating_sub(1).saturating_mul(PER_PAGE)
}

impl InboxFilter {
    pub fn matches(self, notification: &DatabaseNotification) -> bool {
        match self {
            InboxFilter::All => true,
            InboxFilter::Unread => !notification.is_read(),
            InboxFilter::Read => notification.is_read(),
        }
    }
}

#[async_trait]
pub trait Inbox: Send + Sync {
    /// Append an unread record for `user_id`.
    async fn record(
        &self,
        user_id: Uuid,
        kind: &str,
        data: serde_json::Value,
    ) -> Result<DatabaseNotification, AppError>;

    /// Newest first; `page` is 1-based.
    async fn list(
        &self,
        user_id: Uuid,
        filter: InboxFilter,
        page: i64,
    ) -> Result<Vec<DatabaseNotification>, AppError>;

    async fn unread_count(&self, user_id: Uuid) -> Result<i64, AppError>;

    /// Returns false when the notification does not exist or belongs to someone else.
    async fn mark_read(&self, user_id: Uuid, id: Uuid) -> Result<bool, AppError>;

    async fn mark_all_read(&self, user_id: Uuid) -> Result<u64, AppError>;

    async fn delete(&self, user_id: Uuid, id: Uuid) -> Result<bool, AppError>;

    async fn delete_all(&self, user_id: Uuid) -> Result<u64, AppError>;
}

/// PostgreSQL-backed inbox.
pub struct PgInbox {
    pool: PgPool,
}

impl PgInbox {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Inbox for PgInbox {
    async fn record(
        &self,
        user_id: Uuid,
        kind: &str,
        data: serde_json::Value,
    ) -> Result<DatabaseNotification, AppError> {
        let notification: DatabaseNotification = sqlx::query_as(
            r#"
            INSERT INTO database_notifications (id, user_id, kind, data)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(kind)
        .bind(&data)
        .fetch_one(&self.pool)
        .await?;

        Ok(notification)
    }

    async fn list(
        &self,
        user_id: Uuid,
        filter: InboxFilter,
        page: i64,
    ) -> Result<Vec<DatabaseNotification>, AppError> {
        let read_clause = match filter {
            InboxFilter::All => "",
            InboxFilter::Unread => "AND read_at IS NULL",
            InboxFilter::Read => "AND read_at IS NOT NULL",
        };
        let offset = page_offset(page);

        let rows: Vec<DatabaseNotification> = sqlx::query_as(&format!(
            r#"
            SELECT * FROM database_notifications
            WHERE user_id = $1 {read_clause}
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3
            "#
        ))
        .bind(user_id)
        .bind(PER_PAGE)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    async fn unread_count(&self, user_id: Uuid) -> Result<i64, AppError> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM database_notifications WHERE user_id = $1 AND read_at IS NULL",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    async fn mark_read(&self, user_id: Uuid, id: Uuid) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE database_notifications SET read_at = COALESCE(read_at, NOW())
            WHERE id = $1 AND user_id = $2
            "#,
        )
        .bind(id)
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn mark_all_read(&self, user_id: Uuid) -> Result<u64, AppError> {
        let result = sqlx::query(
            "UPDATE database_notifications SET read_at = NOW() WHERE user_id = $1 AND read_at IS NULL",
        )
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn delete(&self, user_id: Uuid, id: Uuid) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM database_notifications WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_all(&self, user_id: Uuid) -> Result<u64, AppError> {
        let result = sqlx::query("DELETE FROM database_notifications WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryInbox;
    use serde_json::json;

    #[test]
    fn test_page_offset_saturates() {
        assert_eq!(page_offset(-4), 0);
        assert_eq!(page_offset(1), 0);
        assert_eq!(page_offset(3), 20);
        assert_eq!(page_offset(i64::MAX), i64::MAX);
    }

    #[tokio::test]
    async fn test_page_far_past_the_end_is_empty() {
        let inbox = MemoryInbox::new();
        let user_id = Uuid::new_v4();
        inbox.record(user_id, "test", json!({})).await.unwrap();

        let page = inbox.list(user_id, InboxFilter::All, i64::MAX).await.unwrap();

        assert!(page.is_empty());
    }

    #[tokio::test]
    async fn test_mark_read_and_counts() {
        let inbox = MemoryInbox::new();
        let user_id = Uuid::new_v4();
        let first = inbox.record(user_id, "test", json!({"n": 1})).await.unwrap();
        inbox.record(user_id, "test", json!({"n": 2})).await.unwrap();
        inbox
            .record(Uuid::new_v4(), "test", json!({"n": 3}))
            .await
            .unwrap();

        assert_eq!(inbox.unread_count(user_id).await.unwrap(), 2);
        assert!(inbox.mark_read(user_id, first.id).await.unwrap());
        assert_eq!(inbox.unread_count(user_id).await.unwrap(), 1);

        let read = inbox.list(user_id, InboxFilter::Read, 1).await.unwrap();
        assert_eq!(read.len(), 1);
        assert_eq!(read[0].id, first.id);

        assert_eq!(inbox.mark_all_read(user_id).await.unwrap(), 1);
        assert_eq!(inbox.unread_count(user_id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_cannot_touch_other_users_notifications() {
        let inbox = MemoryInbox::new();
        let owner = Uuid::new_v4();
        let record = inbox.record(owner, "test", json!({})).await.unwrap();

        let stranger = Uuid::new_v4();
        assert!(!inbox.mark_read(stranger, record.id).await.unwrap());
        assert!(!inbox.delete(stranger, record.id).await.unwrap());
        assert!(inbox.delete(owner, record.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_list_pages_newest_first() {
        let inbox = MemoryInbox::new();
        let user_id = Uuid::new_v4();
        for n in 0..12 {
            inbox.record(user_id, "test", json!({ "n": n })).await.unwrap();
        }

        let first_page = inbox.list(user_id, InboxFilter::All, 1).await.unwrap();
        assert_eq!(first_page.len(), 10);
        assert_eq!(first_page[0].data["n"], 11);

        let second_page = inbox.list(user_id, InboxFilter::All, 2).await.unwrap();
        assert_eq!(second_page.len(), 2);

        assert_eq!(inbox.delete_all(user_id).await.unwrap(), 12);
    }
}
