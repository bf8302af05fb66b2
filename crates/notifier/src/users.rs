//! Read-only lookup of notification recipients.

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use keeper_common::error::AppError;
use keeper_common::types::User;

#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn find(&self, user_id: Uuid) -> Result<Option<User>, AppError>;
}

pub struct PgUserDirectory {
    pool: PgPool,
}

impl PgUserDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserDirectory for PgUserDirectory {
    async fn find(&self, user_id: Uuid) -> Result<Option<User>, AppError> {
        let user: Option<User> =
            sqlx::query_as("SELECT id, name, email, created_at FROM users WHERE id = $1")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(user)
    }
}
