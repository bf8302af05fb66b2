//! Push subscription storage.
//!
//! One live row per endpoint: subscribing an endpoint that already exists
//! (same browser, possibly another user) replaces the old row.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

use keeper_common::error::AppError;
use keeper_common::types::PushSubscription;

/// Browser-supplied subscription parameters.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct NewPushSubscription {
    pub endpoint: String,
    /// `keys.p256dh`
    pub public_key: String,
    /// `keys.auth`
    pub auth_token: String,
}

impl NewPushSubscription {
    pub fn validate(&self) -> Result<(), AppError> {
        if !(self.endpoint.starts_with("https://") || self.endpoint.starts_with("http://")) {
            return Err(AppError::Validation(
                "endpoint must be a valid URL".to_string(),
            ));
        }
        if self.public_key.trim().is_empty() || self.auth_token.trim().is_empty() {
            return Err(AppError::Validation(
                "keys.p256dh and keys.auth are required".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    /// Store a subscription for `user_id`, replacing any row with the same endpoint.
    async fn subscribe(
        &self,
        user_id: Uuid,
        params: &NewPushSubscription,
    ) -> Result<PushSubscription, AppError>;

    /// Remove the user's subscription for `endpoint`. Returns true if one was removed.
    async fn unsubscribe(&self, user_id: Uuid, endpoint: &str) -> Result<bool, AppError>;

    async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<PushSubscription>, AppError>;

    async fn count_for_user(&self, user_id: Uuid) -> Result<i64, AppError>;

    /// Users holding at least one subscription.
    async fn subscribed_user_ids(&self) -> Result<Vec<Uuid>, AppError>;

    /// Delete subscriptions not refreshed since `cutoff`. Returns the number removed.
    async fn prune_idle(&self, cutoff: DateTime<Utc>) -> Result<u64, AppError>;
}

/// Aggregate subscription numbers for the admin dashboard.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubscriptionStats {
    pub total_users: i64,
    pub subscribed_users: i64,
    /// Percentage of users with at least one subscription, two decimals
    pub subscription_rate: f64,
    pub total_subscriptions: i64,
}

impl SubscriptionStats {
    pub fn compute(total_users: i64, subscribed_users: i64, total_subscriptions: i64) -> Self {
        let subscription_rate = if total_users > 0 {
            let rate = subscribed_users as f64 / total_users as f64 * 100.0;
            (rate * 100.0).round() / 100.0
        } else {
            0.0
        };

        Self {
            total_users,
            subscribed_users,
            subscription_rate,
            total_subscriptions,
        }
    }
}

/// PostgreSQL-backed subscription store.
pub struct PgSubscriptionStore {
    pool: PgPool,
}

impl PgSubscriptionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn stats(&self) -> Result<SubscriptionStats, AppError> {
        let (total_users,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await?;
        let (subscribed_users, total_subscriptions): (i64, i64) = sqlx::query_as(
            "SELECT COUNT(DISTINCT user_id), COUNT(*) FROM push_subscriptions",
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(SubscriptionStats::compute(
            total_users,
            subscribed_users,
            total_subscriptions,
        ))
    }
}

#[async_trait]
impl SubscriptionStore for PgSubscriptionStore {
    async fn subscribe(
        &self,
        user_id: Uuid,
        params: &NewPushSubscription,
    ) -> Result<PushSubscription, AppError> {
        params.validate()?;

        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM push_subscriptions WHERE endpoint = $1")
            .bind(&params.endpoint)
            .execute(&mut *tx)
            .await?;

        let sub: PushSubscription = sqlx::query_as(
            r#"
            INSERT INTO push_subscriptions (id, user_id, endpoint, auth_token, public_key)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(&params.endpoint)
        .bind(&params.auth_token)
        .bind(&params.public_key)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(
            subscription_id = %sub.id,
            user_id = %user_id,
            "Push subscription stored"
        );

        Ok(sub)
    }

    async fn unsubscribe(&self, user_id: Uuid, endpoint: &str) -> Result<bool, AppError> {
        let result =
            sqlx::query("DELETE FROM push_subscriptions WHERE user_id = $1 AND endpoint = $2")
                .bind(user_id)
                .bind(endpoint)
                .execute(&self.pool)
                .await?;

        let removed = result.rows_affected() > 0;
        if removed {
            tracing::info!(user_id = %user_id, "Push subscription removed");
        }
        Ok(removed)
    }

    async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<PushSubscription>, AppError> {
        let subs: Vec<PushSubscription> = sqlx::query_as(
            "SELECT * FROM push_subscriptions WHERE user_id = $1 ORDER BY created_at",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(subs)
    }

    async fn count_for_user(&self, user_id: Uuid) -> Result<i64, AppError> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM push_subscriptions WHERE user_id = $1")
                .bind(user_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }

    async fn subscribed_user_ids(&self) -> Result<Vec<Uuid>, AppError> {
        let rows: Vec<(Uuid,)> =
            sqlx::query_as("SELECT DISTINCT user_id FROM push_subscriptions ORDER BY user_id")
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    async fn prune_idle(&self, cutoff: DateTime<Utc>) -> Result<u64, AppError> {
        let result = sqlx::query("DELETE FROM push_subscriptions WHERE updated_at < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;

        let removed = result.rows_affected();
        tracing::info!(removed, cutoff = %cutoff, "Pruned idle push subscriptions");
        Ok(removed)
    }
}
