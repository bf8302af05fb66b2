//! Runtime key/value settings with an explicit read cache.
//!
//! Values live in the `settings` table. Reads are memoized per key until
//! `set`, `invalidate` or `clear_cache` drops them; nothing is cached
//! implicitly at process level, each `SettingsService` owns its cache.

use std::collections::HashMap;

use sqlx::PgPool;
use tokio::sync::RwLock;

use crate::error::AppError;

/// In-memory memo of setting lookups. Absent rows are cached as `None`.
#[derive(Debug, Default)]
pub struct SettingsCache {
    entries: HashMap<String, Option<String>>,
}

impl SettingsCache {
    pub fn lookup(&self, key: &str) -> Option<&Option<String>> {
        self.entries.get(key)
    }

    pub fn store(&mut self, key: &str, value: Option<String>) {
        self.entries.insert(key.to_string(), value);
    }

    pub fn forget(&mut self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Settings service backed by PostgreSQL.
pub struct SettingsService {
    pool: PgPool,
    cache: RwLock<SettingsCache>,
}

impl SettingsService {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            cache: RwLock::new(SettingsCache::default()),
        }
    }

    /// Read a setting, consulting the cache first.
    pub async fn get(&self, key: &str) -> Result<Option<String>, AppError> {
        if let Some(cached) = self.cache.read().await.lookup(key) {
            return Ok(cached.clone());
        }

        let value: Option<(Option<String>,)> =
            sqlx::query_as("SELECT value FROM settings WHERE key = $1")
                .bind(key)
                .fetch_optional(&self.pool)
                .await?;
        let value = value.and_then(|(v,)| v);

        self.cache.write().await.store(key, value.clone());
        Ok(value)
    }

    /// Read a setting, falling back to `default` when unset.
    pub async fn get_or(&self, key: &str, default: &str) -> Result<String, AppError> {
        Ok(self.get(key).await?.unwrap_or_else(|| default.to_string()))
    }

    /// Upsert a setting and drop its cached value.
    pub async fn set(&self, key: &str, value: &str) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO settings (key, value, updated_at)
            VALUES ($1, $2, NOW())
            ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value, updated_at = NOW()
            "#,
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;

        self.invalidate(key).await;
        tracing::info!(key, "Setting updated");
        Ok(())
    }

    /// Drop one cached key so the next read hits the database.
    pub async fn invalidate(&self, key: &str) {
        self.cache.write().await.forget(key);
    }

    pub async fn clear_cache(&self) {
        self.cache.write().await.clear();
    }
}
