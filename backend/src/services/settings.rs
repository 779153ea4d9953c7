//! Persisted application settings (key/value)

use sqlx::PgPool;

use crate::error::AppResult;

/// Store used for stock and slot reports, overrides configuration
pub const STORE_ID_KEY: &str = "moysklad_store_id";

#[derive(Clone)]
pub struct SettingsService {
    db: PgPool,
}

impl SettingsService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    pub async fn get(&self, key: &str) -> AppResult<Option<String>> {
        let value = sqlx::query_scalar::<_, String>("SELECT value FROM app_settings WHERE key = $1")
            .bind(key)
            .fetch_optional(&self.db)
            .await?;

        Ok(value.filter(|v| !v.trim().is_empty()))
    }

    pub async fn set(&self, key: &str, value: &str) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO app_settings (key, value, updated_at)
            VALUES ($1, $2, NOW())
            ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value, updated_at = NOW()
            "#,
        )
        .bind(key)
        .bind(value.trim())
        .execute(&self.db)
        .await?;

        Ok(())
    }

    pub async fn remove(&self, key: &str) -> AppResult<()> {
        sqlx::query("DELETE FROM app_settings WHERE key = $1")
            .bind(key)
            .execute(&self.db)
            .await?;
        Ok(())
    }
}
