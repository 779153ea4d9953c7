//! Business event journal

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use sqlx::{FromRow, PgPool};

use crate::error::AppResult;

#[derive(Clone)]
pub struct ActionLogService {
    db: PgPool,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct ActionLogEntry {
    pub id: i64,
    pub action: String,
    pub entity_type: Option<String>,
    pub entity_id: Option<String>,
    pub details: Option<Value>,
    pub created_at: DateTime<Utc>,
}

impl ActionLogService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Record an event. A failed write is logged and swallowed so the
    /// calling operation never fails because of the journal.
    pub async fn record(
        &self,
        action: &str,
        entity_type: Option<&str>,
        entity_id: Option<&str>,
        details: Value,
    ) {
        let result = sqlx::query(
            r#"
            INSERT INTO action_logs (action, entity_type, entity_id, details)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(action)
        .bind(entity_type)
        .bind(entity_id)
        .bind(details)
        .execute(&self.db)
        .await;

        if let Err(e) = result {
            tracing::warn!("Failed to write action log '{}': {}", action, e);
        }
    }

    pub async fn recent(&self, limit: i64) -> AppResult<Vec<ActionLogEntry>> {
        let entries = sqlx::query_as::<_, ActionLogEntry>(
            r#"
            SELECT id, action, entity_type, entity_id, details, created_at
            FROM action_logs
            ORDER BY created_at DESC, id DESC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.db)
        .await?;

        Ok(entries)
    }
}
