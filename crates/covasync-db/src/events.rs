//! Database operations for the `sync_events` log.

use std::fmt;

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::DbError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventLevel {
    Info,
    Warn,
    Error,
}

impl EventLevel {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for EventLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A row from the `sync_events` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SyncEventRow {
    pub id: i64,
    pub level: String,
    pub message: String,
    pub context: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// Appends an event and prunes the log to the newest `retention` rows.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert or prune fails.
pub async fn record_sync_event(
    pool: &PgPool,
    level: EventLevel,
    message: &str,
    context: &serde_json::Value,
    retention: i64,
) -> Result<(), DbError> {
    let mut tx = pool.begin().await?;

    sqlx::query("INSERT INTO sync_events (level, message, context) VALUES ($1, $2, $3)")
        .bind(level.as_str())
        .bind(message)
        .bind(context)
        .execute(&mut *tx)
        .await?;

    sqlx::query(
        "DELETE FROM sync_events \
         WHERE id NOT IN ( \
             SELECT id FROM sync_events ORDER BY created_at DESC, id DESC LIMIT $1 \
         )",
    )
    .bind(retention.max(1))
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(())
}

/// Returns the newest `limit` events, newest first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_sync_events(pool: &PgPool, limit: i64) -> Result<Vec<SyncEventRow>, DbError> {
    let rows = sqlx::query_as::<_, SyncEventRow>(
        "SELECT id, level, message, context, created_at \
         FROM sync_events \
         ORDER BY created_at DESC, id DESC \
         LIMIT $1",
    )
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}
