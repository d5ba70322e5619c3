//! Database operations for `sync_checkpoints` and `sync_processed_keys`.

use chrono::{DateTime, Utc};
use covasync_core::SyncCheckpoint;
use sqlx::PgPool;

use crate::DbError;

/// Loads the checkpoint for `job`. A job that has never saved one gets the
/// default (no last sync, offset zero).
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn load_checkpoint(pool: &PgPool, job: &str) -> Result<SyncCheckpoint, DbError> {
    let row = sqlx::query_as::<_, (Option<DateTime<Utc>>, i64)>(
        "SELECT last_sync_at, batch_offset FROM sync_checkpoints WHERE job_name = $1",
    )
    .bind(job)
    .fetch_optional(pool)
    .await?;

    Ok(row
        .map(|(last_sync_at, batch_offset)| SyncCheckpoint {
            last_sync_at,
            batch_offset,
        })
        .unwrap_or_default())
}

/// Writes the checkpoint for `job`, replacing any previous value.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the upsert fails.
pub async fn save_checkpoint(
    pool: &PgPool,
    job: &str,
    checkpoint: &SyncCheckpoint,
) -> Result<(), DbError> {
    sqlx::query(
        "INSERT INTO sync_checkpoints (job_name, last_sync_at, batch_offset) \
         VALUES ($1, $2, $3) \
         ON CONFLICT (job_name) DO UPDATE SET \
             last_sync_at = EXCLUDED.last_sync_at, \
             batch_offset = EXCLUDED.batch_offset, \
             updated_at   = NOW()",
    )
    .bind(job)
    .bind(checkpoint.last_sync_at)
    .bind(checkpoint.batch_offset)
    .execute(pool)
    .await?;

    Ok(())
}

/// Clears the checkpoint and every processed key for `job` atomically.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if either delete fails; neither is applied.
pub async fn reset_checkpoint(pool: &PgPool, job: &str) -> Result<(), DbError> {
    let mut tx = pool.begin().await?;

    sqlx::query("DELETE FROM sync_checkpoints WHERE job_name = $1")
        .bind(job)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM sync_processed_keys WHERE job_name = $1")
        .bind(job)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(())
}

/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn is_key_processed(pool: &PgPool, job: &str, key: &str) -> Result<bool, DbError> {
    let exists = sqlx::query_scalar::<_, bool>(
        "SELECT EXISTS (SELECT 1 FROM sync_processed_keys WHERE job_name = $1 AND item_key = $2)",
    )
    .bind(job)
    .bind(key)
    .fetch_one(pool)
    .await?;
    Ok(exists)
}

/// Records `key` as processed for `job`. Marking an already-processed key
/// is a no-op.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails.
pub async fn mark_key_processed(pool: &PgPool, job: &str, key: &str) -> Result<(), DbError> {
    sqlx::query(
        "INSERT INTO sync_processed_keys (job_name, item_key) VALUES ($1, $2) \
         ON CONFLICT (job_name, item_key) DO NOTHING",
    )
    .bind(job)
    .bind(key)
    .execute(pool)
    .await?;
    Ok(())
}

/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn count_processed_keys(pool: &PgPool, job: &str) -> Result<i64, DbError> {
    let count = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM sync_processed_keys WHERE job_name = $1",
    )
    .bind(job)
    .fetch_one(pool)
    .await?;
    Ok(count)
}
