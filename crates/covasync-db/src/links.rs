//! Database operations for `downstream_links`.

use chrono::{DateTime, Utc};
use covasync_core::LinkedDownstreamRecord;
use sqlx::PgPool;

use crate::DbError;

/// A row from the `downstream_links` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct DownstreamLinkRow {
    pub product_id: String,
    pub downstream_id: i64,
    pub sku: Option<String>,
    pub stock_quantity: Option<i64>,
    pub in_stock: bool,
    pub published_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<DownstreamLinkRow> for LinkedDownstreamRecord {
    fn from(row: DownstreamLinkRow) -> Self {
        Self {
            product_id: row.product_id,
            downstream_id: row.downstream_id,
            sku: row.sku,
            stock_quantity: row.stock_quantity,
            in_stock: row.in_stock,
            published_at: row.published_at,
        }
    }
}

const LINK_COLUMNS: &str =
    "product_id, downstream_id, sku, stock_quantity, in_stock, published_at, updated_at";

/// Records or refreshes the link for `link.product_id`.
///
/// `published_at` keeps its first value; later calls only move `updated_at`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the upsert fails, including when
/// `downstream_id` is already linked to another product.
pub async fn upsert_downstream_link(
    pool: &PgPool,
    link: &LinkedDownstreamRecord,
) -> Result<(), DbError> {
    sqlx::query(
        "INSERT INTO downstream_links \
             (product_id, downstream_id, sku, stock_quantity, in_stock, published_at) \
         VALUES ($1, $2, $3, $4, $5, $6) \
         ON CONFLICT (product_id) DO UPDATE SET \
             downstream_id  = EXCLUDED.downstream_id, \
             sku            = EXCLUDED.sku, \
             stock_quantity = EXCLUDED.stock_quantity, \
             in_stock       = EXCLUDED.in_stock, \
             updated_at     = NOW()",
    )
    .bind(&link.product_id)
    .bind(link.downstream_id)
    .bind(&link.sku)
    .bind(link.stock_quantity)
    .bind(link.in_stock)
    .bind(link.published_at)
    .execute(pool)
    .await?;

    Ok(())
}

/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_downstream_link(
    pool: &PgPool,
    product_id: &str,
) -> Result<Option<LinkedDownstreamRecord>, DbError> {
    let row = sqlx::query_as::<_, DownstreamLinkRow>(&format!(
        "SELECT {LINK_COLUMNS} FROM downstream_links WHERE product_id = $1"
    ))
    .bind(product_id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(LinkedDownstreamRecord::from))
}

/// All links, ordered by `product_id`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_downstream_links(pool: &PgPool) -> Result<Vec<LinkedDownstreamRecord>, DbError> {
    let rows = sqlx::query_as::<_, DownstreamLinkRow>(&format!(
        "SELECT {LINK_COLUMNS} FROM downstream_links ORDER BY product_id"
    ))
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(LinkedDownstreamRecord::from).collect())
}

/// Removes the link for `product_id`. Returns whether a row existed.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the delete fails.
pub async fn delete_downstream_link(pool: &PgPool, product_id: &str) -> Result<bool, DbError> {
    let result = sqlx::query("DELETE FROM downstream_links WHERE product_id = $1")
        .bind(product_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}
