//! Database operations for `catalog_products`, `catalog_prices`, and
//! `catalog_inventory`.
//!
//! Every upsert is keyed on the record's identity column and only touches
//! the row when a value actually differs, so replaying the same records
//! leaves the table byte-for-byte unchanged.

use chrono::{DateTime, Utc};
use covasync_core::{CatalogProduct, InventoryRecord, PriceRecord};
use rust_decimal::Decimal;
use sqlx::PgPool;

use crate::DbError;

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

/// What an upsert did to the target row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
    /// The stored row already matched.
    Unchanged,
}

impl UpsertOutcome {
    fn from_returning(inserted: Option<bool>) -> Self {
        match inserted {
            Some(true) => Self::Inserted,
            Some(false) => Self::Updated,
            None => Self::Unchanged,
        }
    }
}

/// A row from the `catalog_products` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ProductRow {
    pub product_id: String,
    pub name: String,
    pub master_product_id: Option<String>,
    pub category: Option<String>,
    pub catalog_sku: Option<String>,
    pub description: Option<String>,
    pub is_archived: bool,
    pub is_in_stock: bool,
    pub stock_quantity: i64,
    pub upstream_created_at: Option<DateTime<Utc>>,
    pub upstream_updated_at: Option<DateTime<Utc>>,
    pub raw: serde_json::Value,
    pub last_sync: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<ProductRow> for CatalogProduct {
    fn from(row: ProductRow) -> Self {
        Self {
            product_id: row.product_id,
            name: row.name,
            master_product_id: row.master_product_id,
            category: row.category,
            catalog_sku: row.catalog_sku,
            description: row.description,
            is_archived: row.is_archived,
            is_in_stock: row.is_in_stock,
            stock_quantity: row.stock_quantity,
            upstream_created_at: row.upstream_created_at,
            upstream_updated_at: row.upstream_updated_at,
            raw: row.raw,
            last_sync: row.last_sync,
        }
    }
}

/// A row from the `catalog_prices` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PriceRow {
    pub price_id: String,
    pub entity_id: Option<String>,
    pub catalog_item_id: String,
    pub regular_price: Option<Decimal>,
    pub at_tier_price: Option<Decimal>,
    pub tier_name: Option<String>,
    pub raw: serde_json::Value,
    pub last_sync: DateTime<Utc>,
}

impl From<PriceRow> for PriceRecord {
    fn from(row: PriceRow) -> Self {
        Self {
            price_id: row.price_id,
            entity_id: row.entity_id,
            catalog_item_id: row.catalog_item_id,
            regular_price: row.regular_price,
            at_tier_price: row.at_tier_price,
            tier_name: row.tier_name,
            raw: row.raw,
            last_sync: row.last_sync,
        }
    }
}

/// A row from the `catalog_inventory` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct InventoryRow {
    pub inventory_id: String,
    pub product_id: String,
    pub location_id: Option<String>,
    pub quantity: i64,
    pub available_quantity: i64,
    pub reserved_quantity: i64,
    pub raw: serde_json::Value,
    pub last_sync: DateTime<Utc>,
}

impl From<InventoryRow> for InventoryRecord {
    fn from(row: InventoryRow) -> Self {
        Self {
            inventory_id: row.inventory_id,
            product_id: row.product_id,
            location_id: row.location_id,
            quantity: row.quantity,
            available_quantity: row.available_quantity,
            reserved_quantity: row.reserved_quantity,
            raw: row.raw,
            last_sync: row.last_sync,
        }
    }
}

const PRODUCT_COLUMNS: &str = "product_id, name, master_product_id, category, catalog_sku, \
     description, is_archived, is_in_stock, stock_quantity, upstream_created_at, \
     upstream_updated_at, raw, last_sync, created_at, updated_at";

// ---------------------------------------------------------------------------
// catalog_products operations
// ---------------------------------------------------------------------------

/// Upserts a product keyed on `product_id`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the upsert fails.
pub async fn upsert_product(
    pool: &PgPool,
    product: &CatalogProduct,
) -> Result<UpsertOutcome, DbError> {
    let inserted = sqlx::query_scalar::<_, bool>(
        "INSERT INTO catalog_products \
             (product_id, name, master_product_id, category, catalog_sku, description, \
              is_archived, is_in_stock, stock_quantity, upstream_created_at, \
              upstream_updated_at, raw, last_sync) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13) \
         ON CONFLICT (product_id) DO UPDATE SET \
             name                = EXCLUDED.name, \
             master_product_id   = EXCLUDED.master_product_id, \
             category            = EXCLUDED.category, \
             catalog_sku         = EXCLUDED.catalog_sku, \
             description         = EXCLUDED.description, \
             is_archived         = EXCLUDED.is_archived, \
             is_in_stock         = EXCLUDED.is_in_stock, \
             stock_quantity      = EXCLUDED.stock_quantity, \
             upstream_created_at = EXCLUDED.upstream_created_at, \
             upstream_updated_at = EXCLUDED.upstream_updated_at, \
             raw                 = EXCLUDED.raw, \
             last_sync           = EXCLUDED.last_sync, \
             updated_at          = NOW() \
         WHERE (catalog_products.name, catalog_products.master_product_id, \
                catalog_products.category, catalog_products.catalog_sku, \
                catalog_products.description, catalog_products.is_archived, \
                catalog_products.is_in_stock, catalog_products.stock_quantity, \
                catalog_products.upstream_created_at, catalog_products.upstream_updated_at, \
                catalog_products.raw, catalog_products.last_sync) \
           IS DISTINCT FROM \
               (EXCLUDED.name, EXCLUDED.master_product_id, EXCLUDED.category, \
                EXCLUDED.catalog_sku, EXCLUDED.description, EXCLUDED.is_archived, \
                EXCLUDED.is_in_stock, EXCLUDED.stock_quantity, EXCLUDED.upstream_created_at, \
                EXCLUDED.upstream_updated_at, EXCLUDED.raw, EXCLUDED.last_sync) \
         RETURNING (xmax = 0) AS inserted",
    )
    .bind(&product.product_id)
    .bind(&product.name)
    .bind(&product.master_product_id)
    .bind(&product.category)
    .bind(&product.catalog_sku)
    .bind(&product.description)
    .bind(product.is_archived)
    .bind(product.is_in_stock)
    .bind(product.stock_quantity)
    .bind(product.upstream_created_at)
    .bind(product.upstream_updated_at)
    .bind(&product.raw)
    .bind(product.last_sync)
    .fetch_optional(pool)
    .await?;

    Ok(UpsertOutcome::from_returning(inserted))
}

/// Fetches a product by upstream ID.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_product(
    pool: &PgPool,
    product_id: &str,
) -> Result<Option<CatalogProduct>, DbError> {
    let row = sqlx::query_as::<_, ProductRow>(&format!(
        "SELECT {PRODUCT_COLUMNS} FROM catalog_products WHERE product_id = $1"
    ))
    .bind(product_id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(CatalogProduct::from))
}

/// Returns one page of products ordered by `product_id`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_products(
    pool: &PgPool,
    offset: i64,
    limit: i64,
) -> Result<Vec<CatalogProduct>, DbError> {
    let rows = sqlx::query_as::<_, ProductRow>(&format!(
        "SELECT {PRODUCT_COLUMNS} FROM catalog_products \
         ORDER BY product_id \
         OFFSET $1 LIMIT $2"
    ))
    .bind(offset)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(CatalogProduct::from).collect())
}

/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn count_products(pool: &PgPool) -> Result<i64, DbError> {
    let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM catalog_products")
        .fetch_one(pool)
        .await?;
    Ok(count)
}

// ---------------------------------------------------------------------------
// catalog_prices operations
// ---------------------------------------------------------------------------

/// Upserts a price row keyed on `price_id`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the upsert fails.
pub async fn upsert_price(pool: &PgPool, price: &PriceRecord) -> Result<UpsertOutcome, DbError> {
    let inserted = sqlx::query_scalar::<_, bool>(
        "INSERT INTO catalog_prices \
             (price_id, entity_id, catalog_item_id, regular_price, at_tier_price, \
              tier_name, raw, last_sync) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
         ON CONFLICT (price_id) DO UPDATE SET \
             entity_id       = EXCLUDED.entity_id, \
             catalog_item_id = EXCLUDED.catalog_item_id, \
             regular_price   = EXCLUDED.regular_price, \
             at_tier_price   = EXCLUDED.at_tier_price, \
             tier_name       = EXCLUDED.tier_name, \
             raw             = EXCLUDED.raw, \
             last_sync       = EXCLUDED.last_sync, \
             updated_at      = NOW() \
         WHERE (catalog_prices.entity_id, catalog_prices.catalog_item_id, \
                catalog_prices.regular_price, catalog_prices.at_tier_price, \
                catalog_prices.tier_name, catalog_prices.raw, catalog_prices.last_sync) \
           IS DISTINCT FROM \
               (EXCLUDED.entity_id, EXCLUDED.catalog_item_id, EXCLUDED.regular_price, \
                EXCLUDED.at_tier_price, EXCLUDED.tier_name, EXCLUDED.raw, EXCLUDED.last_sync) \
         RETURNING (xmax = 0) AS inserted",
    )
    .bind(&price.price_id)
    .bind(&price.entity_id)
    .bind(&price.catalog_item_id)
    .bind(price.regular_price)
    .bind(price.at_tier_price)
    .bind(&price.tier_name)
    .bind(&price.raw)
    .bind(price.last_sync)
    .fetch_optional(pool)
    .await?;

    Ok(UpsertOutcome::from_returning(inserted))
}

/// The most recently synced price row for a product.
///
/// Rows at `entity_id` (when given) rank ahead of rows at other entities;
/// within each group the latest `last_sync` wins.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn latest_price(
    pool: &PgPool,
    product_id: &str,
    entity_id: Option<&str>,
) -> Result<Option<PriceRecord>, DbError> {
    let row = sqlx::query_as::<_, PriceRow>(
        "SELECT price_id, entity_id, catalog_item_id, regular_price, at_tier_price, \
                tier_name, raw, last_sync \
         FROM catalog_prices \
         WHERE catalog_item_id = $1 \
         ORDER BY (entity_id = $2::text) DESC NULLS LAST, last_sync DESC, price_id \
         LIMIT 1",
    )
    .bind(product_id)
    .bind(entity_id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(PriceRecord::from))
}

// ---------------------------------------------------------------------------
// catalog_inventory operations
// ---------------------------------------------------------------------------

/// Upserts an inventory row keyed on `inventory_id`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the upsert fails.
pub async fn upsert_inventory(
    pool: &PgPool,
    record: &InventoryRecord,
) -> Result<UpsertOutcome, DbError> {
    let inserted = sqlx::query_scalar::<_, bool>(
        "INSERT INTO catalog_inventory \
             (inventory_id, product_id, location_id, quantity, available_quantity, \
              reserved_quantity, raw, last_sync) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
         ON CONFLICT (inventory_id) DO UPDATE SET \
             product_id         = EXCLUDED.product_id, \
             location_id        = EXCLUDED.location_id, \
             quantity           = EXCLUDED.quantity, \
             available_quantity = EXCLUDED.available_quantity, \
             reserved_quantity  = EXCLUDED.reserved_quantity, \
             raw                = EXCLUDED.raw, \
             last_sync          = EXCLUDED.last_sync, \
             updated_at         = NOW() \
         WHERE (catalog_inventory.product_id, catalog_inventory.location_id, \
                catalog_inventory.quantity, catalog_inventory.available_quantity, \
                catalog_inventory.reserved_quantity, catalog_inventory.raw, \
                catalog_inventory.last_sync) \
           IS DISTINCT FROM \
               (EXCLUDED.product_id, EXCLUDED.location_id, EXCLUDED.quantity, \
                EXCLUDED.available_quantity, EXCLUDED.reserved_quantity, EXCLUDED.raw, \
                EXCLUDED.last_sync) \
         RETURNING (xmax = 0) AS inserted",
    )
    .bind(&record.inventory_id)
    .bind(&record.product_id)
    .bind(&record.location_id)
    .bind(record.quantity)
    .bind(record.available_quantity)
    .bind(record.reserved_quantity)
    .bind(&record.raw)
    .bind(record.last_sync)
    .fetch_optional(pool)
    .await?;

    Ok(UpsertOutcome::from_returning(inserted))
}

/// All inventory rows for a product, optionally limited to one location.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn inventory_for_product(
    pool: &PgPool,
    product_id: &str,
    location_id: Option<&str>,
) -> Result<Vec<InventoryRecord>, DbError> {
    let rows = sqlx::query_as::<_, InventoryRow>(
        "SELECT inventory_id, product_id, location_id, quantity, available_quantity, \
                reserved_quantity, raw, last_sync \
         FROM catalog_inventory \
         WHERE product_id = $1 AND ($2::text IS NULL OR location_id = $2) \
         ORDER BY location_id, inventory_id",
    )
    .bind(product_id)
    .bind(location_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(InventoryRecord::from).collect())
}
