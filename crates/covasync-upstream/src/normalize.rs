//! Conversion from raw upstream payloads to canonical catalog records.
//!
//! Field lookups go through the ordered extractor lists in
//! [`crate::extract`]. The raw payload is always kept alongside the
//! extracted columns.

use chrono::{DateTime, Utc};
use covasync_core::{extract_sku, CatalogProduct, InventoryRecord, PriceRecord};
use rust_decimal::Decimal;
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::error::NormalizeError;
use crate::extract::{
    first_match, CATEGORY, CREATED_AT, DESCRIPTION, EMBEDDED_PRICE, EMBEDDED_SALE_PRICE,
    ENTRY_IN_STOCK, ENTRY_LOCATION, ENTRY_ON_ORDER, ENTRY_ROOM, INVENTORY_AVAILABLE, INVENTORY_ID,
    INVENTORY_LOCATION, INVENTORY_PRODUCT_ID, INVENTORY_QUANTITY, INVENTORY_RESERVED, IS_ARCHIVED,
    MASTER_PRODUCT_ID, PRICE_CATALOG_ITEM, PRICE_ENTITY, PRICE_ID, PRODUCT_ID, PRODUCT_NAME,
    PRODUCT_ON_HAND, REGULAR_PRICE, TIER_NAME, TIER_PRICE, UPDATED_AT,
};

/// Room assumed for availability entries that do not name one.
const DEFAULT_ROOM: &str = "0";

/// Per-run inputs shared by every record normalized in that run.
///
/// `synced_at` is fixed for the run, so normalizing the same payload twice
/// in one run yields identical records.
#[derive(Debug, Clone)]
pub struct NormalizeContext {
    pub synced_at: DateTime<Utc>,
    /// Location assigned to price and inventory rows that carry none.
    pub default_location: Option<String>,
}

/// A product plus the price and stock rows embedded in its payload.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedProduct {
    pub product: CatalogProduct,
    pub embedded_price: Option<PriceRecord>,
    /// One row per availability entry that names a location.
    pub availability: Vec<InventoryRecord>,
}

/// Aggregate stock for one product.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StockSummary {
    pub quantity: i64,
    pub in_stock: bool,
}

/// Deterministic identifier from the given parts.
#[must_use]
pub fn stable_key(parts: &[&str]) -> String {
    format!("{:x}", Sha256::digest(parts.join("\u{1f}").as_bytes()))
}

/// Normalizes one detailed-product payload.
///
/// # Errors
///
/// Returns [`NormalizeError`] when the payload is not an object or has no
/// product ID.
pub fn normalize_product(
    raw: &Value,
    ctx: &NormalizeContext,
) -> Result<NormalizedProduct, NormalizeError> {
    if !raw.is_object() {
        return Err(NormalizeError::NotAnObject { kind: "product" });
    }
    let product_id = first_match(raw, PRODUCT_ID).ok_or(NormalizeError::MissingField {
        kind: "product",
        field: "ProductId",
    })?;

    let sku = extract_sku(raw, &product_id);
    let stock = stock_summary(raw);
    let updated_at = first_match(raw, UPDATED_AT);

    let product = CatalogProduct {
        name: first_match(raw, PRODUCT_NAME).unwrap_or_default(),
        master_product_id: first_match(raw, MASTER_PRODUCT_ID),
        category: first_match(raw, CATEGORY),
        catalog_sku: (!sku.is_fallback()).then_some(sku.sku),
        description: first_match(raw, DESCRIPTION),
        is_archived: first_match(raw, IS_ARCHIVED).unwrap_or(false),
        is_in_stock: stock.in_stock,
        stock_quantity: stock.quantity,
        upstream_created_at: first_match(raw, CREATED_AT),
        upstream_updated_at: updated_at,
        raw: raw.clone(),
        last_sync: ctx.synced_at,
        product_id,
    };

    let embedded_price = embedded_price(&product.product_id, raw, updated_at, ctx);
    let availability = availability_inventory(&product.product_id, raw, ctx);

    Ok(NormalizedProduct {
        product,
        embedded_price,
        availability,
    })
}

/// Total on-hand quantity for a product payload.
///
/// Availability entries win when present. Otherwise the pricing entries'
/// stock is summed, and failing that the top-level `QuantityOnHand` is used.
#[must_use]
pub fn stock_summary(raw: &Value) -> StockSummary {
    if let Some(entries) = non_empty_array(raw, "Availability") {
        let quantities: Vec<i64> = entries
            .iter()
            .map(|entry| first_match(entry, ENTRY_IN_STOCK).unwrap_or(0))
            .collect();
        return StockSummary {
            quantity: quantities.iter().sum(),
            in_stock: quantities.iter().any(|q| *q > 0),
        };
    }

    let from_pricing = non_empty_array(raw, "Pricing").and_then(|entries| {
        let quantities: Vec<i64> = entries
            .iter()
            .filter_map(|entry| first_match(entry, ENTRY_IN_STOCK))
            .collect();
        (!quantities.is_empty()).then(|| quantities.iter().sum())
    });

    let quantity = from_pricing
        .or_else(|| first_match(raw, PRODUCT_ON_HAND))
        .unwrap_or(0);
    StockSummary {
        quantity,
        in_stock: quantity > 0,
    }
}

/// Inventory rows derived from a product's availability entries.
///
/// Entries without a location or an `InStockQuantity` are counted in the
/// product's aggregate stock but produce no row.
#[must_use]
pub fn availability_inventory(
    product_id: &str,
    raw: &Value,
    ctx: &NormalizeContext,
) -> Vec<InventoryRecord> {
    let Some(entries) = non_empty_array(raw, "Availability") else {
        return Vec::new();
    };

    entries
        .iter()
        .filter_map(|entry| {
            let location = first_match(entry, ENTRY_LOCATION)?;
            let quantity = first_match(entry, ENTRY_IN_STOCK)?;
            let room = first_match(entry, ENTRY_ROOM).unwrap_or_else(|| DEFAULT_ROOM.to_owned());
            let reserved = first_match(entry, ENTRY_ON_ORDER).unwrap_or(0);
            Some(InventoryRecord {
                inventory_id: stable_key(&["inventory", product_id, &location, &room]),
                product_id: product_id.to_owned(),
                location_id: Some(location),
                quantity,
                available_quantity: quantity - reserved,
                reserved_quantity: reserved,
                raw: entry.clone(),
                last_sync: ctx.synced_at,
            })
        })
        .collect()
}

fn embedded_price(
    product_id: &str,
    raw: &Value,
    updated_at: Option<DateTime<Utc>>,
    ctx: &NormalizeContext,
) -> Option<PriceRecord> {
    let entries = non_empty_array(raw, "Pricing")?;
    let (entry, price) = entries.iter().find_map(|entry| {
        first_match(entry, EMBEDDED_PRICE)
            .filter(|p| *p > Decimal::ZERO)
            .map(|p| (entry, p))
    })?;

    // Keyed on the upstream update time so a re-sync of an unchanged
    // product reproduces the same ID.
    let price_id = first_match(entry, PRICE_ID).unwrap_or_else(|| {
        let stamp = updated_at.map(|t| t.to_rfc3339()).unwrap_or_default();
        stable_key(&["price", product_id, &price.normalize().to_string(), &stamp])
    });
    let sale = first_match(entry, EMBEDDED_SALE_PRICE).filter(|p| *p > Decimal::ZERO);

    Some(PriceRecord {
        price_id,
        entity_id: first_match(entry, ENTRY_LOCATION).or_else(|| ctx.default_location.clone()),
        catalog_item_id: product_id.to_owned(),
        regular_price: Some(price),
        at_tier_price: sale.or(Some(price)),
        tier_name: first_match(entry, TIER_NAME),
        raw: entry.clone(),
        last_sync: ctx.synced_at,
    })
}

/// Normalizes one row from the price endpoint.
///
/// # Errors
///
/// Returns [`NormalizeError`] when the row is not an object, has no `Id`,
/// or names no catalog item.
pub fn normalize_price(raw: &Value, ctx: &NormalizeContext) -> Result<PriceRecord, NormalizeError> {
    if !raw.is_object() {
        return Err(NormalizeError::NotAnObject { kind: "price" });
    }
    let catalog_item_id =
        first_match(raw, PRICE_CATALOG_ITEM).ok_or(NormalizeError::MissingField {
            kind: "price",
            field: "CatalogItemId",
        })?;

    let price_id = first_match(raw, PRICE_ID).ok_or(NormalizeError::MissingField {
        kind: "price",
        field: "Id",
    })?;

    let entity_id = first_match(raw, PRICE_ENTITY).or_else(|| ctx.default_location.clone());
    let regular_price = first_match(raw, REGULAR_PRICE);
    let at_tier_price = first_match(raw, TIER_PRICE);
    let tier_name = first_match(raw, TIER_NAME);

    Ok(PriceRecord {
        price_id,
        entity_id,
        catalog_item_id,
        regular_price,
        at_tier_price,
        tier_name,
        raw: raw.clone(),
        last_sync: ctx.synced_at,
    })
}

/// Normalizes one row from an inventory endpoint.
///
/// # Errors
///
/// Returns [`NormalizeError`] when the row is not an object or names no
/// product.
pub fn normalize_inventory(
    raw: &Value,
    ctx: &NormalizeContext,
) -> Result<InventoryRecord, NormalizeError> {
    if !raw.is_object() {
        return Err(NormalizeError::NotAnObject { kind: "inventory" });
    }
    let product_id = first_match(raw, INVENTORY_PRODUCT_ID).ok_or(NormalizeError::MissingField {
        kind: "inventory",
        field: "ProductId",
    })?;

    let location_id =
        first_match(raw, INVENTORY_LOCATION).or_else(|| ctx.default_location.clone());
    let quantity = first_match(raw, INVENTORY_QUANTITY).unwrap_or(0);
    let reserved = first_match(raw, INVENTORY_RESERVED).unwrap_or(0);
    let available = first_match(raw, INVENTORY_AVAILABLE).unwrap_or(quantity - reserved);

    let inventory_id = first_match(raw, INVENTORY_ID).unwrap_or_else(|| {
        let room = first_match(raw, ENTRY_ROOM).unwrap_or_else(|| DEFAULT_ROOM.to_owned());
        stable_key(&[
            "inventory",
            &product_id,
            location_id.as_deref().unwrap_or_default(),
            &room,
        ])
    });

    Ok(InventoryRecord {
        inventory_id,
        product_id,
        location_id,
        quantity,
        available_quantity: available,
        reserved_quantity: reserved,
        raw: raw.clone(),
        last_sync: ctx.synced_at,
    })
}

fn non_empty_array<'a>(raw: &'a Value, field: &str) -> Option<&'a Vec<Value>> {
    raw.get(field)?.as_array().filter(|a| !a.is_empty())
}

#[cfg(test)]
#[path = "normalize_test.rs"]
mod tests;
