//! Ordered field extractors for loosely-typed upstream payloads.
//!
//! The same value appears under different names depending on the endpoint
//! and account configuration. Each canonical field has a list of extractor
//! functions tried in order; the first one that yields a value wins.

use chrono::{DateTime, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use serde_json::Value;

pub type Extractor<T> = fn(&Value) -> Option<T>;

/// Runs `extractors` in order and returns the first value produced.
pub fn first_match<T>(raw: &Value, extractors: &[Extractor<T>]) -> Option<T> {
    extractors.iter().find_map(|extract| extract(raw))
}

/// Non-empty string, or a number rendered as a string.
#[must_use]
pub fn text(raw: &Value, field: &str) -> Option<String> {
    match raw.get(field)? {
        Value::String(s) => Some(s.trim()).filter(|s| !s.is_empty()).map(str::to_owned),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Integer quantity. Fractional values truncate toward zero; numeric
/// strings are accepted.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn quantity(raw: &Value, field: &str) -> Option<i64> {
    match raw.get(field)? {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.trunc() as i64)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().map(|f| f.trunc() as i64))
        }
        _ => None,
    }
}

#[must_use]
pub fn decimal(raw: &Value, field: &str) -> Option<Decimal> {
    match raw.get(field)? {
        Value::Number(n) => n.to_string().parse().ok(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[must_use]
pub fn flag(raw: &Value, field: &str) -> Option<bool> {
    match raw.get(field)? {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" => Some(true),
            "false" | "0" => Some(false),
            _ => None,
        },
        Value::Number(n) => n.as_i64().map(|n| n != 0),
        _ => None,
    }
}

/// RFC 3339, or a naive timestamp taken as UTC.
#[must_use]
pub fn timestamp(raw: &Value, field: &str) -> Option<DateTime<Utc>> {
    let s = raw.get(field)?.as_str()?.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

// Product fields.

pub const PRODUCT_ID: &[Extractor<String>] = &[|r| text(r, "ProductId")];
pub const PRODUCT_NAME: &[Extractor<String>] = &[|r| text(r, "Name")];
pub const MASTER_PRODUCT_ID: &[Extractor<String>] = &[|r| text(r, "MasterProductId")];
pub const CATEGORY: &[Extractor<String>] = &[
    |r| text(r, "CategoryName"),
    |r| {
        r.get("Categories")
            .and_then(|list| list.get(0))
            .and_then(|first| text(first, "Name"))
    },
    |r| text(r, "ClassificationName"),
    |r| text(r, "Category"),
];
pub const DESCRIPTION: &[Extractor<String>] = &[
    |r| text(r, "LongDescription"),
    |r| text(r, "Description"),
    |r| text(r, "ShortDescription"),
];
pub const IS_ARCHIVED: &[Extractor<bool>] = &[|r| flag(r, "IsArchived")];
pub const CREATED_AT: &[Extractor<DateTime<Utc>>] = &[|r| timestamp(r, "CreatedDateUtc")];
pub const UPDATED_AT: &[Extractor<DateTime<Utc>>] = &[|r| timestamp(r, "UpdatedDateUtc")];
/// Stock carried directly on the product, used when no availability or
/// pricing entries report any.
pub const PRODUCT_ON_HAND: &[Extractor<i64>] = &[|r| quantity(r, "QuantityOnHand")];

// Availability and embedded pricing entries.

pub const ENTRY_IN_STOCK: &[Extractor<i64>] = &[|r| quantity(r, "InStockQuantity")];
pub const ENTRY_ON_ORDER: &[Extractor<i64>] = &[|r| quantity(r, "OnOrderQuantity")];
pub const ENTRY_LOCATION: &[Extractor<String>] = &[
    |r| text(r, "LocationId"),
    |r| text(r, "EntityId"),
];
pub const ENTRY_ROOM: &[Extractor<String>] = &[|r| text(r, "RoomId")];
pub const EMBEDDED_PRICE: &[Extractor<Decimal>] = &[
    |r| decimal(r, "Price"),
    |r| decimal(r, "RegularPrice"),
];
pub const EMBEDDED_SALE_PRICE: &[Extractor<Decimal>] = &[
    |r| decimal(r, "SalePrice"),
    |r| decimal(r, "AtTierPrice"),
];

// Price rows.

pub const PRICE_ID: &[Extractor<String>] = &[|r| text(r, "Id")];
pub const PRICE_ENTITY: &[Extractor<String>] = &[
    |r| text(r, "EntityId"),
    |r| text(r, "LocationId"),
];
pub const PRICE_CATALOG_ITEM: &[Extractor<String>] = &[
    |r| text(r, "CatalogItemId"),
    |r| text(r, "ProductId"),
];
pub const REGULAR_PRICE: &[Extractor<Decimal>] = &[
    |r| decimal(r, "RegularPrice"),
    |r| decimal(r, "Price"),
];
pub const TIER_PRICE: &[Extractor<Decimal>] = &[|r| decimal(r, "AtTierPrice")];
pub const TIER_NAME: &[Extractor<String>] = &[
    |r| r.get("PricingTier").and_then(|tier| text(tier, "TierName")),
    |r| text(r, "TierName"),
];

// Inventory rows.

pub const INVENTORY_ID: &[Extractor<String>] = &[|r| text(r, "Id")];
pub const INVENTORY_PRODUCT_ID: &[Extractor<String>] = &[
    |r| text(r, "ProductId"),
    |r| text(r, "CatalogItemId"),
    |r| text(r, "EntityId"),
];
pub const INVENTORY_LOCATION: &[Extractor<String>] = &[|r| text(r, "LocationId")];
pub const INVENTORY_QUANTITY: &[Extractor<i64>] = &[
    |r| quantity(r, "QuantityOnHand"),
    |r| quantity(r, "Quantity"),
    |r| quantity(r, "StockCount"),
    |r| quantity(r, "OnHand"),
    |r| quantity(r, "InStockQuantity"),
];
pub const INVENTORY_AVAILABLE: &[Extractor<i64>] = &[
    |r| quantity(r, "AvailableQuantity"),
    |r| quantity(r, "Available"),
];
pub const INVENTORY_RESERVED: &[Extractor<i64>] = &[
    |r| quantity(r, "OnOrderQuantity"),
    |r| quantity(r, "ReservedQuantity"),
];
