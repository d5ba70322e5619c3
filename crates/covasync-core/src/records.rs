use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Local canonical copy of an upstream catalog product.
///
/// `product_id` is the only stable join key; every other field is
/// best-effort and may be empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogProduct {
    /// Upstream-assigned product ID.
    pub product_id: String,
    pub name: String,
    pub master_product_id: Option<String>,
    pub category: Option<String>,
    /// Merchant SKU chosen by the SKU heuristic, `None` when only a
    /// synthesized fallback would be available.
    pub catalog_sku: Option<String>,
    pub description: Option<String>,
    pub is_archived: bool,
    pub is_in_stock: bool,
    /// Sum of on-hand quantity across every availability entry.
    pub stock_quantity: i64,
    pub upstream_created_at: Option<DateTime<Utc>>,
    pub upstream_updated_at: Option<DateTime<Utc>>,
    /// Untouched upstream payload, kept for forward-compatible field access.
    pub raw: serde_json::Value,
    pub last_sync: DateTime<Utc>,
}

/// A price row for a catalog item at an entity (location).
///
/// `catalog_item_id` is not unique: a product may carry several tier rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceRecord {
    /// Upstream price ID, or a deterministic hash when the upstream omits one.
    pub price_id: String,
    pub entity_id: Option<String>,
    pub catalog_item_id: String,
    pub regular_price: Option<Decimal>,
    pub at_tier_price: Option<Decimal>,
    pub tier_name: Option<String>,
    pub raw: serde_json::Value,
    pub last_sync: DateTime<Utc>,
}

impl PriceRecord {
    /// The price a shopper pays: the tier price when positive, otherwise the
    /// regular price.
    #[must_use]
    pub fn effective_price(&self) -> Option<Decimal> {
        self.at_tier_price
            .filter(|p| *p > Decimal::ZERO)
            .or(self.regular_price)
            .filter(|p| *p > Decimal::ZERO)
    }
}

/// Stock for one product at one location (and optionally one room).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryRecord {
    /// Upstream inventory ID, or a deterministic hash of product, location and room.
    pub inventory_id: String,
    pub product_id: String,
    pub location_id: Option<String>,
    pub quantity: i64,
    pub available_quantity: i64,
    pub reserved_quantity: i64,
    pub raw: serde_json::Value,
    pub last_sync: DateTime<Utc>,
}

impl InventoryRecord {
    #[must_use]
    pub fn in_stock(&self) -> bool {
        self.quantity > 0
    }
}

/// Persisted progress marker for one named job.
///
/// Never expires on its own; only an explicit reset clears it. The set of
/// processed idempotency keys for resumable jobs is stored alongside and
/// reached through the checkpoint store rather than carried here.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncCheckpoint {
    pub last_sync_at: Option<DateTime<Utc>>,
    pub batch_offset: i64,
}

impl SyncCheckpoint {
    /// `true` when no sync has ever completed for this job.
    #[must_use]
    pub fn needs_full_sync(&self) -> bool {
        self.last_sync_at.is_none()
    }
}

/// Mapping between an upstream product and the downstream record created for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkedDownstreamRecord {
    pub product_id: String,
    pub downstream_id: i64,
    pub sku: Option<String>,
    pub stock_quantity: Option<i64>,
    pub in_stock: bool,
    pub published_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        s.parse().expect("valid decimal literal")
    }

    fn price(regular: Option<&str>, tier: Option<&str>) -> PriceRecord {
        PriceRecord {
            price_id: "p-1".to_string(),
            entity_id: Some("42".to_string()),
            catalog_item_id: "prod-1".to_string(),
            regular_price: regular.map(dec),
            at_tier_price: tier.map(dec),
            tier_name: None,
            raw: serde_json::Value::Null,
            last_sync: Utc::now(),
        }
    }

    #[test]
    fn effective_price_prefers_positive_tier_price() {
        assert_eq!(
            price(Some("20.00"), Some("17.50")).effective_price(),
            Some(dec("17.50"))
        );
    }

    #[test]
    fn effective_price_ignores_zero_tier_price() {
        assert_eq!(
            price(Some("20.00"), Some("0")).effective_price(),
            Some(dec("20.00"))
        );
    }

    #[test]
    fn effective_price_none_when_nothing_positive() {
        assert_eq!(price(Some("0"), None).effective_price(), None);
        assert_eq!(price(None, None).effective_price(), None);
    }

    #[test]
    fn default_checkpoint_needs_full_sync() {
        let checkpoint = SyncCheckpoint::default();
        assert!(checkpoint.needs_full_sync());
        assert_eq!(checkpoint.batch_offset, 0);
    }
}
