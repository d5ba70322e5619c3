use serde::Serialize;

/// Request body shared by the detailed-product endpoints.
///
/// Every include flag is on: the sync keeps the whole payload as `raw` and
/// downstream steps read SKUs, assets, availability and pricing from it.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct CatalogQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location_id: Option<i64>,
    pub include_product_skus_and_upcs: bool,
    pub include_product_specifications: bool,
    pub include_classifications: bool,
    pub include_product_assets: bool,
    pub include_availability: bool,
    pub include_package_details: bool,
    pub include_pricing: bool,
    pub include_taxes: bool,
    pub in_stock_only: bool,
    pub include_all_lifecycles: bool,
    pub selling_room_only: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product_ids: Option<Vec<String>>,
}

impl CatalogQuery {
    #[must_use]
    pub fn new(location_id: Option<&str>) -> Self {
        Self {
            location_id: location_id.and_then(|id| id.trim().parse().ok()),
            include_product_skus_and_upcs: true,
            include_product_specifications: true,
            include_classifications: true,
            include_product_assets: true,
            include_availability: true,
            include_package_details: true,
            include_pricing: true,
            include_taxes: true,
            in_stock_only: false,
            include_all_lifecycles: true,
            selling_room_only: false,
            skip: None,
            top: None,
            product_ids: None,
        }
    }

    #[must_use]
    pub fn page(mut self, skip: u64, top: u32) -> Self {
        self.skip = Some(skip);
        self.top = Some(top);
        self
    }

    #[must_use]
    pub fn products(mut self, ids: Vec<String>) -> Self {
        self.product_ids = Some(ids);
        self
    }
}

/// Inventory payload and the endpoint that produced it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InventoryFetch {
    /// `None` when no candidate endpoint returned data.
    pub endpoint: Option<String>,
    pub records: Vec<serde_json::Value>,
}

impl InventoryFetch {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
