use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::Method;
use serde_json::Value;

use super::UpstreamClient;
use crate::error::UpstreamError;
use crate::types::{CatalogQuery, InventoryFetch};

/// Inventory endpoint templates, tried in order. `{company}` and `{location}`
/// are substituted before the call.
pub const INVENTORY_ENDPOINTS: &[&str] = &[
    "SupplyChain/v1/companies/{company}/location/{location}/inventory",
    "DataPlatform/Inventory/v1/Companies({company})/Locations({location})/CatalogItems",
    "Inventory/v1/Companies/{company}/Inventory/Locations/{location}",
];

/// Envelope keys that may hold inventory rows, in lookup order.
const INVENTORY_KEYS: &[&str] = &["Items", "inventory", "Inventory"];

impl UpstreamClient {
    fn catalog_endpoint(&self) -> String {
        format!(
            "dataplatform/v1/companies/{}/DetailedProductData",
            self.company_id
        )
    }

    fn require_location(&self, operation: &'static str) -> Result<&str, UpstreamError> {
        self.location_id
            .as_deref()
            .filter(|id| !id.trim().is_empty())
            .ok_or(UpstreamError::MissingLocation { operation })
    }

    /// Fetches one page of detailed product data.
    ///
    /// With `updated_since`, only products changed after that instant are
    /// returned.
    ///
    /// # Errors
    ///
    /// Propagates [`UpstreamClient::request`] errors, and returns
    /// [`UpstreamError::InvalidResponse`] when the body has no `Products`
    /// array.
    pub async fn fetch_catalog_page(
        &self,
        updated_since: Option<DateTime<Utc>>,
        skip: u64,
        top: u32,
    ) -> Result<Vec<Value>, UpstreamError> {
        let endpoint = match updated_since {
            Some(since) => format!(
                "{}/UpdatedAsOf/{}",
                self.catalog_endpoint(),
                format_updated_since(since)
            ),
            None => self.catalog_endpoint(),
        };
        let body = serde_json::to_value(
            CatalogQuery::new(self.location_id.as_deref()).page(skip, top),
        )
        .map_err(|e| UpstreamError::InvalidResponse {
            endpoint: endpoint.clone(),
            reason: format!("could not encode request body: {e}"),
        })?;

        let response = self.request(&endpoint, Method::POST, Some(&body)).await?;
        products_array(&endpoint, response)
    }

    /// Fetches a single product by upstream ID. `Ok(None)` when the upstream
    /// does not know it.
    ///
    /// # Errors
    ///
    /// Propagates [`UpstreamClient::request`] errors.
    pub async fn fetch_product(&self, product_id: &str) -> Result<Option<Value>, UpstreamError> {
        let endpoint = format!("{}/ByProductIdList", self.catalog_endpoint());
        let body = serde_json::to_value(
            CatalogQuery::new(self.location_id.as_deref()).products(vec![product_id.to_owned()]),
        )
        .map_err(|e| UpstreamError::InvalidResponse {
            endpoint: endpoint.clone(),
            reason: format!("could not encode request body: {e}"),
        })?;

        let response = self.request(&endpoint, Method::POST, Some(&body)).await?;
        let products = match products_array(&endpoint, response) {
            Ok(products) => products,
            Err(UpstreamError::InvalidResponse { .. }) => return Ok(None),
            Err(e) => return Err(e),
        };
        Ok(products.into_iter().next())
    }

    /// Fetches one page of price rows for the configured location.
    ///
    /// # Errors
    ///
    /// - [`UpstreamError::MissingLocation`] without a configured location.
    /// - [`UpstreamError::InvalidResponse`] when the body is not an array.
    /// - Any [`UpstreamClient::request`] error.
    pub async fn fetch_price_page(&self, skip: u64, top: u32) -> Result<Vec<Value>, UpstreamError> {
        let location = self.require_location("price sync")?;
        let endpoint = format!("pricing/v1/Companies({})/ProductPrices", self.company_id);
        let query = [
            ("$filter", format!("EntityId eq {location}")),
            ("$skip", skip.to_string()),
            ("$top", top.to_string()),
        ];

        let response = self
            .request_with_query(&endpoint, &query, Method::GET, None)
            .await?;
        match response {
            Value::Array(rows) => Ok(rows),
            // OData servers sometimes wrap collections.
            Value::Object(mut map) => match map.remove("value") {
                Some(Value::Array(rows)) => Ok(rows),
                _ => Err(UpstreamError::InvalidResponse {
                    endpoint,
                    reason: "expected a JSON array of prices".to_string(),
                }),
            },
            _ => Err(UpstreamError::InvalidResponse {
                endpoint,
                reason: "expected a JSON array of prices".to_string(),
            }),
        }
    }

    /// # Errors
    ///
    /// Propagates [`UpstreamClient::request`] errors.
    pub async fn fetch_tax_rates(&self) -> Result<Value, UpstreamError> {
        let endpoint = format!("taxes/v1/Companies({})/TaxRates", self.company_id);
        self.request(&endpoint, Method::GET, None).await
    }

    /// # Errors
    ///
    /// Propagates [`UpstreamClient::request`] errors.
    pub async fn fetch_tax_configuration(&self) -> Result<Value, UpstreamError> {
        let endpoint = format!(
            "taxes/v1/Companies({})/TaxPricingConfiguration",
            self.company_id
        );
        self.request(&endpoint, Method::GET, None).await
    }

    /// Tries each inventory endpoint in order and returns the first non-empty
    /// result.
    ///
    /// A candidate that fails or returns no rows is skipped. When every
    /// candidate comes back empty the result is an empty [`InventoryFetch`],
    /// which callers treat as a normal outcome.
    ///
    /// # Errors
    ///
    /// - [`UpstreamError::MissingLocation`] without a configured location.
    /// - [`UpstreamError::AuthenticationFailed`], which no other endpoint
    ///   would fix.
    pub async fn fetch_inventory(&self) -> Result<InventoryFetch, UpstreamError> {
        let location = self.require_location("inventory sync")?.to_owned();

        for template in INVENTORY_ENDPOINTS {
            let endpoint = template
                .replace("{company}", &self.company_id)
                .replace("{location}", &location);

            match self.request(&endpoint, Method::GET, None).await {
                Ok(body) => {
                    let records = inventory_rows(body);
                    if records.is_empty() {
                        tracing::debug!(endpoint, "inventory endpoint returned no rows");
                        continue;
                    }
                    tracing::info!(endpoint, count = records.len(), "fetched inventory");
                    return Ok(InventoryFetch {
                        endpoint: Some(endpoint),
                        records,
                    });
                }
                Err(e @ UpstreamError::AuthenticationFailed { .. }) => return Err(e),
                Err(e) => {
                    tracing::warn!(endpoint, error = %e, "inventory endpoint failed; trying next");
                }
            }
        }

        tracing::info!("no inventory endpoint returned data");
        Ok(InventoryFetch::default())
    }
}

/// `2024-05-01T12:00:00.000Z`; the upstream rejects other precisions.
#[must_use]
pub fn format_updated_since(since: DateTime<Utc>) -> String {
    since.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn products_array(endpoint: &str, response: Value) -> Result<Vec<Value>, UpstreamError> {
    match response {
        Value::Object(mut map) => match map.remove("Products") {
            Some(Value::Array(products)) => Ok(products),
            Some(Value::Null) => Ok(Vec::new()),
            _ => Err(UpstreamError::InvalidResponse {
                endpoint: endpoint.to_owned(),
                reason: "missing Products array".to_string(),
            }),
        },
        _ => Err(UpstreamError::InvalidResponse {
            endpoint: endpoint.to_owned(),
            reason: "expected a JSON object with a Products array".to_string(),
        }),
    }
}

/// Accepts `{"Items": [...]}`, `{"inventory": [...]}`, `{"Inventory": [...]}`
/// or a bare array.
fn inventory_rows(body: Value) -> Vec<Value> {
    match body {
        Value::Array(rows) => rows,
        Value::Object(mut map) => INVENTORY_KEYS
            .iter()
            .find_map(|key| match map.remove(*key) {
                Some(Value::Array(rows)) => Some(rows),
                _ => None,
            })
            .unwrap_or_default(),
        _ => Vec::new(),
    }
}
