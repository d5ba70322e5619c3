//! [`DownstreamCatalog`] over the `WooCommerce` REST API (`wc/v3`).
//!
//! Requests authenticate with the consumer key and secret as HTTP basic
//! auth. The upstream product ID is written to the `_cova_product_id` meta
//! field of every product so the link survives outside the local table.

use std::time::Duration;

use covasync_core::AppConfig;
use reqwest::{Client, Method, Url};
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::{json, Value};

use super::catalog::{
    DownstreamCatalog, DownstreamProduct, DownstreamRecord, PublishStatus, StockStatus,
};
use crate::error::PublishError;

/// Meta key holding the upstream product ID on downstream products.
pub const UPSTREAM_ID_META_KEY: &str = "_cova_product_id";

const API_PREFIX: &str = "wp-json/wc/v3";

pub struct WooCommerceClient {
    client: Client,
    base_url: Url,
    consumer_key: String,
    consumer_secret: String,
}

impl std::fmt::Debug for WooCommerceClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WooCommerceClient")
            .field("base_url", &self.base_url.as_str())
            .field("consumer_key", &self.consumer_key)
            .field("consumer_secret", &"[redacted]")
            .finish_non_exhaustive()
    }
}

impl WooCommerceClient {
    /// Builds a client from the `WOO_*` settings.
    ///
    /// # Errors
    ///
    /// - [`PublishError::NotConfigured`] when any of the three settings is unset.
    /// - [`PublishError::InvalidBaseUrl`] when the base URL does not parse.
    /// - [`PublishError::Http`] if the HTTP client cannot be built.
    pub fn from_config(config: &AppConfig) -> Result<Self, PublishError> {
        let publish = &config.publish;
        let base_url = publish
            .woo_base_url
            .as_deref()
            .ok_or(PublishError::NotConfigured("WOO_BASE_URL"))?;
        let key = publish
            .woo_consumer_key
            .as_deref()
            .ok_or(PublishError::NotConfigured("WOO_CONSUMER_KEY"))?;
        let secret = publish
            .woo_consumer_secret
            .as_deref()
            .ok_or(PublishError::NotConfigured("WOO_CONSUMER_SECRET"))?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.upstream.request_timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .user_agent(&config.upstream.user_agent)
            .build()?;

        Self::with_base_url(client, base_url, key, secret)
    }

    /// # Errors
    ///
    /// Returns [`PublishError::InvalidBaseUrl`] if `base_url` does not parse.
    pub fn with_base_url(
        client: Client,
        base_url: &str,
        consumer_key: &str,
        consumer_secret: &str,
    ) -> Result<Self, PublishError> {
        let normalised = format!("{}/", base_url.trim_end_matches('/'));
        let base_url = Url::parse(&normalised).map_err(|e| PublishError::InvalidBaseUrl {
            url: base_url.to_owned(),
            reason: e.to_string(),
        })?;

        Ok(Self {
            client,
            base_url,
            consumer_key: consumer_key.to_owned(),
            consumer_secret: consumer_secret.to_owned(),
        })
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<Value, PublishError> {
        let endpoint = format!("{API_PREFIX}/{path}");
        let url = self
            .base_url
            .join(&endpoint)
            .map_err(|e| PublishError::InvalidBaseUrl {
                url: self.base_url.to_string(),
                reason: e.to_string(),
            })?;

        tracing::debug!(endpoint, method = %method, "downstream request");
        let mut request = self
            .client
            .request(method.clone(), url)
            .basic_auth(&self.consumer_key, Some(&self.consumer_secret));
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status().as_u16();
        let text = response.text().await?;
        tracing::debug!(endpoint, status, "downstream response");

        if status >= 400 {
            return Err(PublishError::Downstream {
                endpoint,
                method: method.to_string(),
                status,
                message: error_message(&text)
                    .unwrap_or_else(|| format!("Endpoint: {path} | HTTP Status: {status}")),
            });
        }

        serde_json::from_str(&text).map_err(|e| PublishError::InvalidResponse {
            endpoint,
            reason: e.to_string(),
        })
    }

    async fn write(
        &self,
        method: Method,
        path: &str,
        body: &Value,
    ) -> Result<DownstreamRecord, PublishError> {
        let response = self.send(method, path, Some(body)).await?;
        record_from(path, &response)
    }
}

impl DownstreamCatalog for WooCommerceClient {
    async fn create_product(
        &self,
        product: &DownstreamProduct,
    ) -> Result<DownstreamRecord, PublishError> {
        let body = payload(product, Some(product.status))?;
        self.write(Method::POST, "products", &body).await
    }

    async fn update_product(
        &self,
        id: i64,
        product: &DownstreamProduct,
    ) -> Result<DownstreamRecord, PublishError> {
        let body = payload(product, None)?;
        self.write(Method::PUT, &format!("products/{id}"), &body).await
    }

    async fn set_sku(&self, id: i64, sku: &str) -> Result<DownstreamRecord, PublishError> {
        self.write(Method::PUT, &format!("products/{id}"), &json!({"sku": sku}))
            .await
    }

    async fn delete_product(&self, id: i64) -> Result<bool, PublishError> {
        match self
            .send(Method::DELETE, &format!("products/{id}?force=true"), None)
            .await
        {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }
}

// ---------------------------------------------------------------------------
// Wire format
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct WooProduct<'a> {
    name: &'a str,
    #[serde(rename = "type")]
    kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    status: Option<PublishStatus>,
    description: &'a str,
    sku: &'a str,
    regular_price: String,
    sale_price: String,
    manage_stock: bool,
    stock_quantity: i64,
    stock_status: StockStatus,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    categories: Vec<WooCategory>,
    meta_data: [WooMeta<'a>; 1],
}

#[derive(Serialize)]
struct WooCategory {
    id: i64,
}

#[derive(Serialize)]
struct WooMeta<'a> {
    key: &'static str,
    value: &'a str,
}

fn payload(
    product: &DownstreamProduct,
    status: Option<PublishStatus>,
) -> Result<Value, PublishError> {
    let body = WooProduct {
        name: &product.name,
        kind: "simple",
        status,
        description: product.description.as_deref().unwrap_or_default(),
        sku: &product.sku,
        regular_price: money(product.regular_price),
        sale_price: money(product.sale_price),
        manage_stock: true,
        stock_quantity: product.stock_quantity,
        stock_status: product.stock_status,
        categories: product
            .category_id
            .map(|id| vec![WooCategory { id }])
            .unwrap_or_default(),
        meta_data: [WooMeta {
            key: UPSTREAM_ID_META_KEY,
            value: &product.upstream_id,
        }],
    };
    serde_json::to_value(body).map_err(|e| PublishError::InvalidResponse {
        endpoint: "products".to_owned(),
        reason: format!("could not encode request body: {e}"),
    })
}

/// Two-decimal string; empty clears the price downstream.
fn money(amount: Option<Decimal>) -> String {
    amount
        .map(|a| format!("{:.2}", a.round_dp(2)))
        .unwrap_or_default()
}

fn record_from(path: &str, body: &Value) -> Result<DownstreamRecord, PublishError> {
    let id = body
        .get("id")
        .and_then(Value::as_i64)
        .ok_or_else(|| PublishError::InvalidResponse {
            endpoint: format!("{API_PREFIX}/{path}"),
            reason: "response has no numeric id".to_owned(),
        })?;
    let sku = body
        .get("sku")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_owned);
    Ok(DownstreamRecord { id, sku })
}

/// `{"code": "...", "message": "..."}` is the REST API's error envelope.
fn error_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    value
        .get("message")
        .and_then(Value::as_str)
        .map(str::to_owned)
}
