//! Authenticated JSON client for the upstream retail API.

mod endpoints;

use std::sync::Arc;
use std::time::Duration;

use covasync_core::UpstreamSettings;
use reqwest::{Client, Method, StatusCode, Url};
use serde_json::Value;

use crate::error::UpstreamError;
use crate::token::{Credentials, TokenCache};

pub use endpoints::{format_updated_since, INVENTORY_ENDPOINTS};

/// Re-authentications allowed per request after a 401. A second 401 on a
/// freshly issued token is surfaced instead of looping.
const MAX_AUTH_RETRIES: u32 = 1;

/// Client for the upstream catalog, pricing, tax and inventory APIs.
///
/// Every request carries a bearer token from the shared [`TokenCache`]. The
/// client never retries on its own except for a single re-authentication
/// after a 401; backoff and scheduling belong to the caller.
pub struct UpstreamClient {
    client: Client,
    base_url: Url,
    company_id: String,
    location_id: Option<String>,
    tokens: Arc<TokenCache>,
}

impl UpstreamClient {
    /// Builds a client and its token cache from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`UpstreamError::Http`] if the underlying `reqwest::Client`
    /// cannot be constructed, or [`UpstreamError::InvalidBaseUrl`] if either
    /// configured URL does not parse.
    pub fn from_settings(settings: &UpstreamSettings) -> Result<Self, UpstreamError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.request_timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .user_agent(&settings.user_agent)
            .build()?;

        let tokens = TokenCache::new(
            client.clone(),
            &settings.auth_url,
            Credentials::from_settings(settings),
            Duration::from_secs(settings.token_ttl_secs),
        )?;

        Self::with_base_url(
            client,
            &settings.api_base_url,
            &settings.company_id,
            settings.location_id.as_deref(),
            Arc::new(tokens),
        )
    }

    /// Builds a client around an existing token cache.
    ///
    /// # Errors
    ///
    /// Returns [`UpstreamError::InvalidBaseUrl`] if `base_url` does not parse.
    pub fn with_base_url(
        client: Client,
        base_url: &str,
        company_id: &str,
        location_id: Option<&str>,
        tokens: Arc<TokenCache>,
    ) -> Result<Self, UpstreamError> {
        // Exactly one trailing slash so relative endpoint paths join under it.
        let normalised = format!("{}/", base_url.trim_end_matches('/'));
        let base_url = Url::parse(&normalised).map_err(|e| UpstreamError::InvalidBaseUrl {
            url: base_url.to_owned(),
            reason: e.to_string(),
        })?;

        Ok(Self {
            client,
            base_url,
            company_id: company_id.to_owned(),
            location_id: location_id.map(str::to_owned),
            tokens,
        })
    }

    #[must_use]
    pub fn company_id(&self) -> &str {
        &self.company_id
    }

    #[must_use]
    pub fn location_id(&self) -> Option<&str> {
        self.location_id.as_deref()
    }

    #[must_use]
    pub fn tokens(&self) -> &Arc<TokenCache> {
        &self.tokens
    }

    /// Sends an authenticated JSON request and returns the parsed body.
    ///
    /// # Errors
    ///
    /// - [`UpstreamError::AuthenticationFailed`] when no token can be obtained
    ///   or a freshly issued token is also rejected.
    /// - [`UpstreamError::RequestFailed`] for any status of 400 or above.
    /// - [`UpstreamError::InvalidResponse`] when a success body is not JSON.
    /// - [`UpstreamError::Http`] on transport failure.
    pub async fn request(
        &self,
        endpoint: &str,
        method: Method,
        body: Option<&Value>,
    ) -> Result<Value, UpstreamError> {
        self.request_with_query(endpoint, &[], method, body).await
    }

    /// Like [`request`](Self::request), with query parameters appended to the
    /// endpoint URL.
    ///
    /// # Errors
    ///
    /// Same as [`request`](Self::request).
    pub async fn request_with_query(
        &self,
        endpoint: &str,
        query: &[(&str, String)],
        method: Method,
        body: Option<&Value>,
    ) -> Result<Value, UpstreamError> {
        let url = self.endpoint_url(endpoint, query)?;
        let mut auth_retries = 0;

        loop {
            let token = self.tokens.get_token().await?;
            tracing::debug!(endpoint, %method, "upstream request");

            let mut request = self
                .client
                .request(method.clone(), url.clone())
                .bearer_auth(&token)
                .header(reqwest::header::ACCEPT, "application/json");
            if let Some(body) = body {
                request = request.json(body);
            }

            let response = request.send().await?;
            let status = response.status();
            tracing::debug!(endpoint, status = status.as_u16(), "upstream response");

            if status == StatusCode::UNAUTHORIZED {
                self.tokens.invalidate_if_current(&token).await;
                if auth_retries < MAX_AUTH_RETRIES {
                    auth_retries += 1;
                    tracing::warn!(endpoint, "upstream rejected token; re-authenticating");
                    continue;
                }
                return Err(UpstreamError::AuthenticationFailed {
                    status: Some(status.as_u16()),
                    message: format!("{endpoint} rejected a freshly issued token"),
                });
            }

            let text = response.text().await?;

            if status.as_u16() >= 400 {
                let message = error_message(&text).unwrap_or_else(|| {
                    format!("Endpoint: {endpoint} | HTTP Status: {}", status.as_u16())
                });
                tracing::error!(endpoint, status = status.as_u16(), %message, "upstream request failed");
                return Err(UpstreamError::RequestFailed {
                    endpoint: endpoint.to_owned(),
                    method: method.to_string(),
                    body: body.map(Value::to_string),
                    status: status.as_u16(),
                    message,
                });
            }

            if status == StatusCode::NO_CONTENT {
                return Ok(Value::Null);
            }

            return serde_json::from_str(&text).map_err(|e| UpstreamError::InvalidResponse {
                endpoint: endpoint.to_owned(),
                reason: format!("body is not valid JSON: {e}"),
            });
        }
    }

    fn endpoint_url(&self, endpoint: &str, query: &[(&str, String)]) -> Result<Url, UpstreamError> {
        let mut url = self
            .base_url
            .join(endpoint.trim_start_matches('/'))
            .map_err(|e| UpstreamError::InvalidBaseUrl {
                url: format!("{}{endpoint}", self.base_url),
                reason: e.to_string(),
            })?;
        if !query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in query {
                pairs.append_pair(key, value);
            }
        }
        Ok(url)
    }
}

/// Pulls a human-readable message out of an upstream error body.
///
/// Checks `message`, `Message`, then `error.message`.
pub(crate) fn error_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    let candidates = [
        value.get("message"),
        value.get("Message"),
        value.get("error").and_then(|e| e.get("message")),
    ];
    let found = candidates
        .into_iter()
        .flatten()
        .find_map(|v| v.as_str().map(str::trim).filter(|s| !s.is_empty()))
        .map(str::to_owned);
    found
}

#[cfg(test)]
#[path = "../client_test.rs"]
mod tests;
