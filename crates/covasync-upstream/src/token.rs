//! Bearer-token acquisition and caching for the upstream API.
//!
//! One token is shared by every request the process makes. The cache lock is
//! held across the refresh call, so concurrent callers that find the token
//! missing or expired wait for a single refresh instead of each issuing their
//! own.

use std::fmt;
use std::time::Duration;

use covasync_core::UpstreamSettings;
use reqwest::{Client, StatusCode, Url};
use serde::Deserialize;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::error::UpstreamError;

/// Password-grant credentials. Secrets never appear in `Debug` output.
#[derive(Clone)]
pub struct Credentials {
    pub client_id: String,
    pub client_secret: String,
    pub username: String,
    pub password: String,
}

impl Credentials {
    #[must_use]
    pub fn from_settings(settings: &UpstreamSettings) -> Self {
        Self {
            client_id: settings.client_id.clone(),
            client_secret: settings.client_secret.clone(),
            username: settings.username.clone(),
            password: settings.password.clone(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[redacted]")
            .field("username", &self.username)
            .field("password", &"[redacted]")
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    /// Seconds, sent as a number or a numeric string. Anything else is
    /// ignored and the configured TTL applies.
    expires_in: Option<serde_json::Value>,
    error_description: Option<String>,
}

impl TokenResponse {
    fn expires_in_secs(&self) -> Option<u64> {
        match self.expires_in.as_ref()? {
            serde_json::Value::Number(n) => n.as_u64(),
            serde_json::Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

struct CachedToken {
    value: String,
    expires_at: Instant,
}

pub struct TokenCache {
    client: Client,
    auth_url: Url,
    credentials: Credentials,
    ttl: Duration,
    slot: Mutex<Option<CachedToken>>,
}

impl TokenCache {
    /// # Errors
    ///
    /// Returns [`UpstreamError::InvalidBaseUrl`] if `auth_url` does not parse.
    pub fn new(
        client: Client,
        auth_url: &str,
        credentials: Credentials,
        ttl: Duration,
    ) -> Result<Self, UpstreamError> {
        let auth_url = Url::parse(auth_url).map_err(|e| UpstreamError::InvalidBaseUrl {
            url: auth_url.to_owned(),
            reason: e.to_string(),
        })?;
        Ok(Self {
            client,
            auth_url,
            credentials,
            ttl,
            slot: Mutex::new(None),
        })
    }

    /// Returns the cached token, refreshing it first if it is missing or
    /// expired.
    ///
    /// # Errors
    ///
    /// - [`UpstreamError::AuthenticationFailed`] when the auth endpoint
    ///   rejects the credentials or answers without a token.
    /// - [`UpstreamError::Http`] on transport failure.
    pub async fn get_token(&self) -> Result<String, UpstreamError> {
        let mut slot = self.slot.lock().await;
        if let Some(cached) = slot.as_ref() {
            if Instant::now() < cached.expires_at {
                return Ok(cached.value.clone());
            }
        }

        *slot = None;
        let (value, ttl) = self.fetch_token().await?;
        *slot = Some(CachedToken {
            value: value.clone(),
            expires_at: Instant::now() + ttl,
        });
        Ok(value)
    }

    /// Drops the cached token unconditionally.
    pub async fn invalidate(&self) {
        *self.slot.lock().await = None;
    }

    /// Drops the cached token only if it is still `stale`.
    ///
    /// A request that was rejected with an old token must not throw away a
    /// token another task refreshed in the meantime.
    pub async fn invalidate_if_current(&self, stale: &str) {
        let mut slot = self.slot.lock().await;
        if slot.as_ref().is_some_and(|cached| cached.value == stale) {
            *slot = None;
        }
    }

    async fn fetch_token(&self) -> Result<(String, Duration), UpstreamError> {
        tracing::debug!(auth_url = %self.auth_url, "requesting upstream access token");

        let form = [
            ("grant_type", "password"),
            ("client_id", self.credentials.client_id.as_str()),
            ("client_secret", self.credentials.client_secret.as_str()),
            ("username", self.credentials.username.as_str()),
            ("password", self.credentials.password.as_str()),
        ];
        let response = self
            .client
            .post(self.auth_url.clone())
            .form(&form)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        let parsed: Option<TokenResponse> = serde_json::from_str(&text).ok();
        let description = parsed.as_ref().and_then(|p| p.error_description.clone());

        if status == StatusCode::UNAUTHORIZED {
            return Err(UpstreamError::AuthenticationFailed {
                status: Some(status.as_u16()),
                message: description.unwrap_or_else(|| "Authentication failed".to_string()),
            });
        }
        if status != StatusCode::OK {
            return Err(UpstreamError::AuthenticationFailed {
                status: Some(status.as_u16()),
                message: description.unwrap_or_else(|| "Unknown error".to_string()),
            });
        }

        let parsed = parsed.unwrap_or(TokenResponse {
            access_token: None,
            expires_in: None,
            error_description: None,
        });
        let lifetime = parsed.expires_in_secs();
        let Some(token) = parsed.access_token.filter(|t| !t.is_empty()) else {
            return Err(UpstreamError::AuthenticationFailed {
                status: Some(status.as_u16()),
                message: "No access token in response".to_string(),
            });
        };

        let ttl = lifetime.map_or(self.ttl, |secs| self.ttl.min(Duration::from_secs(secs)));
        tracing::info!(ttl_secs = ttl.as_secs(), "obtained upstream access token");
        Ok((token, ttl))
    }
}

impl fmt::Debug for TokenCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenCache")
            .field("auth_url", &self.auth_url.as_str())
            .field("credentials", &self.credentials)
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}
