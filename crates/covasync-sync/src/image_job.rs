//! Resumable hand-off of product images to the asset collaborator.
//!
//! Each call to [`BatchImageJob::run_batch`] processes one bounded slice of
//! the stored catalog and persists the next offset, so the job can be driven
//! by short-lived requests and a crash loses at most one batch. Submitted
//! URLs are recorded as processed keys and never sent twice until
//! [`BatchImageJob::reset`].

use std::future::Future;
use std::time::Duration;

use covasync_core::{AppConfig, SyncCheckpoint};
use covasync_upstream::asset_urls;
use reqwest::{Client, Url};
use serde::Serialize;

use crate::error::{AssetError, StoreError};
use crate::orchestrator::IMAGES_JOB;
use crate::store::{CatalogStore, CheckpointStore};

/// Asset URLs for one product, as sent to the collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssetRequest<'a> {
    pub product_id: &'a str,
    /// Downstream record the images belong to, when already published.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub downstream_id: Option<i64>,
    pub urls: &'a [String],
}

/// External image/asset collaborator. Fire-and-forget: callers log
/// failures and carry on.
pub trait AssetSink: Send + Sync {
    fn submit(
        &self,
        request: &AssetRequest<'_>,
    ) -> impl Future<Output = Result<(), AssetError>> + Send;
}

/// No collaborator configured: requests are dropped.
impl<T: AssetSink> AssetSink for Option<T> {
    async fn submit(&self, request: &AssetRequest<'_>) -> Result<(), AssetError> {
        match self {
            Some(sink) => sink.submit(request).await,
            None => {
                tracing::debug!(
                    product_id = request.product_id,
                    urls = request.urls.len(),
                    "no asset collaborator configured; dropping image request"
                );
                Ok(())
            }
        }
    }
}

/// Posts [`AssetRequest`]s as JSON to a webhook.
#[derive(Debug, Clone)]
pub struct WebhookAssetSink {
    client: Client,
    url: Url,
}

impl WebhookAssetSink {
    /// # Errors
    ///
    /// Returns [`AssetError::InvalidUrl`] if `url` does not parse, or
    /// [`AssetError::Http`] if the HTTP client cannot be built.
    pub fn new(url: &str, timeout: Duration, user_agent: &str) -> Result<Self, AssetError> {
        let parsed = Url::parse(url).map_err(|e| AssetError::InvalidUrl {
            url: url.to_owned(),
            reason: e.to_string(),
        })?;
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .user_agent(user_agent)
            .build()?;
        Ok(Self {
            client,
            url: parsed,
        })
    }

    /// Sink for `COVASYNC_ASSET_WEBHOOK_URL`, or `None` when it is unset.
    ///
    /// # Errors
    ///
    /// Same as [`WebhookAssetSink::new`].
    pub fn from_config(config: &AppConfig) -> Result<Option<Self>, AssetError> {
        config
            .asset_webhook_url
            .as_deref()
            .map(|url| {
                Self::new(
                    url,
                    Duration::from_secs(config.upstream.request_timeout_secs),
                    &config.upstream.user_agent,
                )
            })
            .transpose()
    }
}

impl AssetSink for WebhookAssetSink {
    async fn submit(&self, request: &AssetRequest<'_>) -> Result<(), AssetError> {
        let response = self
            .client
            .post(self.url.clone())
            .json(request)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(AssetError::Rejected {
                status: status.as_u16(),
            });
        }
        tracing::debug!(
            product_id = request.product_id,
            urls = request.urls.len(),
            "submitted product images"
        );
        Ok(())
    }
}

/// Progress after one batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ImageBatchProgress {
    /// Offset the next call starts from; zero once the job completed.
    pub offset: i64,
    pub total: i64,
    /// URLs handed to the collaborator in this batch.
    pub submitted: usize,
    /// URLs already processed by an earlier batch.
    pub skipped: usize,
    /// Products whose submission failed in this batch.
    pub failed: usize,
    /// Percentage of the catalog covered, 0 to 100.
    pub progress: u8,
    pub complete: bool,
}

/// Walks the stored catalog in fixed-size slices, one slice per call.
pub struct BatchImageJob<'a, S, A> {
    store: &'a S,
    sink: &'a A,
    batch_size: i64,
}

impl<'a, S, A> BatchImageJob<'a, S, A>
where
    S: CatalogStore + CheckpointStore,
    A: AssetSink,
{
    #[must_use]
    pub fn new(store: &'a S, sink: &'a A, batch_size: i64) -> Self {
        Self {
            store,
            sink,
            batch_size: batch_size.max(1),
        }
    }

    /// Processes the next slice of products and saves the new offset.
    ///
    /// When the slice reaches the end of the catalog the offset is reset to
    /// zero and the progress reports 100%.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the checkpoint or the catalog cannot be
    /// read or written. Collaborator failures are counted, not returned.
    pub async fn run_batch(&self) -> Result<ImageBatchProgress, StoreError> {
        let checkpoint = self.store.load_checkpoint(IMAGES_JOB).await?;
        let total = self.store.count_products().await?;
        let offset = checkpoint.batch_offset.clamp(0, total);

        let products = self.store.list_products(offset, self.batch_size).await?;
        let mut submitted = 0;
        let mut skipped = 0;
        let mut failed = 0;

        for product in products.iter().filter(|p| !p.is_archived) {
            let mut pending = Vec::new();
            for url in asset_urls(&product.raw) {
                if self.store.is_processed(IMAGES_JOB, &url).await? {
                    skipped += 1;
                } else {
                    pending.push(url);
                }
            }
            if pending.is_empty() {
                continue;
            }

            let request = AssetRequest {
                product_id: &product.product_id,
                downstream_id: None,
                urls: &pending,
            };
            match self.sink.submit(&request).await {
                Ok(()) => {
                    for url in &pending {
                        self.store.mark_processed(IMAGES_JOB, url).await?;
                    }
                    submitted += pending.len();
                }
                Err(e) => {
                    tracing::warn!(
                        product_id = %product.product_id,
                        error = %e,
                        "asset collaborator failed; continuing"
                    );
                    failed += 1;
                }
            }
        }

        let next = offset + self.batch_size;
        let complete = next >= total;
        let saved = SyncCheckpoint {
            last_sync_at: if complete {
                Some(chrono::Utc::now())
            } else {
                checkpoint.last_sync_at
            },
            batch_offset: if complete { 0 } else { next },
        };
        self.store.save_checkpoint(IMAGES_JOB, &saved).await?;

        let progress = if complete { 100 } else { percent(next, total) };
        tracing::info!(
            offset = saved.batch_offset,
            total,
            submitted,
            skipped,
            failed,
            progress,
            "image batch finished"
        );

        Ok(ImageBatchProgress {
            offset: saved.batch_offset,
            total,
            submitted,
            skipped,
            failed,
            progress,
            complete,
        })
    }

    /// Clears the offset and every processed URL.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the reset cannot be written.
    pub async fn reset(&self) -> Result<(), StoreError> {
        self.store.reset_checkpoint(IMAGES_JOB).await?;
        tracing::info!("image job reset");
        Ok(())
    }
}

/// `done / total` as a rounded percentage, capped at 100.
fn percent(done: i64, total: i64) -> u8 {
    if total <= 0 {
        return 100;
    }
    let rounded = (done.saturating_mul(100) + total / 2) / total;
    u8::try_from(rounded.clamp(0, 100)).unwrap_or(100)
}

#[cfg(test)]
mod tests {
    use super::percent;

    #[test]
    fn percent_rounds_to_nearest() {
        assert_eq!(percent(15, 25), 60);
        assert_eq!(percent(1, 3), 33);
        assert_eq!(percent(2, 3), 67);
    }

    #[test]
    fn percent_is_capped() {
        assert_eq!(percent(30, 25), 100);
        assert_eq!(percent(0, 0), 100);
    }
}
