//! Offset pagination over the upstream's skip/top endpoints.
//!
//! The upstream does not report totals or cursors. A page shorter than the
//! requested batch size is the only end-of-data signal, so the paginator
//! keeps requesting `skip = n * batch` until one comes back short.
//!
//! Batches are yielded one at a time. Callers persist [`Batch::next_offset`]
//! after processing each batch and restart with
//! [`Paginator::starting_at`] after a crash.

use std::fmt;

use chrono::{DateTime, Utc};
use futures::Stream;
use serde_json::Value;

use crate::client::{format_updated_since, UpstreamClient};
use crate::error::UpstreamError;

/// Upper bound on pages per traversal. Guards against an upstream that keeps
/// returning full pages forever.
pub const MAX_PAGES: usize = 2_000;

/// Paged upstream collections.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resource {
    Catalog,
    CatalogUpdatedSince(DateTime<Utc>),
    Prices,
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Catalog => write!(f, "catalog"),
            Self::CatalogUpdatedSince(since) => {
                write!(f, "catalog updated since {}", format_updated_since(*since))
            }
            Self::Prices => write!(f, "prices"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    /// Skip value this batch was requested with.
    pub offset: u64,
    pub records: Vec<Value>,
    /// Offset to resume from once this batch has been processed.
    pub next_offset: u64,
    /// `true` when this batch was short and no further request will be made.
    pub is_last: bool,
}

pub struct Paginator<'a> {
    client: &'a UpstreamClient,
    resource: Resource,
    batch_size: u32,
    offset: u64,
    pages: usize,
    done: bool,
}

impl<'a> Paginator<'a> {
    #[must_use]
    pub fn new(client: &'a UpstreamClient, resource: Resource, batch_size: u32) -> Self {
        Self {
            client,
            resource,
            batch_size: batch_size.max(1),
            offset: 0,
            pages: 0,
            done: false,
        }
    }

    /// Resume from a previously persisted offset.
    #[must_use]
    pub fn starting_at(mut self, offset: u64) -> Self {
        self.offset = offset;
        self
    }

    /// Offset of the next request.
    #[must_use]
    pub fn offset(&self) -> u64 {
        self.offset
    }

    #[must_use]
    pub fn resource(&self) -> &Resource {
        &self.resource
    }

    /// Fetches the next batch, or `None` once the collection is exhausted.
    ///
    /// An empty page ends the traversal without yielding a batch. After an
    /// error the paginator is finished; restart it from the last persisted
    /// offset.
    ///
    /// # Errors
    ///
    /// - [`UpstreamError::PaginationLimit`] after [`MAX_PAGES`] requests.
    /// - Any error from the underlying page fetch.
    pub async fn next_batch(&mut self) -> Result<Option<Batch>, UpstreamError> {
        if self.done {
            return Ok(None);
        }

        if self.pages >= MAX_PAGES {
            self.done = true;
            return Err(UpstreamError::PaginationLimit {
                resource: self.resource.to_string(),
                max_pages: MAX_PAGES,
            });
        }
        self.pages += 1;

        let offset = self.offset;
        let records = match self.fetch_page(offset).await {
            Ok(records) => records,
            Err(e) => {
                self.done = true;
                return Err(e);
            }
        };

        if records.is_empty() {
            self.done = true;
            return Ok(None);
        }

        let is_last = records.len() < self.batch_size as usize;
        self.offset = offset + u64::from(self.batch_size);
        self.done = is_last;

        tracing::debug!(
            resource = %self.resource,
            offset,
            count = records.len(),
            is_last,
            "fetched upstream page"
        );

        Ok(Some(Batch {
            offset,
            records,
            next_offset: self.offset,
            is_last,
        }))
    }

    /// Consumes the paginator into a stream of batches.
    pub fn into_stream(self) -> impl Stream<Item = Result<Batch, UpstreamError>> + 'a {
        futures::stream::try_unfold(self, |mut pager| async move {
            let batch = pager.next_batch().await?;
            Ok(batch.map(|batch| (batch, pager)))
        })
    }

    async fn fetch_page(&self, offset: u64) -> Result<Vec<Value>, UpstreamError> {
        match &self.resource {
            Resource::Catalog => {
                self.client
                    .fetch_catalog_page(None, offset, self.batch_size)
                    .await
            }
            Resource::CatalogUpdatedSince(since) => {
                self.client
                    .fetch_catalog_page(Some(*since), offset, self.batch_size)
                    .await
            }
            Resource::Prices => self.client.fetch_price_page(offset, self.batch_size).await,
        }
    }
}

impl UpstreamClient {
    /// Starts a paged traversal of `resource` from offset zero.
    #[must_use]
    pub fn fetch_all(&self, resource: Resource, batch_size: u32) -> Paginator<'_> {
        Paginator::new(self, resource, batch_size)
    }
}
