use covasync_db::DbError;
use covasync_upstream::{NormalizeError, UpstreamError};
use thiserror::Error;

/// Failure reported by a storage backend.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Db(#[from] DbError),

    #[error("store error: {0}")]
    Other(String),
}

/// Failure reconciling a single upstream record. Never aborts a batch.
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("{kind} record has no usable key: {source}")]
    MissingKey {
        kind: &'static str,
        #[source]
        source: NormalizeError,
    },

    #[error("failed to store {kind} {key}: {source}")]
    Store {
        kind: &'static str,
        key: String,
        #[source]
        source: StoreError,
    },
}

impl ReconcileError {
    /// The record key, when one was extracted before the failure.
    #[must_use]
    pub fn key(&self) -> Option<&str> {
        match self {
            Self::MissingKey { .. } => None,
            Self::Store { key, .. } => Some(key),
        }
    }
}

/// Failure that ends a whole stage or run.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Reconcile(#[from] ReconcileError),
}

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("publishing is disabled")]
    Disabled,

    #[error("downstream is not configured: missing {0}")]
    NotConfigured(&'static str),

    #[error("invalid downstream base URL {url}: {reason}")]
    InvalidBaseUrl { url: String, reason: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("downstream {method} {endpoint} returned HTTP {status}: {message}")]
    Downstream {
        endpoint: String,
        method: String,
        status: u16,
        message: String,
    },

    #[error("invalid downstream response from {endpoint}: {reason}")]
    InvalidResponse { endpoint: String, reason: String },

    #[error("product {0} is not in the local catalog")]
    ProductNotFound(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl PublishError {
    /// `true` for a downstream 404, i.e. the linked record no longer exists.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Downstream { status: 404, .. })
    }
}

/// Failure handing asset URLs to the image collaborator. Logged, never fatal.
#[derive(Debug, Error)]
pub enum AssetError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("asset collaborator rejected the request with HTTP {status}")]
    Rejected { status: u16 },

    #[error("invalid asset webhook URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },
}
