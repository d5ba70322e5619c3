use thiserror::Error;

#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Token acquisition failed, or a freshly issued token was rejected.
    #[error("authentication failed{}: {message}", status.map(|s| format!(" (HTTP {s})")).unwrap_or_default())]
    AuthenticationFailed {
        status: Option<u16>,
        message: String,
    },

    /// The upstream answered with a status of 400 or above.
    #[error("{method} {endpoint} failed with HTTP {status}: {message}")]
    RequestFailed {
        endpoint: String,
        method: String,
        /// Serialized request body, when one was sent.
        body: Option<String>,
        status: u16,
        message: String,
    },

    /// A successful status carried a body that could not be used.
    #[error("invalid response from {endpoint}: {reason}")]
    InvalidResponse { endpoint: String, reason: String },

    #[error("pagination limit reached for {resource}: exceeded {max_pages} pages")]
    PaginationLimit { resource: String, max_pages: usize },

    #[error("invalid base URL \"{url}\": {reason}")]
    InvalidBaseUrl { url: String, reason: String },

    #[error("{operation} requires a configured location id")]
    MissingLocation { operation: &'static str },
}

impl UpstreamError {
    /// HTTP status carried by the error, if any.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http(e) => e.status().map(|s| s.as_u16()),
            Self::AuthenticationFailed { status, .. } => *status,
            Self::RequestFailed { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// A single upstream record that could not be normalized.
///
/// Record-level: callers log it, count it, and move on to the next record.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum NormalizeError {
    #[error("{kind} record is missing {field}")]
    MissingField {
        kind: &'static str,
        field: &'static str,
    },

    #[error("{kind} record is not a JSON object")]
    NotAnObject { kind: &'static str },
}
