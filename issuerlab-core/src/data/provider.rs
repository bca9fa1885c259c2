//! Document fetcher trait and structured fetch errors.
//!
//! The `DocumentFetcher` trait abstracts over document sources (the live site
//! over HTTP, saved fixture pages) so the pipeline can be driven offline and
//! mocked in tests. Every fetch is a single attempt; callers decide whether a
//! failure is fatal.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// A successfully fetched document.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedDocument {
    pub path: String,
    pub content: String,
    pub status: u16,
    pub status_text: String,
}

/// Why a single fetch failed.
///
/// These are designed to be displayable in CLI output and logs as-is.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("request for '{path}' timed out after {timeout_ms}ms")]
    Timeout { path: String, timeout_ms: u64 },

    #[error("network error fetching '{path}': {reason}")]
    Network { path: String, reason: String },

    #[error("'{path}' returned HTTP {status} {status_text}")]
    Status {
        path: String,
        status: u16,
        status_text: String,
    },

    #[error("invalid document URL '{path}': {reason}")]
    InvalidUrl { path: String, reason: String },
}

impl FetchError {
    /// The path or URL the failed request was for.
    pub fn path(&self) -> &str {
        match self {
            FetchError::Timeout { path, .. }
            | FetchError::Network { path, .. }
            | FetchError::Status { path, .. }
            | FetchError::InvalidUrl { path, .. } => path,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, FetchError::Timeout { .. })
    }
}

/// Trait for document sources.
///
/// `path` is either site-relative (`/en/symbol/ALK`) or absolute; resolution
/// against a base URL is the implementation's concern. The timeout covers the
/// whole request including the body; when it elapses the in-flight request is
/// dropped and [`FetchError::Timeout`] is returned.
#[async_trait]
pub trait DocumentFetcher: Send + Sync {
    /// Human-readable name of this source.
    fn name(&self) -> &str;

    /// Fetch one document. Non-success statuses are errors.
    async fn fetch(&self, path: &str, timeout: Duration) -> Result<FetchedDocument, FetchError>;
}

/// Status text for the statuses fixtures and tests commonly produce.
pub fn reason_phrase(status: u16) -> &'static str {
    match status {
        200 => "OK",
        301 => "Moved Permanently",
        302 => "Found",
        400 => "Bad Request",
        403 => "Forbidden",
        404 => "Not Found",
        429 => "Too Many Requests",
        500 => "Internal Server Error",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        504 => "Gateway Timeout",
        _ => "",
    }
}
