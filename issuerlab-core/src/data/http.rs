//! HTTP document fetcher.
//!
//! Resolves paths against a base URL and performs one GET per call. There is
//! no retry and no backoff: a timeout, transport error or non-success status
//! is returned to the caller on the first attempt.

use super::provider::{DocumentFetcher, FetchError, FetchedDocument};
use async_trait::async_trait;
use reqwest::Url;
use std::time::Duration;

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";

/// Fetches documents from a remote site.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    base_url: Url,
}

impl HttpFetcher {
    pub fn new(base_url: &str) -> Result<Self, FetchError> {
        let base_url = Url::parse(base_url).map_err(|e| FetchError::InvalidUrl {
            path: base_url.to_string(),
            reason: e.to_string(),
        })?;

        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| FetchError::Network {
                path: base_url.to_string(),
                reason: e.to_string(),
            })?;

        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Resolve a site-relative or absolute path against the base URL.
    pub fn resolve(&self, path: &str) -> Result<Url, FetchError> {
        self.base_url.join(path).map_err(|e| FetchError::InvalidUrl {
            path: path.to_string(),
            reason: e.to_string(),
        })
    }

    async fn get(&self, path: &str, url: Url) -> Result<FetchedDocument, FetchError> {
        let network = |e: reqwest::Error| FetchError::Network {
            path: path.to_string(),
            reason: e.to_string(),
        };

        let resp = self.client.get(url).send().await.map_err(network)?;
        let status = resp.status();
        let status_text = status.canonical_reason().unwrap_or("").to_string();

        if !status.is_success() {
            return Err(FetchError::Status {
                path: path.to_string(),
                status: status.as_u16(),
                status_text,
            });
        }

        let content = resp.text().await.map_err(network)?;

        Ok(FetchedDocument {
            path: path.to_string(),
            content,
            status: status.as_u16(),
            status_text,
        })
    }
}

#[async_trait]
impl DocumentFetcher for HttpFetcher {
    fn name(&self) -> &str {
        "http"
    }

    async fn fetch(&self, path: &str, timeout: Duration) -> Result<FetchedDocument, FetchError> {
        let url = self.resolve(path)?;
        tracing::debug!(url = %url, timeout_ms = timeout.as_millis() as u64, "fetching document");

        // Dropping the request future on timeout aborts the connection.
        match tokio::time::timeout(timeout, self.get(path, url)).await {
            Ok(result) => result,
            Err(_) => Err(FetchError::Timeout {
                path: path.to_string(),
                timeout_ms: timeout.as_millis() as u64,
            }),
        }
    }
}
