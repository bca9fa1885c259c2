//! Fixture document source: serves saved pages from memory.
//!
//! Backs offline runs (`issuerlab fetch --fixtures DIR`) and tests. Every
//! request is recorded so callers can assert which documents were fetched.
//! Pages can carry a non-success status or an artificial delay; a delay
//! longer than the request timeout surfaces as a timeout.

use super::provider::{reason_phrase, DocumentFetcher, FetchError, FetchedDocument};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone)]
struct FixturePage {
    status: u16,
    body: String,
    delay: Option<Duration>,
}

#[derive(Debug, Error)]
pub enum FixtureError {
    #[error("read fixture '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parse fixture index '{path}': {reason}")]
    Index { path: PathBuf, reason: String },
}

/// `index.toml` inside a fixture directory: `[pages]` maps a request path to
/// a file name relative to the directory.
#[derive(Debug, Deserialize)]
struct FixtureIndex {
    pages: BTreeMap<String, String>,
}

/// In-memory document source.
#[derive(Debug, Default)]
pub struct FixtureFetcher {
    pages: HashMap<String, FixturePage>,
    requests: Mutex<Vec<String>>,
}

impl FixtureFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `body` with status 200 for `path`.
    pub fn with_page(mut self, path: &str, body: impl Into<String>) -> Self {
        self.pages.insert(
            path.to_string(),
            FixturePage {
                status: 200,
                body: body.into(),
                delay: None,
            },
        );
        self
    }

    /// Answer `path` with `status` and an empty body.
    pub fn with_status(mut self, path: &str, status: u16) -> Self {
        let page = self.pages.entry(path.to_string()).or_insert(FixturePage {
            status,
            body: String::new(),
            delay: None,
        });
        page.status = status;
        self
    }

    /// Delay the response for `path`.
    pub fn with_delay(mut self, path: &str, delay: Duration) -> Self {
        let page = self.pages.entry(path.to_string()).or_insert(FixturePage {
            status: 200,
            body: String::new(),
            delay: None,
        });
        page.delay = Some(delay);
        self
    }

    /// Load a fixture directory described by its `index.toml`.
    pub fn from_dir(dir: &Path) -> Result<Self, FixtureError> {
        let index_path = dir.join("index.toml");
        let index_src = std::fs::read_to_string(&index_path).map_err(|source| FixtureError::Io {
            path: index_path.clone(),
            source,
        })?;
        let index: FixtureIndex =
            toml::from_str(&index_src).map_err(|e| FixtureError::Index {
                path: index_path.clone(),
                reason: e.to_string(),
            })?;

        let mut fetcher = Self::new();
        for (request_path, file) in index.pages {
            let file_path = dir.join(&file);
            let body = std::fs::read_to_string(&file_path).map_err(|source| FixtureError::Io {
                path: file_path.clone(),
                source,
            })?;
            fetcher = fetcher.with_page(&request_path, body);
        }
        Ok(fetcher)
    }

    /// Every requested path, in request order.
    pub fn requested_paths(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

#[async_trait]
impl DocumentFetcher for FixtureFetcher {
    fn name(&self) -> &str {
        "fixture"
    }

    async fn fetch(&self, path: &str, timeout: Duration) -> Result<FetchedDocument, FetchError> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(path.to_string());

        let Some(page) = self.pages.get(path) else {
            return Err(FetchError::Status {
                path: path.to_string(),
                status: 404,
                status_text: reason_phrase(404).to_string(),
            });
        };

        if let Some(delay) = page.delay {
            if delay > timeout {
                tokio::time::sleep(timeout).await;
                return Err(FetchError::Timeout {
                    path: path.to_string(),
                    timeout_ms: timeout.as_millis() as u64,
                });
            }
            tokio::time::sleep(delay).await;
        }

        if !(200..300).contains(&page.status) {
            return Err(FetchError::Status {
                path: path.to_string(),
                status: page.status,
                status_text: reason_phrase(page.status).to_string(),
            });
        }

        Ok(FetchedDocument {
            path: path.to_string(),
            content: page.body.clone(),
            status: page.status,
            status_text: reason_phrase(page.status).to_string(),
        })
    }
}
