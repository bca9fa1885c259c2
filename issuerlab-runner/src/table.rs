//! Table builder: listing page → entity references → populated table.
//!
//! The listing is validated in full before any entity page is requested: an
//! entry without a usable URL fails the table up front. Entity pages are then
//! fetched through a [`BoundedQueue`] and assembled in listing order.

use issuerlab_core::data::{Document, DocumentFetcher, ExtractError, FetchError, SelectorConfig};
use issuerlab_core::schema::{ColumnDef, SourceLayer, TableSchema};
use issuerlab_core::Table;
use serde::Serialize;
use std::collections::HashSet;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::config::{AggregatorConfig, EntityFailurePolicy};
use crate::entity::{extract_entity, EntityError, EntityRef};
use crate::queue::{BoundedQueue, QueueError};

/// A table that could not be built. Always names the table.
#[derive(Debug, Error)]
#[error("table '{table}': {cause}")]
pub struct TableBuildError {
    pub table: String,
    #[source]
    pub cause: TableFailure,
}

#[derive(Debug, Error)]
pub enum TableFailure {
    #[error("listing fetch failed: {0}")]
    ListingFetch(FetchError),

    #[error("listing selector: {0}")]
    ListingSelector(ExtractError),

    #[error("malformed listing entry {index}: {detail}")]
    MalformedListing { index: usize, detail: String },

    #[error("entity '{url}': {source}")]
    Entity {
        url: String,
        #[source]
        source: EntityError,
    },

    #[error("duplicate entity key '{key}' at '{url}'")]
    DuplicateKey { key: String, url: String },

    #[error("cancelled")]
    Cancelled,
}

/// An entity left out of its table under [`EntityFailurePolicy::SkipEntity`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedEntity {
    pub table: String,
    pub url: String,
    pub reason: String,
}

/// A built table plus whatever was skipped on the way.
#[derive(Debug)]
pub struct TableOutcome {
    pub table: Table,
    pub skipped: Vec<SkippedEntity>,
}

/// Enumerate the entity references on a listing page.
///
/// `limit` keeps only the first N entries. Every kept entry must carry a
/// non-empty link, otherwise the whole listing is rejected.
pub fn enumerate_listing(
    content: &str,
    selectors: &SelectorConfig,
    limit: Option<usize>,
) -> Result<Vec<EntityRef>, TableFailure> {
    let doc = Document::parse(content);
    let links = doc
        .links(&selectors.listing_entries, &selectors.entity_link)
        .map_err(TableFailure::ListingSelector)?;

    let keep = limit.unwrap_or(links.len());
    links
        .into_iter()
        .take(keep)
        .enumerate()
        .map(|(index, link)| match link.href {
            Some(href) if !href.trim().is_empty() => Ok(EntityRef {
                index,
                name: link.text,
                url: href.trim().to_string(),
            }),
            _ => Err(TableFailure::MalformedListing {
                index,
                detail: format!("entry '{}' has no link", link.text),
            }),
        })
        .collect()
}

/// Builds one table's raw layer from the listing and entity pages.
pub struct TableBuilder<'a> {
    fetcher: &'a dyn DocumentFetcher,
    config: &'a AggregatorConfig,
    cancel: CancellationToken,
}

impl<'a> TableBuilder<'a> {
    pub fn new(fetcher: &'a dyn DocumentFetcher, config: &'a AggregatorConfig) -> Self {
        Self {
            fetcher,
            config,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Build `schema` restricted to `columns`, resolving the sources in `layer`.
    pub async fn build(
        &self,
        schema: &TableSchema,
        columns: Vec<ColumnDef>,
        layer: &SourceLayer,
    ) -> Result<TableOutcome, TableBuildError> {
        let fail = |cause| TableBuildError {
            table: schema.name.clone(),
            cause,
        };

        let timeout = self.config.fetch_timeout();
        let listing = self
            .fetcher
            .fetch(&self.config.listing_path, timeout)
            .await
            .map_err(|e| fail(TableFailure::ListingFetch(e)))?;

        let refs = enumerate_listing(
            &listing.content,
            &self.config.selectors,
            self.config.entity_limit,
        )
        .map_err(fail)?;

        if refs.is_empty() {
            tracing::warn!(table = %schema.name, "listing has no entries");
        }
        tracing::info!(
            table = %schema.name,
            entities = refs.len(),
            concurrency = self.config.concurrency,
            "fetching entities"
        );

        let region = self.config.selectors.region_for(&schema.name);
        let queue =
            BoundedQueue::new(self.config.concurrency).with_cancellation(self.cancel.clone());
        let tasks: Vec<_> = refs
            .iter()
            .map(|entity_ref| {
                let columns = columns.as_slice();
                move || {
                    extract_entity(
                        self.fetcher,
                        self.config,
                        &entity_ref.url,
                        region,
                        columns,
                        layer,
                    )
                }
            })
            .collect();
        let outcomes = queue.run(tasks).await;

        let policy = self.config.entity_failure;
        let mut entities = Vec::with_capacity(refs.len());
        let mut skipped = Vec::new();
        let mut seen = HashSet::new();

        for (entity_ref, outcome) in refs.iter().zip(outcomes) {
            let entity = match outcome {
                Ok(entity) => entity,
                Err(QueueError::Cancelled) => return Err(fail(TableFailure::Cancelled)),
                Err(QueueError::Task(source)) => match policy {
                    EntityFailurePolicy::FailTable => {
                        return Err(fail(TableFailure::Entity {
                            url: entity_ref.url.clone(),
                            source,
                        }))
                    }
                    EntityFailurePolicy::SkipEntity => {
                        tracing::warn!(
                            table = %schema.name,
                            url = %entity_ref.url,
                            error = %source,
                            "skipping entity"
                        );
                        skipped.push(SkippedEntity {
                            table: schema.name.clone(),
                            url: entity_ref.url.clone(),
                            reason: source.to_string(),
                        });
                        continue;
                    }
                },
            };

            if !seen.insert(entity.key.clone()) {
                match policy {
                    EntityFailurePolicy::FailTable => {
                        return Err(fail(TableFailure::DuplicateKey {
                            key: entity.key,
                            url: entity_ref.url.clone(),
                        }))
                    }
                    EntityFailurePolicy::SkipEntity => {
                        tracing::warn!(
                            table = %schema.name,
                            key = %entity.key,
                            url = %entity_ref.url,
                            "skipping duplicate entity key"
                        );
                        skipped.push(SkippedEntity {
                            table: schema.name.clone(),
                            url: entity_ref.url.clone(),
                            reason: format!("duplicate entity key '{}'", entity.key),
                        });
                        continue;
                    }
                }
            }

            entities.push(entity);
        }

        tracing::info!(
            table = %schema.name,
            entities = entities.len(),
            skipped = skipped.len(),
            "table built"
        );

        Ok(TableOutcome {
            table: Table {
                name: schema.name.clone(),
                label: schema.label.clone(),
                columns,
                entities,
            },
            skipped,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use issuerlab_core::data::FixtureFetcher;
    use issuerlab_core::schema::{default_layers, SchemaRegistry};

    const LISTING: &str = "/en/issuers/shares-listing";

    fn listing(entries: &[(&str, Option<&str>)]) -> String {
        let rows: String = entries
            .iter()
            .map(|(name, href)| match href {
                Some(href) => format!("<tr><td>1</td><td><a href=\"{href}\">{name}</a></td></tr>"),
                None => format!("<tr><td>1</td><td>{name}</td></tr>"),
            })
            .collect();
        format!(
            "<table id=\"exchange-table\"><thead><tr><th>#</th><th>Issuer</th></tr></thead>\
             <tbody>{rows}</tbody></table>"
        )
    }

    fn issuer(ticker: &str, roe: &str) -> String {
        format!(
            "<ul id=\"symbols\"><li><a href=\"#\">{ticker}</a></li></ul>\
             <table id=\"financialRatios\"><tbody>\
             <tr><td>ROS</td><td class=\"td-right\">1.0</td></tr>\
             <tr><td>NPS</td><td class=\"td-right\">2.0</td></tr>\
             <tr><td>ROA</td><td class=\"td-right\">3.0</td></tr>\
             <tr><td>ROE</td><td class=\"td-right\">{roe}</td><td class=\"td-right\">0.1</td></tr>\
             </tbody></table>"
        )
    }

    fn ratios() -> TableSchema {
        SchemaRegistry::mse().table("ratios").unwrap().clone()
    }

    fn raw_layer() -> SourceLayer {
        default_layers().remove(0)
    }

    #[test]
    fn listing_entries_become_refs_in_order() {
        let html = listing(&[("Alkaloid", Some("/en/symbol/ALK")), ("Komercijalna", Some("/en/symbol/KMB"))]);
        let refs = enumerate_listing(&html, &SelectorConfig::default(), None).unwrap();

        assert_eq!(refs.len(), 2);
        assert_eq!(refs[0].url, "/en/symbol/ALK");
        assert_eq!(refs[0].name, "Alkaloid");
        assert_eq!(refs[1].index, 1);
    }

    #[test]
    fn listing_limit_keeps_the_head() {
        let html = listing(&[("A", Some("/a")), ("B", Some("/b")), ("C", None)]);
        let refs = enumerate_listing(&html, &SelectorConfig::default(), Some(2)).unwrap();
        assert_eq!(refs.iter().map(|r| r.url.as_str()).collect::<Vec<_>>(), vec!["/a", "/b"]);
    }

    #[test]
    fn entry_without_link_rejects_the_listing() {
        let html = listing(&[("A", Some("/a")), ("B", None)]);
        let err = enumerate_listing(&html, &SelectorConfig::default(), None).unwrap_err();
        assert!(matches!(err, TableFailure::MalformedListing { index: 1, .. }));

        let html = listing(&[("A", Some("  "))]);
        let err = enumerate_listing(&html, &SelectorConfig::default(), None).unwrap_err();
        assert!(matches!(err, TableFailure::MalformedListing { index: 0, .. }));
    }

    #[tokio::test]
    async fn builds_table_in_listing_order() {
        let fetcher = FixtureFetcher::new()
            .with_page(LISTING, listing(&[("B", Some("/b")), ("A", Some("/a"))]))
            .with_page("/b", issuer("BBB", "12.5"))
            .with_page("/a", issuer("AAA", "7.0"));
        let config = AggregatorConfig {
            concurrency: 2,
            ..AggregatorConfig::default()
        };
        let schema = ratios();

        let outcome = TableBuilder::new(&fetcher, &config)
            .build(&schema, schema.columns.clone(), &raw_layer())
            .await
            .unwrap();

        let keys: Vec<_> = outcome.table.entities.iter().map(|e| e.key.as_str()).collect();
        assert_eq!(keys, vec!["BBB", "AAA"]);
        assert_eq!(outcome.table.entity("BBB").unwrap().get("returnOnEquity"), Some("12.5"));
        assert_eq!(outcome.table.label, "Ratios");
        assert!(outcome.skipped.is_empty());
    }

    #[tokio::test]
    async fn malformed_listing_fetches_no_entity() {
        let fetcher = FixtureFetcher::new()
            .with_page(
                LISTING,
                listing(&[("A", Some("/a")), ("B", Some("")), ("C", Some("/c"))]),
            )
            .with_page("/a", issuer("AAA", "1"))
            .with_page("/c", issuer("CCC", "3"));
        let config = AggregatorConfig::default();
        let schema = ratios();

        let err = TableBuilder::new(&fetcher, &config)
            .build(&schema, schema.columns.clone(), &raw_layer())
            .await
            .unwrap_err();

        assert_eq!(err.table, "ratios");
        assert!(matches!(err.cause, TableFailure::MalformedListing { index: 1, .. }));
        assert_eq!(fetcher.requested_paths(), vec![LISTING]);
        assert_eq!(fetcher.request_count(), 1);
    }

    #[tokio::test]
    async fn listing_failure_names_the_table() {
        let fetcher = FixtureFetcher::new().with_status(LISTING, 503);
        let config = AggregatorConfig::default();
        let schema = ratios();

        let err = TableBuilder::new(&fetcher, &config)
            .build(&schema, schema.columns.clone(), &raw_layer())
            .await
            .unwrap_err();

        assert!(err.to_string().starts_with("table 'ratios': listing fetch failed"));
    }

    #[tokio::test]
    async fn failing_entity_fails_the_table_by_default() {
        let fetcher = FixtureFetcher::new()
            .with_page(LISTING, listing(&[("A", Some("/a")), ("B", Some("/b"))]))
            .with_page("/a", issuer("AAA", "1"))
            .with_status("/b", 500);
        let config = AggregatorConfig::default();
        let schema = ratios();

        let err = TableBuilder::new(&fetcher, &config)
            .build(&schema, schema.columns.clone(), &raw_layer())
            .await
            .unwrap_err();

        match err.cause {
            TableFailure::Entity { url, source } => {
                assert_eq!(url, "/b");
                assert!(matches!(source, EntityError::Fetch(FetchError::Status { status: 500, .. })));
            }
            other => panic!("unexpected failure: {other:?}"),
        }
    }

    #[tokio::test]
    async fn skip_policy_keeps_the_rest() {
        let fetcher = FixtureFetcher::new()
            .with_page(LISTING, listing(&[("A", Some("/a")), ("B", Some("/b")), ("C", Some("/c"))]))
            .with_page("/a", issuer("AAA", "1"))
            .with_page("/b", "<html><body>maintenance</body></html>")
            .with_page("/c", issuer("CCC", "3"));
        let config = AggregatorConfig {
            entity_failure: EntityFailurePolicy::SkipEntity,
            ..AggregatorConfig::default()
        };
        let schema = ratios();

        let outcome = TableBuilder::new(&fetcher, &config)
            .build(&schema, schema.columns.clone(), &raw_layer())
            .await
            .unwrap();

        let keys: Vec<_> = outcome.table.entities.iter().map(|e| e.key.as_str()).collect();
        assert_eq!(keys, vec!["AAA", "CCC"]);
        assert_eq!(outcome.skipped.len(), 1);
        assert_eq!(outcome.skipped[0].url, "/b");
        assert_eq!(outcome.skipped[0].table, "ratios");
    }

    #[tokio::test]
    async fn duplicate_keys_fail_or_skip_per_policy() {
        let fetcher = FixtureFetcher::new()
            .with_page(LISTING, listing(&[("A", Some("/a")), ("A again", Some("/a2"))]))
            .with_page("/a", issuer("AAA", "1"))
            .with_page("/a2", issuer("AAA", "2"));
        let schema = ratios();

        let config = AggregatorConfig::default();
        let err = TableBuilder::new(&fetcher, &config)
            .build(&schema, schema.columns.clone(), &raw_layer())
            .await
            .unwrap_err();
        assert!(matches!(err.cause, TableFailure::DuplicateKey { ref key, .. } if key == "AAA"));

        let config = AggregatorConfig {
            entity_failure: EntityFailurePolicy::SkipEntity,
            ..AggregatorConfig::default()
        };
        let outcome = TableBuilder::new(&fetcher, &config)
            .build(&schema, schema.columns.clone(), &raw_layer())
            .await
            .unwrap();
        assert_eq!(outcome.table.entities.len(), 1);
        assert_eq!(outcome.table.entities[0].get("returnOnEquity"), Some("1"));
        assert_eq!(outcome.skipped[0].url, "/a2");
    }

    #[tokio::test]
    async fn entity_limit_bounds_fetches() {
        let fetcher = FixtureFetcher::new()
            .with_page(LISTING, listing(&[("A", Some("/a")), ("B", Some("/b")), ("C", Some("/c"))]))
            .with_page("/a", issuer("AAA", "1"))
            .with_page("/b", issuer("BBB", "2"))
            .with_page("/c", issuer("CCC", "3"));
        let config = AggregatorConfig {
            entity_limit: Some(1),
            ..AggregatorConfig::default()
        };
        let schema = ratios();

        let outcome = TableBuilder::new(&fetcher, &config)
            .build(&schema, schema.columns.clone(), &raw_layer())
            .await
            .unwrap();

        assert_eq!(outcome.table.entities.len(), 1);
        assert_eq!(fetcher.request_count(), 2);
    }

    #[tokio::test]
    async fn cancelled_build_reports_cancellation() {
        let fetcher = FixtureFetcher::new()
            .with_page(LISTING, listing(&[("A", Some("/a"))]))
            .with_page("/a", issuer("AAA", "1"));
        let config = AggregatorConfig::default();
        let schema = ratios();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = TableBuilder::new(&fetcher, &config)
            .with_cancellation(cancel)
            .build(&schema, schema.columns.clone(), &raw_layer())
            .await
            .unwrap_err();

        assert!(matches!(err.cause, TableFailure::Cancelled));
        assert_eq!(fetcher.requested_paths(), vec![LISTING]);
    }
}
