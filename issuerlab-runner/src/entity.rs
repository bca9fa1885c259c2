//! Entity extraction pipeline: one entity page in, one `Entity` out.
//!
//! Fetches the entity's document, reads its ticker first (an entity without
//! a key cannot be joined later and must not enter the dataset), then reads
//! every column whose source kind belongs to the current layer. Values are
//! stored as the raw trimmed strings; decoding happens on read.

use issuerlab_core::data::{Document, DocumentFetcher, ExtractError, FetchError, SelectorConfig};
use issuerlab_core::schema::{ColumnDef, SourceKind, SourceLayer};
use issuerlab_core::Entity;
use thiserror::Error;

use crate::config::AggregatorConfig;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EntityError {
    #[error("{0}")]
    Fetch(#[from] FetchError),

    #[error("malformed entity page '{url}': {detail}")]
    Malformed { url: String, detail: String },

    #[error("extraction failed: {0}")]
    Extract(#[from] ExtractError),
}

/// A listing entry: where the entity's page lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityRef {
    /// Position in the listing, 0-based.
    pub index: usize,
    /// Visible listing text (usually the issuer name).
    pub name: String,
    pub url: String,
}

/// Fetch one entity page and extract the columns resolved by `layer`.
pub async fn extract_entity(
    fetcher: &dyn DocumentFetcher,
    config: &AggregatorConfig,
    url: &str,
    region: &str,
    columns: &[ColumnDef],
    layer: &SourceLayer,
) -> Result<Entity, EntityError> {
    let doc = fetcher.fetch(url, config.fetch_timeout()).await?;
    extract_entity_from_html(&doc.content, &config.selectors, url, region, columns, layer)
}

/// Extract an entity from already-fetched HTML.
pub fn extract_entity_from_html(
    content: &str,
    selectors: &SelectorConfig,
    url: &str,
    region: &str,
    columns: &[ColumnDef],
    layer: &SourceLayer,
) -> Result<Entity, EntityError> {
    let doc = Document::parse(content);

    let ticker = doc.first(&selectors.ticker_query())?.unwrap_or_default();
    if ticker.is_empty() {
        return Err(EntityError::Malformed {
            url: url.to_string(),
            detail: format!("no ticker at '{}'", selectors.ticker),
        });
    }

    let mut entity = Entity::new(ticker);

    for column in columns {
        if !layer.contains(column.source.tag()) {
            continue;
        }

        let value = match column.source {
            // Static columns resolve from the identity; derived ones run in a later layer.
            SourceKind::Static | SourceKind::Derived { .. } => None,
            SourceKind::LatestPeriod { row } => doc
                .extract(&selectors.period_row(region, row))?
                .into_iter()
                .next(),
            SourceKind::LatestSnapshot { row } => doc.first(&selectors.snapshot(row))?,
        };

        if let Some(value) = value {
            entity.insert(column.key.as_str(), value);
        }
    }

    tracing::debug!(
        ticker = %entity.ticker,
        url = %url,
        fields = entity.fields().len(),
        "extracted entity"
    );

    Ok(entity)
}
