//! Document extractor: reads trimmed text out of fetched HTML.
//!
//! Two addressing primitives cover every read the pipeline makes:
//! a single node by compound CSS path, and the data cells of one row within
//! a table region. Absent matches yield an empty sequence; a matched node with
//! no text yields `""`. The parsed document is never mutated.
//!
//! `Document` is not `Send`. Parse and extract between fetches, never across
//! an `.await`.

use scraper::{ElementRef, Html, Selector};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractError {
    #[error("invalid selector '{selector}': {reason}")]
    InvalidSelector { selector: String, reason: String },
}

/// An address into a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StructuralQuery {
    /// A single node; yields zero or one value (the first match).
    Node { selector: String },
    /// The cells of one row, in document order.
    Row { selector: String },
}

impl StructuralQuery {
    pub fn selector(&self) -> &str {
        match self {
            StructuralQuery::Node { selector } | StructuralQuery::Row { selector } => selector,
        }
    }
}

/// One entry of a listing: its visible text and the link it points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingLink {
    pub text: String,
    pub href: Option<String>,
}

/// A parsed HTML document.
pub struct Document {
    html: Html,
}

impl Document {
    pub fn parse(content: &str) -> Self {
        Self {
            html: Html::parse_document(content),
        }
    }

    /// Run a structural query.
    pub fn extract(&self, query: &StructuralQuery) -> Result<Vec<String>, ExtractError> {
        let selector = parse_selector(query.selector())?;
        let mut matches = self.html.select(&selector).map(element_text);

        Ok(match query {
            StructuralQuery::Node { .. } => matches.next().into_iter().collect(),
            StructuralQuery::Row { .. } => matches.collect(),
        })
    }

    /// First value of a node query, if the node exists.
    pub fn first(&self, query: &StructuralQuery) -> Result<Option<String>, ExtractError> {
        Ok(self.extract(query)?.into_iter().next())
    }

    /// Every entry matching `entries`, with the `href` of its first `link` descendant.
    pub fn links(&self, entries: &str, link: &str) -> Result<Vec<ListingLink>, ExtractError> {
        let entries = parse_selector(entries)?;
        let link = parse_selector(link)?;

        Ok(self
            .html
            .select(&entries)
            .map(|entry| ListingLink {
                text: element_text(entry),
                href: entry
                    .select(&link)
                    .next()
                    .and_then(|a| a.value().attr("href"))
                    .map(str::to_string),
            })
            .collect())
    }
}

fn parse_selector(selector: &str) -> Result<Selector, ExtractError> {
    Selector::parse(selector).map_err(|e| ExtractError::InvalidSelector {
        selector: selector.to_string(),
        reason: e.to_string(),
    })
}

fn element_text(el: ElementRef<'_>) -> String {
    el.text().collect::<String>().trim().to_string()
}
