//! Selector configuration: where values live in the site's markup.
//!
//! The literal selectors are a configuration detail: defaults target the
//! Macedonian Stock Exchange pages, and every field can be overridden from
//! the `[selectors]` section of the run configuration.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use super::extract::StructuralQuery;

/// Placeholder for the table region inside [`SelectorConfig::row_cells`].
pub const REGION_PLACEHOLDER: &str = "{region}";
/// Placeholder for the 1-based row number inside row templates.
pub const ROW_PLACEHOLDER: &str = "{row}";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SelectorError {
    #[error("selector '{0}' is empty")]
    Empty(&'static str),

    #[error("selector '{selector}' must contain {placeholder}")]
    MissingPlaceholder {
        selector: &'static str,
        placeholder: &'static str,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectorConfig {
    /// One match per listed entity on the listing page.
    pub listing_entries: String,
    /// Link inside a listing entry that points at the entity page.
    pub entity_link: String,
    /// Node holding the entity's ticker on its own page.
    pub ticker: String,
    /// Region used for tables without an entry in `regions`.
    pub default_region: String,
    /// Data cells of one row within a region; uses `{region}` and `{row}`.
    pub row_cells: String,
    /// Single snapshot value; uses `{row}`.
    pub snapshot_node: String,
    /// Historical table region per table name.
    pub regions: BTreeMap<String, String>,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        let mut regions = BTreeMap::new();
        regions.insert("financials".to_string(), "#financialData".to_string());
        regions.insert("ratios".to_string(), "#financialRatios".to_string());

        Self {
            listing_entries: "#exchange-table > tbody:nth-child(2) > tr > td:nth-child(2)".into(),
            entity_link: "a".into(),
            ticker: "#symbols > li:nth-child(1) > a:nth-child(1)".into(),
            default_region: "#financialRatios".into(),
            row_cells: "{region} tbody tr:nth-child({row}) td.td-right".into(),
            snapshot_node: "#symbol-data > div:nth-child({row}) > div:nth-child(2)".into(),
            regions,
        }
    }
}

impl SelectorConfig {
    /// Region selector for a table, falling back to the default region.
    pub fn region_for(&self, table: &str) -> &str {
        self.regions
            .get(table)
            .map(String::as_str)
            .unwrap_or(&self.default_region)
    }

    /// Query for the cells of `row` in `region`.
    pub fn period_row(&self, region: &str, row: usize) -> StructuralQuery {
        StructuralQuery::Row {
            selector: self
                .row_cells
                .replace(REGION_PLACEHOLDER, region)
                .replace(ROW_PLACEHOLDER, &row.to_string()),
        }
    }

    /// Query for the snapshot value in `row`.
    pub fn snapshot(&self, row: usize) -> StructuralQuery {
        StructuralQuery::Node {
            selector: self.snapshot_node.replace(ROW_PLACEHOLDER, &row.to_string()),
        }
    }

    pub fn ticker_query(&self) -> StructuralQuery {
        StructuralQuery::Node {
            selector: self.ticker.clone(),
        }
    }

    /// Check templates carry their placeholders and nothing is blank.
    pub fn validate(&self) -> Result<(), SelectorError> {
        let required = [
            ("listing_entries", &self.listing_entries),
            ("entity_link", &self.entity_link),
            ("ticker", &self.ticker),
            ("default_region", &self.default_region),
        ];
        for (name, value) in required {
            if value.trim().is_empty() {
                return Err(SelectorError::Empty(name));
            }
        }

        let templates = [
            ("row_cells", &self.row_cells, REGION_PLACEHOLDER),
            ("row_cells", &self.row_cells, ROW_PLACEHOLDER),
            ("snapshot_node", &self.snapshot_node, ROW_PLACEHOLDER),
        ];
        for (selector, value, placeholder) in templates {
            if !value.contains(placeholder) {
                return Err(SelectorError::MissingPlaceholder {
                    selector,
                    placeholder,
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert_eq!(SelectorConfig::default().validate(), Ok(()));
    }

    #[test]
    fn region_falls_back_to_default() {
        let selectors = SelectorConfig::default();
        assert_eq!(selectors.region_for("financials"), "#financialData");
        assert_eq!(selectors.region_for("dividends"), "#financialRatios");
    }

    #[test]
    fn templates_expand() {
        let selectors = SelectorConfig::default();
        assert_eq!(
            selectors.period_row("#financialData", 3),
            StructuralQuery::Row {
                selector: "#financialData tbody tr:nth-child(3) td.td-right".into()
            }
        );
        assert_eq!(
            selectors.snapshot(7),
            StructuralQuery::Node {
                selector: "#symbol-data > div:nth-child(7) > div:nth-child(2)".into()
            }
        );
    }

    #[test]
    fn missing_placeholder_is_rejected() {
        let selectors = SelectorConfig {
            row_cells: "{region} tr td".into(),
            ..SelectorConfig::default()
        };
        assert_eq!(
            selectors.validate(),
            Err(SelectorError::MissingPlaceholder {
                selector: "row_cells",
                placeholder: ROW_PLACEHOLDER,
            })
        );

        let selectors = SelectorConfig {
            snapshot_node: "#symbol-data".into(),
            ..SelectorConfig::default()
        };
        assert!(matches!(
            selectors.validate(),
            Err(SelectorError::MissingPlaceholder { selector: "snapshot_node", .. })
        ));
    }

    #[test]
    fn blank_selector_is_rejected() {
        let selectors = SelectorConfig {
            ticker: "  ".into(),
            ..SelectorConfig::default()
        };
        assert_eq!(selectors.validate(), Err(SelectorError::Empty("ticker")));
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let selectors: SelectorConfig = toml::from_str("ticker = \"h1.symbol\"").unwrap();
        assert_eq!(selectors.ticker, "h1.symbol");
        assert_eq!(selectors.default_region, "#financialRatios");
    }
}
