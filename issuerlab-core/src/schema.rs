//! Column schema registry: the contract between extraction and presentation.
//!
//! Defines every table, its ordered columns, where each column's value comes
//! from, and the global layer order in which source kinds are resolved.
//! Built once at startup and shared read-only across every task of a run.

use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use thiserror::Error;

use crate::codec::ColumnType;
use crate::derived;
use crate::domain::{MergedView, IDENTITY_FIELDS};

/// Pure computation for a derived column: merged view in, raw string out.
pub type DerivedFn = fn(&MergedView) -> String;

/// Where a column's value comes from.
#[derive(Clone, Copy)]
pub enum SourceKind {
    /// Supplied without fetching; resolves from the entity identity.
    Static,
    /// Most recent value of a historical row series (1-based row).
    LatestPeriod { row: usize },
    /// A single current value from the snapshot block (1-based row).
    LatestSnapshot { row: usize },
    /// Computed from other columns once earlier layers have run.
    Derived { compute: DerivedFn },
}

impl SourceKind {
    pub fn tag(&self) -> SourceTag {
        match self {
            SourceKind::Static => SourceTag::Static,
            SourceKind::LatestPeriod { .. } => SourceTag::LatestPeriod,
            SourceKind::LatestSnapshot { .. } => SourceTag::LatestSnapshot,
            SourceKind::Derived { .. } => SourceTag::Derived,
        }
    }
}

impl fmt::Debug for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceKind::Static => f.write_str("Static"),
            SourceKind::LatestPeriod { row } => {
                f.debug_struct("LatestPeriod").field("row", row).finish()
            }
            SourceKind::LatestSnapshot { row } => {
                f.debug_struct("LatestSnapshot").field("row", row).finish()
            }
            SourceKind::Derived { .. } => f.write_str("Derived(<fn>)"),
        }
    }
}

/// Payload-free discriminant of [`SourceKind`], used for layer membership.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SourceTag {
    Static,
    LatestPeriod,
    LatestSnapshot,
    Derived,
}

/// A group of source kinds resolved together before the next layer starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLayer(Vec<SourceTag>);

impl SourceLayer {
    pub fn new(tags: impl Into<Vec<SourceTag>>) -> Self {
        Self(tags.into())
    }

    pub fn contains(&self, tag: SourceTag) -> bool {
        self.0.contains(&tag)
    }

    pub fn tags(&self) -> &[SourceTag] {
        &self.0
    }
}

/// One column of a table.
#[derive(Debug, Clone)]
pub struct ColumnDef {
    pub label: String,
    pub key: String,
    pub column_type: ColumnType,
    pub source: SourceKind,
}

impl ColumnDef {
    pub fn identity(label: &str, key: &str) -> Self {
        Self::new(label, key, ColumnType::String, SourceKind::Static)
    }

    pub fn period(label: &str, key: &str, column_type: ColumnType, row: usize) -> Self {
        Self::new(label, key, column_type, SourceKind::LatestPeriod { row })
    }

    pub fn snapshot(label: &str, key: &str, column_type: ColumnType, row: usize) -> Self {
        Self::new(label, key, column_type, SourceKind::LatestSnapshot { row })
    }

    pub fn derived(label: &str, key: &str, column_type: ColumnType, compute: DerivedFn) -> Self {
        Self::new(label, key, column_type, SourceKind::Derived { compute })
    }

    fn new(label: &str, key: &str, column_type: ColumnType, source: SourceKind) -> Self {
        Self {
            label: label.to_string(),
            key: key.to_string(),
            column_type,
            source,
        }
    }

    pub fn is_identity(&self) -> bool {
        matches!(self.source, SourceKind::Static)
    }

    /// Extraction index as exposed to clients: the row for row-addressed
    /// sources, 0 for static and -1 for derived columns.
    pub fn idx(&self) -> i64 {
        match self.source {
            SourceKind::Static => 0,
            SourceKind::LatestPeriod { row } | SourceKind::LatestSnapshot { row } => row as i64,
            SourceKind::Derived { .. } => -1,
        }
    }
}

impl Serialize for ColumnDef {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("ColumnDef", 5)?;
        s.serialize_field("label", &self.label)?;
        s.serialize_field("key", &self.key)?;
        s.serialize_field("type", &self.column_type)?;
        s.serialize_field("source", &self.source.tag())?;
        s.serialize_field("idx", &self.idx())?;
        s.end()
    }
}

/// A table's static definition.
#[derive(Debug, Clone)]
pub struct TableSchema {
    pub name: String,
    pub label: String,
    pub columns: Vec<ColumnDef>,
}

impl TableSchema {
    pub fn new(name: &str, label: &str, columns: Vec<ColumnDef>) -> Self {
        Self {
            name: name.to_string(),
            label: label.to_string(),
            columns,
        }
    }

    /// Restrict the columns to an allow-list, keeping declaration order.
    ///
    /// `None` keeps every column. Identity columns are always kept so the
    /// result stays joinable by entity key.
    pub fn filter_columns(&self, allow: Option<&BTreeMap<String, bool>>) -> Vec<ColumnDef> {
        match allow {
            None => self.columns.clone(),
            Some(allow) => self
                .columns
                .iter()
                .filter(|c| c.is_identity() || allow.get(&c.key).copied().unwrap_or(false))
                .cloned()
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    #[error("unknown table: {0}")]
    UnknownTable(String),

    #[error("table '{table}' declares column '{key}' more than once")]
    DuplicateColumn { table: String, key: String },

    #[error("table '{0}' has no identity column")]
    MissingIdentity(String),

    #[error("table '{table}': column key '{key}' is reserved for the entity identity")]
    ReservedKey { table: String, key: String },

    #[error("table '{table}': column '{key}' has row index 0 (rows are 1-based)")]
    ZeroRow { table: String, key: String },

    #[error("no source layers declared")]
    NoLayers,

    #[error("derived columns cannot be resolved in the first layer")]
    DerivedInFirstLayer,

    #[error("source kind {0:?} is extracted and must be resolved in the first layer")]
    ExtractedAfterFirstLayer(SourceTag),

    #[error("source kind {0:?} is used by a column but never resolved by any layer")]
    UnresolvedSource(SourceTag),
}

/// All tables plus the global layer order.
#[derive(Debug, Clone)]
pub struct SchemaRegistry {
    tables: Vec<TableSchema>,
    layers: Vec<SourceLayer>,
}

impl SchemaRegistry {
    pub fn new(tables: Vec<TableSchema>, layers: Vec<SourceLayer>) -> Self {
        Self { tables, layers }
    }

    /// The Macedonian Stock Exchange schema: yearly financials and ratios.
    pub fn mse() -> Self {
        use ColumnType::{Float, Percent};

        let financials = TableSchema::new(
            "financials",
            "Financials",
            vec![
                ColumnDef::identity("Ticker", "ticker"),
                ColumnDef::snapshot("Price", "price", Float, 7),
                ColumnDef::derived("Indicator", "indicator", Float, derived::indicator),
                ColumnDef::period("Total Revenue", "totalRevenue", Float, 1),
                ColumnDef::period("Operating Profit", "operatingProfit", Float, 2),
                ColumnDef::period("Net Profit", "netProfit", Float, 3),
                ColumnDef::period("Equity", "equity", Float, 4),
                ColumnDef::period("Total Liabilities", "totalLiabilities", Float, 5),
                ColumnDef::period("Total Assets", "totalAssets", Float, 6),
                ColumnDef::period("Market Cap", "marketCap", Float, 7),
            ],
        );

        let ratios = TableSchema::new(
            "ratios",
            "Ratios",
            vec![
                ColumnDef::identity("Ticker", "ticker"),
                ColumnDef::period("Return On Sales", "returnOnSales", Percent, 1),
                ColumnDef::period("Net Profit Per Share", "netPerShare", Float, 2),
                ColumnDef::period("Return On Assets", "returnOnAssets", Percent, 3),
                ColumnDef::period("Return On Equity", "returnOnEquity", Percent, 4),
                ColumnDef::period("Price To Earnings", "priceToEarnings", Float, 5),
                ColumnDef::period("Book Value Per Share", "bookValPerShare", Float, 6),
                ColumnDef::period("Price To Book Value", "priceToBookVal", Float, 7),
                ColumnDef::period("Dividend Per Share", "dividendPerShare", Float, 8),
                ColumnDef::period("Dividend Yield", "dividendYield", Percent, 9),
            ],
        );

        Self::new(vec![financials, ratios], default_layers())
    }

    pub fn table(&self, name: &str) -> Result<&TableSchema, SchemaError> {
        self.tables
            .iter()
            .find(|t| t.name == name)
            .ok_or_else(|| SchemaError::UnknownTable(name.to_string()))
    }

    pub fn tables(&self) -> &[TableSchema] {
        &self.tables
    }

    pub fn layers(&self) -> &[SourceLayer] {
        &self.layers
    }

    /// Check the structural rules every run relies on.
    pub fn validate(&self) -> Result<(), SchemaError> {
        let first = self.layers.first().ok_or(SchemaError::NoLayers)?;
        if first.contains(SourceTag::Derived) {
            return Err(SchemaError::DerivedInFirstLayer);
        }

        // Later layers only compute; nothing fetched is read after layer 0.
        for layer in &self.layers[1..] {
            if let Some(tag) = layer.tags().iter().find(|t| **t != SourceTag::Derived) {
                return Err(SchemaError::ExtractedAfterFirstLayer(*tag));
            }
        }

        for table in &self.tables {
            if !table.columns.iter().any(ColumnDef::is_identity) {
                return Err(SchemaError::MissingIdentity(table.name.clone()));
            }

            let mut seen = HashSet::new();
            for column in &table.columns {
                if !seen.insert(column.key.as_str()) {
                    return Err(SchemaError::DuplicateColumn {
                        table: table.name.clone(),
                        key: column.key.clone(),
                    });
                }
                if !column.is_identity() && IDENTITY_FIELDS.contains(&column.key.as_str()) {
                    return Err(SchemaError::ReservedKey {
                        table: table.name.clone(),
                        key: column.key.clone(),
                    });
                }
                if column.idx() == 0 && !column.is_identity() {
                    return Err(SchemaError::ZeroRow {
                        table: table.name.clone(),
                        key: column.key.clone(),
                    });
                }
                let tag = column.source.tag();
                if !self.layers.iter().any(|layer| layer.contains(tag)) {
                    return Err(SchemaError::UnresolvedSource(tag));
                }
            }
        }

        Ok(())
    }
}

/// Raw extraction first, then one derived layer.
pub fn default_layers() -> Vec<SourceLayer> {
    vec![
        SourceLayer::new([
            SourceTag::Static,
            SourceTag::LatestPeriod,
            SourceTag::LatestSnapshot,
        ]),
        SourceLayer::new([SourceTag::Derived]),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn allow(keys: &[&str]) -> BTreeMap<String, bool> {
        keys.iter().map(|k| (k.to_string(), true)).collect()
    }

    #[test]
    fn mse_registry_is_valid() {
        let registry = SchemaRegistry::mse();
        assert_eq!(registry.validate(), Ok(()));
        assert_eq!(registry.tables().len(), 2);
        assert_eq!(registry.table("ratios").unwrap().label, "Ratios");
    }

    #[test]
    fn unknown_table_is_reported() {
        let registry = SchemaRegistry::mse();
        assert_eq!(
            registry.table("dividends").unwrap_err(),
            SchemaError::UnknownTable("dividends".into())
        );
    }

    #[test]
    fn filter_keeps_identity_column() {
        let registry = SchemaRegistry::mse();
        let ratios = registry.table("ratios").unwrap();
        let kept = ratios.filter_columns(Some(&allow(&["returnOnEquity"])));
        let keys: Vec<_> = kept.iter().map(|c| c.key.as_str()).collect();
        assert_eq!(keys, vec!["ticker", "returnOnEquity"]);
    }

    #[test]
    fn filter_honours_false_entries_and_order() {
        let registry = SchemaRegistry::mse();
        let fin = registry.table("financials").unwrap();
        let mut allow_list = allow(&["marketCap", "price"]);
        allow_list.insert("equity".into(), false);
        let kept = fin.filter_columns(Some(&allow_list));
        let keys: Vec<_> = kept.iter().map(|c| c.key.as_str()).collect();
        assert_eq!(keys, vec!["ticker", "price", "marketCap"]);
    }

    #[test]
    fn no_filter_keeps_everything() {
        let registry = SchemaRegistry::mse();
        let fin = registry.table("financials").unwrap();
        assert_eq!(fin.filter_columns(None).len(), fin.columns.len());
    }

    #[test]
    fn column_def_serializes_client_shape() {
        let col = ColumnDef::period("Total Revenue", "totalRevenue", ColumnType::Float, 1);
        let json = serde_json::to_value(&col).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "label": "Total Revenue",
                "key": "totalRevenue",
                "type": "float",
                "source": "LATEST_PERIOD",
                "idx": 1
            })
        );

        let derived = ColumnDef::derived("Indicator", "indicator", ColumnType::Float, |_| {
            String::new()
        });
        assert_eq!(serde_json::to_value(&derived).unwrap()["idx"], -1);
        assert_eq!(serde_json::to_value(&derived).unwrap()["source"], "DERIVED");
    }

    #[test]
    fn derived_in_first_layer_is_rejected() {
        let registry = SchemaRegistry::new(
            vec![],
            vec![SourceLayer::new([SourceTag::Static, SourceTag::Derived])],
        );
        assert_eq!(registry.validate(), Err(SchemaError::DerivedInFirstLayer));
    }

    #[test]
    fn duplicate_and_reserved_keys_are_rejected() {
        let dup = SchemaRegistry::new(
            vec![TableSchema::new(
                "t",
                "T",
                vec![
                    ColumnDef::identity("Ticker", "ticker"),
                    ColumnDef::period("A", "a", ColumnType::Float, 1),
                    ColumnDef::period("A again", "a", ColumnType::Float, 2),
                ],
            )],
            default_layers(),
        );
        assert!(matches!(
            dup.validate(),
            Err(SchemaError::DuplicateColumn { .. })
        ));

        let reserved = SchemaRegistry::new(
            vec![TableSchema::new(
                "t",
                "T",
                vec![
                    ColumnDef::identity("Ticker", "ticker"),
                    ColumnDef::period("Key", "key", ColumnType::String, 1),
                ],
            )],
            default_layers(),
        );
        assert!(matches!(
            reserved.validate(),
            Err(SchemaError::ReservedKey { .. })
        ));
    }

    #[test]
    fn unresolved_source_is_rejected() {
        let registry = SchemaRegistry::new(
            vec![TableSchema::new(
                "t",
                "T",
                vec![
                    ColumnDef::identity("Ticker", "ticker"),
                    ColumnDef::snapshot("Price", "price", ColumnType::Float, 7),
                ],
            )],
            vec![SourceLayer::new([SourceTag::Static, SourceTag::LatestPeriod])],
        );
        assert_eq!(
            registry.validate(),
            Err(SchemaError::UnresolvedSource(SourceTag::LatestSnapshot))
        );
    }

    #[test]
    fn extracted_kind_in_later_layer_is_rejected() {
        let registry = SchemaRegistry::new(
            vec![TableSchema::new(
                "t",
                "T",
                vec![
                    ColumnDef::identity("Ticker", "ticker"),
                    ColumnDef::snapshot("Price", "price", ColumnType::Float, 7),
                ],
            )],
            vec![
                SourceLayer::new([SourceTag::Static, SourceTag::LatestPeriod]),
                SourceLayer::new([SourceTag::LatestSnapshot, SourceTag::Derived]),
            ],
        );
        assert_eq!(
            registry.validate(),
            Err(SchemaError::ExtractedAfterFirstLayer(SourceTag::LatestSnapshot))
        );
    }

    #[test]
    fn table_without_identity_is_rejected() {
        let registry = SchemaRegistry::new(
            vec![TableSchema::new(
                "t",
                "T",
                vec![ColumnDef::period("A", "a", ColumnType::Float, 1)],
            )],
            default_layers(),
        );
        assert_eq!(
            registry.validate(),
            Err(SchemaError::MissingIdentity("t".into()))
        );
    }
}
