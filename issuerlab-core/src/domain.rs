//! Domain types produced by an aggregation run: entities, tables, queries,
//! and the merged per-entity view read by derived columns.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::codec::FloatParsing;
use crate::schema::ColumnDef;

/// Field names reserved for the entity identity.
pub const IDENTITY_FIELDS: [&str; 2] = ["key", "ticker"];

/// One tracked issuer: identity plus raw string fields keyed by column.
///
/// The field set only grows. [`Entity::insert`] refuses to overwrite an
/// existing field or an identity field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub key: String,
    pub ticker: String,
    #[serde(flatten)]
    fields: BTreeMap<String, String>,
}

impl Entity {
    /// Create an entity keyed by its ticker symbol.
    pub fn new(ticker: impl Into<String>) -> Self {
        let ticker = ticker.into();
        Self {
            key: ticker.clone(),
            ticker,
            fields: BTreeMap::new(),
        }
    }

    /// Read a field, including the identity fields.
    pub fn get(&self, column: &str) -> Option<&str> {
        match column {
            "key" => Some(&self.key),
            "ticker" => Some(&self.ticker),
            other => self.fields.get(other).map(String::as_str),
        }
    }

    /// Add a field. Returns `false` when the field already exists.
    pub fn insert(&mut self, column: impl Into<String>, value: impl Into<String>) -> bool {
        let column = column.into();
        if IDENTITY_FIELDS.contains(&column.as_str()) || self.fields.contains_key(&column) {
            return false;
        }
        self.fields.insert(column, value.into());
        true
    }

    pub fn contains(&self, column: &str) -> bool {
        self.get(column).is_some()
    }

    /// Non-identity fields in key order.
    pub fn fields(&self) -> &BTreeMap<String, String> {
        &self.fields
    }
}

/// A populated table, serialized in the shape the presentation layer reads.
#[derive(Debug, Clone, Serialize)]
pub struct Table {
    pub name: String,
    pub label: String,
    #[serde(rename = "columnsDef")]
    pub columns: Vec<ColumnDef>,
    #[serde(rename = "issuers")]
    pub entities: Vec<Entity>,
}

impl Table {
    pub fn entity(&self, key: &str) -> Option<&Entity> {
        self.entities.iter().find(|e| e.key == key)
    }

    pub fn column(&self, key: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.key == key)
    }
}

/// A request for one table, optionally restricted to an allow-list of columns.
///
/// Only keys mapped to `true` are kept. Identity columns survive filtering
/// whether or not they are listed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableQuery {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub columns: Option<BTreeMap<String, bool>>,
}

impl TableQuery {
    pub fn all(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: None,
        }
    }

    pub fn with_columns<I, S>(name: impl Into<String>, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            columns: Some(columns.into_iter().map(|c| (c.into(), true)).collect()),
        }
    }
}

/// Everything known about one entity key, across every table in the run.
///
/// Built by joining all tables on the entity key before a derived layer runs.
/// Carries the run's FLOAT rules so derived columns decode stored strings the
/// same way exports do.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergedView {
    key: String,
    float_parsing: FloatParsing,
    tables: BTreeMap<String, BTreeMap<String, String>>,
}

impl MergedView {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            float_parsing: FloatParsing::default(),
            tables: BTreeMap::new(),
        }
    }

    pub fn with_float_parsing(mut self, float_parsing: FloatParsing) -> Self {
        self.float_parsing = float_parsing;
        self
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn float_parsing(&self) -> FloatParsing {
        self.float_parsing
    }

    /// Copy an entity's identity and fields in under `table`.
    pub fn absorb(&mut self, table: &str, entity: &Entity) {
        let row = self.tables.entry(table.to_string()).or_default();
        row.insert("key".into(), entity.key.clone());
        row.insert("ticker".into(), entity.ticker.clone());
        for (column, value) in entity.fields() {
            row.insert(column.clone(), value.clone());
        }
    }

    /// A field from a specific table.
    pub fn get(&self, table: &str, column: &str) -> Option<&str> {
        self.tables
            .get(table)
            .and_then(|row| row.get(column))
            .map(String::as_str)
    }

    /// A field from whichever table holds it first (tables in name order).
    pub fn find(&self, column: &str) -> Option<&str> {
        self.tables
            .values()
            .find_map(|row| row.get(column))
            .map(String::as_str)
    }

    pub fn tables(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(String::as_str)
    }
}
