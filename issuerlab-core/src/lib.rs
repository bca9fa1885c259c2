//! IssuerLab Core: schema, codec, document fetch and extraction primitives.
//!
//! This crate holds the leaf components of the aggregation pipeline:
//! - Schema registry (tables, columns, source kinds, layer order)
//! - Value codec (raw string → float / percent / string)
//! - Document fetcher trait with HTTP and fixture sources
//! - Document extractor over parsed HTML
//! - Derived-column computations over the merged per-entity view
//!
//! Orchestration (work queue, table builder, layered aggregation) lives in
//! `issuerlab-runner`.

pub mod codec;
pub mod data;
pub mod derived;
pub mod domain;
pub mod schema;

pub use codec::{ColumnType, CodecError, FloatParsing, Value};
pub use domain::{Entity, MergedView, Table, TableQuery};
pub use schema::{
    ColumnDef, SchemaError, SchemaRegistry, SourceKind, SourceLayer, SourceTag, TableSchema,
};
