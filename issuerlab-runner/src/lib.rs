//! IssuerLab Runner: orchestration of an aggregation run.
//!
//! This crate builds on `issuerlab-core` to provide:
//! - Run configuration (TOML, with defaults)
//! - A bounded, cancellable work queue
//! - Entity extraction from a single issuer page
//! - The table builder (listing → entities → table)
//! - The layered aggregation engine with cross-table derived columns
//! - JSON / CSV export and run artifacts

pub mod aggregate;
pub mod config;
pub mod entity;
pub mod export;
pub mod queue;
pub mod table;

pub use aggregate::{apply_derived_layer, merge_views, AggregateError, AggregateReport, Aggregator};
pub use config::{AggregatorConfig, ConfigError, EntityFailurePolicy};
pub use entity::{extract_entity, extract_entity_from_html, EntityError, EntityRef};
pub use export::{
    export_report_json, export_table_csv, export_tables_json, generate_summary, save_artifacts,
    CsvValues,
};
pub use queue::{BoundedQueue, QueueError};
pub use table::{
    enumerate_listing, SkippedEntity, TableBuildError, TableBuilder, TableFailure, TableOutcome,
};
