//! Layered aggregation engine.
//!
//! Runs the registry's source layers in order. The first layer builds every
//! requested table independently and in parallel; each later layer starts
//! only after all tables have finished the previous one, joins them into one
//! merged view per entity key, and writes the layer's derived columns back
//! into each table.

use chrono::{DateTime, Utc};
use futures::future::try_join_all;
use issuerlab_core::data::DocumentFetcher;
use issuerlab_core::codec::FloatParsing;
use issuerlab_core::schema::{SourceKind, SourceLayer, SourceTag};
use issuerlab_core::{MergedView, SchemaError, SchemaRegistry, Table, TableQuery};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::time::Instant;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::config::{AggregatorConfig, ConfigError};
use crate::table::{SkippedEntity, TableBuildError, TableBuilder};

#[derive(Debug, Error)]
pub enum AggregateError {
    #[error("schema error: {0}")]
    Schema(#[from] SchemaError),

    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("table '{0}' requested more than once")]
    DuplicateQuery(String),

    #[error(transparent)]
    Table(#[from] TableBuildError),
}

/// Result of a full run: the tables plus run metadata.
#[derive(Debug, Serialize)]
pub struct AggregateReport {
    pub tables: Vec<Table>,
    pub skipped: Vec<SkippedEntity>,
    pub started_at: DateTime<Utc>,
    pub elapsed_ms: u64,
}

/// Drives one aggregation run over a registry, a config and a fetcher.
pub struct Aggregator<'a> {
    registry: &'a SchemaRegistry,
    config: &'a AggregatorConfig,
    fetcher: &'a dyn DocumentFetcher,
    cancel: CancellationToken,
}

impl<'a> Aggregator<'a> {
    pub fn new(
        registry: &'a SchemaRegistry,
        config: &'a AggregatorConfig,
        fetcher: &'a dyn DocumentFetcher,
    ) -> Self {
        Self {
            registry,
            config,
            fetcher,
            cancel: CancellationToken::new(),
        }
    }

    /// Share a cancellation token with the caller (e.g. a Ctrl-C handler).
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Build the requested tables, in request order.
    ///
    /// Any table failure fails the whole call.
    pub async fn aggregate(&self, queries: &[TableQuery]) -> Result<Vec<Table>, AggregateError> {
        Ok(self.run(queries).await?.tables)
    }

    /// Like [`aggregate`](Self::aggregate), keeping skipped entities and timing.
    pub async fn run(&self, queries: &[TableQuery]) -> Result<AggregateReport, AggregateError> {
        self.config.validate()?;
        self.registry.validate()?;

        let started_at = Utc::now();
        let clock = Instant::now();

        let mut seen = HashSet::new();
        let mut plans = Vec::with_capacity(queries.len());
        for query in queries {
            if !seen.insert(query.name.as_str()) {
                return Err(AggregateError::DuplicateQuery(query.name.clone()));
            }
            let schema = self.registry.table(&query.name)?;
            plans.push((schema, schema.filter_columns(query.columns.as_ref())));
        }

        let mut layers = self.registry.layers().iter();
        let first = layers.next().ok_or(SchemaError::NoLayers)?;

        tracing::info!(tables = plans.len(), "aggregation started");

        let builder =
            TableBuilder::new(self.fetcher, self.config).with_cancellation(self.cancel.clone());
        let outcomes = try_join_all(
            plans
                .into_iter()
                .map(|(schema, columns)| builder.build(schema, columns, first)),
        )
        .await?;

        let mut tables = Vec::with_capacity(outcomes.len());
        let mut skipped = Vec::new();
        for outcome in outcomes {
            tables.push(outcome.table);
            skipped.extend(outcome.skipped);
        }

        for (depth, layer) in layers.enumerate() {
            let written = apply_derived_layer(&mut tables, layer, self.config.float_parsing);
            tracing::debug!(layer = depth + 1, written, "layer applied");
        }

        let elapsed_ms = clock.elapsed().as_millis() as u64;
        tracing::info!(
            tables = tables.len(),
            skipped = skipped.len(),
            elapsed_ms,
            "aggregation finished"
        );

        Ok(AggregateReport {
            tables,
            skipped,
            started_at,
            elapsed_ms,
        })
    }
}

/// Join every table on entity key: one view per key holding all tables' fields.
///
/// Every view decodes FLOAT fields with `float_parsing`.
pub fn merge_views(tables: &[Table], float_parsing: FloatParsing) -> HashMap<String, MergedView> {
    let mut views: HashMap<String, MergedView> = HashMap::new();
    for table in tables {
        for entity in &table.entities {
            views
                .entry(entity.key.clone())
                .or_insert_with(|| {
                    MergedView::new(entity.key.as_str()).with_float_parsing(float_parsing)
                })
                .absorb(&table.name, entity);
        }
    }
    views
}

/// Compute the derived columns `layer` resolves and write them into `tables`.
///
/// Views are taken before any write, so a derived column never sees another
/// derived column of the same layer. Existing fields are left untouched.
/// Returns how many values were written.
pub fn apply_derived_layer(
    tables: &mut [Table],
    layer: &SourceLayer,
    float_parsing: FloatParsing,
) -> usize {
    if !layer.contains(SourceTag::Derived) {
        return 0;
    }

    let views = merge_views(tables, float_parsing);
    let mut written = 0;

    for table in tables.iter_mut() {
        let derived: Vec<_> = table
            .columns
            .iter()
            .filter_map(|column| match column.source {
                SourceKind::Derived { compute } => Some((column.key.clone(), compute)),
                _ => None,
            })
            .collect();

        for (key, compute) in &derived {
            for entity in table.entities.iter_mut() {
                let Some(view) = views.get(&entity.key) else {
                    continue;
                };
                if entity.insert(key.as_str(), compute(view)) {
                    written += 1;
                } else {
                    tracing::warn!(
                        table = %table.name,
                        entity = %entity.key,
                        column = %key,
                        "derived value not written: field already set"
                    );
                }
            }
        }
    }

    written
}
