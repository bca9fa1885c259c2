//! IssuerLab CLI: aggregate issuer tables from the exchange site.
//!
//! Commands:
//! - `fetch`: Build the requested tables and print or save them
//! - `schema`: Print the table schema and layer order

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use issuerlab_core::data::{DocumentFetcher, FixtureFetcher, HttpFetcher};
use issuerlab_core::{SchemaRegistry, TableQuery};
use issuerlab_runner::{
    export_table_csv, export_tables_json, generate_summary, save_artifacts, Aggregator,
    AggregatorConfig, CsvValues,
};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(
    name = "issuerlab",
    about = "IssuerLab CLI: per-issuer financial tables from the Macedonian Stock Exchange"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch issuer pages and build tables.
    Fetch {
        /// Path to a TOML config file.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Table to build (repeatable). Defaults to every table in the schema.
        #[arg(long = "table")]
        tables: Vec<String>,

        /// Column allow-list for one table, as TABLE=key1,key2 (repeatable).
        #[arg(long = "columns")]
        columns: Vec<String>,

        /// Process only the first N listed issuers.
        #[arg(long)]
        limit: Option<usize>,

        /// Maximum issuer pages fetched at once per table.
        #[arg(long)]
        concurrency: Option<usize>,

        /// Per-request timeout in milliseconds.
        #[arg(long)]
        timeout_ms: Option<u64>,

        /// Serve pages from a fixture directory (with index.toml) instead of the network.
        #[arg(long)]
        fixtures: Option<PathBuf>,

        /// Output format.
        #[arg(long, value_enum, default_value_t = Format::Json)]
        format: Format,

        /// Decode numeric columns in CSV output.
        #[arg(long, default_value_t = false)]
        decoded: bool,

        /// Output file (json) or directory (csv). Defaults to stdout.
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Print the table schema and layer order.
    Schema {
        /// Print JSON instead of a text listing.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    Json,
    Csv,
    Summary,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr; stdout carries the data.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Fetch {
            config,
            tables,
            columns,
            limit,
            concurrency,
            timeout_ms,
            fixtures,
            format,
            decoded,
            output,
        } => {
            let mut config = match config {
                Some(path) => AggregatorConfig::from_file(&path)?,
                None => AggregatorConfig::default(),
            };
            if limit.is_some() {
                config.entity_limit = limit;
            }
            if let Some(concurrency) = concurrency {
                config.concurrency = concurrency;
            }
            if let Some(timeout_ms) = timeout_ms {
                config.fetch_timeout_ms = timeout_ms;
            }
            config.validate()?;

            let registry = SchemaRegistry::mse();
            let queries = build_queries(&registry, &tables, &columns)?;
            let csv_values = if decoded {
                CsvValues::Decoded(config.float_parsing)
            } else {
                CsvValues::Raw
            };

            run_fetch(
                &registry,
                &config,
                &queries,
                fixtures.as_deref(),
                format,
                csv_values,
                output.as_deref(),
            )
            .await
        }
        Commands::Schema { json } => run_schema(json),
    }
}

/// Turn `--table` and `--columns` flags into queries, in flag order.
fn build_queries(
    registry: &SchemaRegistry,
    tables: &[String],
    columns: &[String],
) -> Result<Vec<TableQuery>> {
    let mut allow: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for flag in columns {
        let Some((table, keys)) = flag.split_once('=') else {
            bail!("--columns expects TABLE=key1,key2, got '{flag}'");
        };
        let keys: Vec<String> = keys
            .split(',')
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(str::to_string)
            .collect();
        if keys.is_empty() {
            bail!("--columns for table '{table}' lists no columns");
        }
        allow.entry(table.trim().to_string()).or_default().extend(keys);
    }

    let names: Vec<String> = if tables.is_empty() {
        registry.tables().iter().map(|t| t.name.clone()).collect()
    } else {
        tables.to_vec()
    };

    for table in allow.keys() {
        if !names.contains(table) {
            bail!("--columns names table '{table}', which is not being fetched");
        }
    }

    Ok(names
        .into_iter()
        .map(|name| match allow.remove(&name) {
            Some(keys) => TableQuery::with_columns(name, keys),
            None => TableQuery::all(name),
        })
        .collect())
}

async fn run_fetch(
    registry: &SchemaRegistry,
    config: &AggregatorConfig,
    queries: &[TableQuery],
    fixtures: Option<&Path>,
    format: Format,
    csv_values: CsvValues,
    output: Option<&Path>,
) -> Result<()> {
    let fetcher: Box<dyn DocumentFetcher> = match fixtures {
        Some(dir) => Box::new(
            FixtureFetcher::from_dir(dir)
                .with_context(|| format!("failed to load fixtures from {}", dir.display()))?,
        ),
        None => Box::new(HttpFetcher::new(&config.base_url)?),
    };
    tracing::info!(source = fetcher.name(), tables = queries.len(), "fetch started");

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupted, cancelling in-flight fetches");
            on_interrupt.cancel();
        }
    });

    let report = Aggregator::new(registry, config, fetcher.as_ref())
        .with_cancellation(cancel)
        .run(queries)
        .await?;

    match format {
        Format::Json => {
            let json = export_tables_json(&report.tables)?;
            match output {
                Some(path) => {
                    std::fs::write(path, json)
                        .with_context(|| format!("failed to write {}", path.display()))?;
                    println!("Tables written to: {}", path.display());
                }
                None => println!("{json}"),
            }
        }
        Format::Csv => match output {
            Some(dir) => {
                let run_dir = save_artifacts(&report, csv_values, dir)?;
                println!("Artifacts saved to: {}", run_dir.display());
            }
            None => {
                if report.tables.len() != 1 {
                    bail!("CSV to stdout needs exactly one --table; use --output DIR for several");
                }
                print!("{}", export_table_csv(&report.tables[0], csv_values)?);
            }
        },
        Format::Summary => print!("{}", generate_summary(&report)),
    }

    if !report.skipped.is_empty() {
        eprintln!("{} issuer(s) skipped", report.skipped.len());
    }

    Ok(())
}

fn run_schema(json: bool) -> Result<()> {
    let registry = SchemaRegistry::mse();
    registry.validate()?;

    if json {
        let tables: Vec<_> = registry
            .tables()
            .iter()
            .map(|t| {
                serde_json::json!({
                    "name": t.name,
                    "label": t.label,
                    "columnsDef": t.columns,
                })
            })
            .collect();
        let layers: Vec<_> = registry.layers().iter().map(|l| l.tags()).collect();
        let doc = serde_json::json!({ "tables": tables, "layers": layers });
        println!("{}", serde_json::to_string_pretty(&doc)?);
        return Ok(());
    }

    for table in registry.tables() {
        println!("{} ({})", table.name, table.label);
        for column in &table.columns {
            println!(
                "  {:<18} {:<24} {:<8} {:?}",
                column.key, column.label, column.column_type, column.source
            );
        }
        println!();
    }
    for (depth, layer) in registry.layers().iter().enumerate() {
        println!("layer {depth}: {:?}", layer.tags());
    }

    Ok(())
}
