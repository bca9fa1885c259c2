//! Export: JSON, CSV, and a Markdown run summary.
//!
//! JSON keeps the shape the presentation layer reads (`columnsDef`,
//! `issuers`, raw string values). CSV writes one table per file, either raw
//! or with FLOAT/PERCENT columns decoded to plain numbers.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use issuerlab_core::codec::{decode_with, ColumnType, FloatParsing, Value};
use issuerlab_core::Table;

use crate::aggregate::AggregateReport;

// ─── JSON export ────────────────────────────────────────────────────

/// Serialize the tables to pretty JSON.
pub fn export_tables_json(tables: &[Table]) -> Result<String> {
    serde_json::to_string_pretty(tables).context("failed to serialize tables to JSON")
}

/// Serialize a full run report (tables, skipped entities, timing).
pub fn export_report_json(report: &AggregateReport) -> Result<String> {
    serde_json::to_string_pretty(report).context("failed to serialize report to JSON")
}

// ─── CSV export ─────────────────────────────────────────────────────

/// How cell values are written to CSV.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CsvValues {
    /// Stored strings, unchanged.
    Raw,
    /// Numeric columns decoded; cells that fail to decode stay raw.
    Decoded(FloatParsing),
}

/// Export one table as CSV: a header of column labels, one row per entity.
///
/// Absent fields are written as empty cells.
pub fn export_table_csv(table: &Table, values: CsvValues) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);

    wtr.write_record(table.columns.iter().map(|c| c.label.as_str()))?;

    for entity in &table.entities {
        let row: Vec<String> = table
            .columns
            .iter()
            .map(|column| {
                let raw = entity.get(&column.key).unwrap_or_default();
                match values {
                    CsvValues::Raw => raw.to_string(),
                    CsvValues::Decoded(parsing) => render_decoded(raw, column.column_type, parsing),
                }
            })
            .collect();
        wtr.write_record(&row)?;
    }

    let bytes = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(bytes).context("CSV output is not valid UTF-8")
}

fn render_decoded(raw: &str, column_type: ColumnType, parsing: FloatParsing) -> String {
    if column_type == ColumnType::String || raw.is_empty() {
        return raw.to_string();
    }
    match decode_with(raw, column_type, parsing) {
        Ok(Value::Number(n)) => n.to_string(),
        Ok(Value::Text(s)) => s,
        Err(_) => raw.to_string(),
    }
}

// ─── Artifacts ──────────────────────────────────────────────────────

/// Write a run's artifacts into a timestamped directory under `output_dir`.
///
/// Layout: `report.json`, `tables.json`, and `<table>.csv` per table.
pub fn save_artifacts(
    report: &AggregateReport,
    values: CsvValues,
    output_dir: &Path,
) -> Result<PathBuf> {
    let dirname = format!("run_{}", report.started_at.format("%Y%m%d_%H%M%S"));
    let run_dir = output_dir.join(dirname);
    std::fs::create_dir_all(&run_dir)
        .with_context(|| format!("failed to create artifact dir: {}", run_dir.display()))?;

    std::fs::write(run_dir.join("report.json"), export_report_json(report)?)?;
    std::fs::write(run_dir.join("tables.json"), export_tables_json(&report.tables)?)?;

    for table in &report.tables {
        let path = run_dir.join(format!("{}.csv", table.name));
        std::fs::write(&path, export_table_csv(table, values)?)
            .with_context(|| format!("failed to write {}", path.display()))?;
    }

    Ok(run_dir)
}

// ─── Summary ────────────────────────────────────────────────────────

/// Short Markdown summary of a run.
pub fn generate_summary(report: &AggregateReport) -> String {
    let mut md = String::new();

    let _ = writeln!(md, "# Aggregation run");
    let _ = writeln!(md);
    let _ = writeln!(
        md,
        "Started {} · {} ms",
        report.started_at.format("%Y-%m-%d %H:%M:%S UTC"),
        report.elapsed_ms
    );
    let _ = writeln!(md);
    let _ = writeln!(md, "| Table | Label | Columns | Issuers |");
    let _ = writeln!(md, "|-------|-------|---------|---------|");
    for table in &report.tables {
        let _ = writeln!(
            md,
            "| {} | {} | {} | {} |",
            table.name,
            table.label,
            table.columns.len(),
            table.entities.len()
        );
    }

    if !report.skipped.is_empty() {
        let _ = writeln!(md);
        let _ = writeln!(md, "## Skipped");
        let _ = writeln!(md);
        for skipped in &report.skipped {
            let _ = writeln!(md, "- `{}` {}: {}", skipped.table, skipped.url, skipped.reason);
        }
    }

    md
}
