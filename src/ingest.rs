//! CSV ingestion: persist the uploaded file, parse it into a `RowSet`, and
//! land it in the store.
//!
//! The first line of the file is the header. Header names that are
//! serializer index artifacts (the `Unnamed:` family emitted for an
//! unlabeled index, or a blank header cell) are dropped before the schema
//! is reconciled and never stored. Cells are kept as text; empty cells
//! become NULL.

use std::fs;

use anyhow::{bail, Context, Result};
use csv::ReaderBuilder;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use crate::config::ServerConfig;
use crate::storage::{RowSet, Store};

/// Column names produced by tabular serializers for an unlabeled index
/// rather than by the data itself.
static UNNAMED_ARTIFACT: Lazy<Regex> = Lazy::new(|| Regex::new("^Unnamed").unwrap());

/// Outcome of one successful ingestion.
#[derive(Debug, Clone)]
pub struct IngestReport {
    pub rows_appended: usize,
    pub columns: Vec<String>,
}

/// Persist the uploaded bytes under the configured upload directory and
/// ingest the saved file: parse, drop artifact columns, reconcile the
/// table's schema, append every row on a single per-request connection.
///
/// The client-supplied file name becomes the on-disk name verbatim. There
/// is no rollback: a store failure partway leaves already-appended rows and
/// already-added columns in place.
pub fn ingest_upload(
    config: &ServerConfig,
    store: &Store,
    file_name: &str,
    bytes: &[u8],
) -> Result<IngestReport> {
    let path = config.upload_path(file_name);
    fs::write(&path, bytes).with_context(|| format!("saving upload to {}", path.display()))?;

    let raw = fs::read(&path).with_context(|| format!("reading back {}", path.display()))?;
    let rowset = parse_csv(&raw)?;

    let conn = store.connect()?;
    store.ensure_columns(&conn, &rowset.columns)?;
    let rows_appended = store.append_rows(&conn, &rowset)?;
    debug!(
        target: "csvserve::ingest",
        "ingested '{}': {} rows across {} columns",
        file_name, rows_appended, rowset.columns.len()
    );
    Ok(IngestReport { rows_appended, columns: rowset.columns })
}

/// Parse delimited text into a `RowSet`. The first record is the header;
/// every data record must match its field count exactly.
pub fn parse_csv(bytes: &[u8]) -> Result<RowSet> {
    let mut rdr = ReaderBuilder::new().has_headers(true).from_reader(bytes);

    let headers = rdr.headers().context("reading CSV header")?.clone();
    if headers.is_empty() {
        bail!("no columns to parse from file");
    }

    // Positions of real data columns; artifact columns are skipped entirely.
    let mut keep: Vec<usize> = Vec::new();
    let mut columns: Vec<String> = Vec::new();
    for (idx, name) in headers.iter().enumerate() {
        if name.trim().is_empty() || UNNAMED_ARTIFACT.is_match(name) {
            continue;
        }
        keep.push(idx);
        columns.push(name.to_string());
    }

    let mut rows: Vec<Vec<Option<String>>> = Vec::new();
    for record in rdr.records() {
        let record = record.context("reading CSV record")?;
        let mut row = Vec::with_capacity(keep.len());
        for &idx in &keep {
            row.push(match record.get(idx) {
                Some(cell) if !cell.is_empty() => Some(cell.to_string()),
                _ => None,
            });
        }
        rows.push(row);
    }

    Ok(RowSet { columns, rows })
}
