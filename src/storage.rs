//!
//! csvserve storage module
//! -----------------------
//! SQLite-backed store for the single `uploaded_data` table. The table is
//! created once with an auto-incrementing `id` column and widened in place:
//! every distinct column name seen across uploads becomes a nullable TEXT
//! column, appended after the columns that came before it. Columns are never
//! dropped or retyped, and rows are never updated or deleted here.
//!
//! Key responsibilities:
//! - Idempotent creation of the base table at startup.
//! - Schema reconciliation against an incoming column-name sequence.
//! - Row appends with cell values bound as parameters.
//! - Verbatim execution of caller-supplied SQL via `UncheckedSql`.
//!
//! Connection discipline is one `Connection` per request: the `Store` handle
//! only carries the database path and every operation opens and drops its
//! own connection (or receives one the caller opened for the request).
//!
//! Column names from uploads and the whole `UncheckedSql` string reach the
//! store without escaping or validation; callers own those strings end to
//! end.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use base64::Engine as _;
use rusqlite::types::ValueRef;
use rusqlite::Connection;
use serde_json::{json, Value};
use tracing::debug;

/// Name of the one persistent table every upload lands in.
pub const UPLOADED_TABLE: &str = "uploaded_data";

/// Handle on the SQLite store backing `uploaded_data`.
///
/// Cloneable and cheap; holds only the database path. Connections are opened
/// per operation and never pooled or held across requests.
#[derive(Clone)]
pub struct Store {
    db_path: PathBuf,
}

/// A single declared column, in table declaration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDef {
    pub name: String,
    pub decl_type: String,
}

/// Ordered snapshot of a table's declared columns, as reported by
/// `PRAGMA table_info`. The identity column comes first; uploaded columns
/// follow in first-seen order.
#[derive(Debug, Clone, Default)]
pub struct TableSchema {
    pub columns: Vec<ColumnDef>,
}

impl TableSchema {
    pub fn contains(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.name == name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }
}

/// Parsed form of one uploaded file: named columns plus row-major text
/// cells. `None` cells land as NULL.
#[derive(Debug, Clone, Default)]
pub struct RowSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Option<String>>>,
}

/// Caller-supplied SQL executed exactly as given.
///
/// The wrapper makes the one place arbitrary strings reach the store
/// explicit in signatures; there is no escaping, parameterization, or
/// statement-type restriction behind it.
#[derive(Debug, Clone, Copy)]
pub struct UncheckedSql<'a>(pub &'a str);

impl Store {
    /// Create a handle for the database file at the given path. The file is
    /// created lazily on first connection.
    pub fn new<P: AsRef<Path>>(db_path: P) -> Self {
        Self { db_path: db_path.as_ref().to_path_buf() }
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// Open a fresh connection to the store.
    pub fn connect(&self) -> Result<Connection> {
        Connection::open(&self.db_path)
            .with_context(|| format!("opening sqlite database at {}", self.db_path.display()))
    }

    /// Ensure `uploaded_data` exists with its identity column. Safe to run
    /// on every startup; an existing table keeps all columns and rows.
    pub fn initialize(&self) -> Result<()> {
        let conn = self.connect()?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS uploaded_data (id INTEGER PRIMARY KEY AUTOINCREMENT)",
            [],
        )
        .context("creating uploaded_data table")?;
        debug!(target: "csvserve::storage", "initialize: uploaded_data ready at '{}'", self.db_path.display());
        Ok(())
    }

    /// Read the current declared columns of `uploaded_data`, in order.
    pub fn table_schema(&self, conn: &Connection) -> Result<TableSchema> {
        let mut stmt = conn
            .prepare(&format!("PRAGMA table_info({UPLOADED_TABLE})"))
            .context("preparing table_info pragma")?;
        let columns = stmt
            .query_map([], |row| {
                Ok(ColumnDef { name: row.get(1)?, decl_type: row.get(2)? })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("reading table_info rows")?;
        Ok(TableSchema { columns })
    }

    /// Add every candidate name missing from `uploaded_data` as a nullable
    /// TEXT column, in the order given. Returns how many columns were added.
    ///
    /// The existence check re-reads the schema before each add, so a name
    /// repeated within one call is only added once. Candidate names are
    /// interpolated into the ALTER statement verbatim; a name the store
    /// cannot accept as an identifier fails the call with the store's error.
    pub fn ensure_columns<S: AsRef<str>>(&self, conn: &Connection, candidates: &[S]) -> Result<usize> {
        let mut added = 0usize;
        for candidate in candidates {
            let name = candidate.as_ref();
            let schema = self.table_schema(conn)?;
            if schema.contains(name) {
                continue;
            }
            conn.execute(&format!("ALTER TABLE {UPLOADED_TABLE} ADD COLUMN {name} TEXT"), [])
                .with_context(|| format!("adding column {name} to {UPLOADED_TABLE}"))?;
            debug!(target: "csvserve::storage", "ensure_columns: added column '{}'", name);
            added += 1;
        }
        Ok(added)
    }

    /// Append every row of the rowset to `uploaded_data`.
    ///
    /// Column names are interpolated verbatim; cell values are always bound
    /// as parameters. Table columns absent from the rowset stay NULL for
    /// these rows. Appends are per-row autocommit: a failure partway leaves
    /// earlier rows in place.
    pub fn append_rows(&self, conn: &Connection, rowset: &RowSet) -> Result<usize> {
        if rowset.columns.is_empty() || rowset.rows.is_empty() {
            return Ok(0);
        }
        let placeholders = vec!["?"; rowset.columns.len()].join(", ");
        let sql = format!(
            "INSERT INTO {UPLOADED_TABLE} ({}) VALUES ({placeholders})",
            rowset.columns.join(", ")
        );
        let mut stmt = conn.prepare(&sql).context("preparing row insert")?;
        for row in &rowset.rows {
            stmt.execute(rusqlite::params_from_iter(row.iter()))
                .context("appending row to uploaded_data")?;
        }
        debug!(target: "csvserve::storage", "append_rows: appended {} rows", rowset.rows.len());
        Ok(rowset.rows.len())
    }

    /// Execute a caller-supplied statement exactly as given and fetch every
    /// result row as a JSON tuple in result order. Statements that produce
    /// no rows yield an empty list. Opens its own connection.
    pub fn run_unchecked(&self, query: UncheckedSql<'_>) -> Result<Vec<Vec<Value>>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(query.0)?;
        let ncols = stmt.column_count();
        let mut rows = stmt.query([])?;
        let mut out: Vec<Vec<Value>> = Vec::new();
        while let Some(row) = rows.next()? {
            let mut tuple = Vec::with_capacity(ncols);
            for i in 0..ncols {
                tuple.push(json_value(row.get_ref(i)?));
            }
            out.push(tuple);
        }
        Ok(out)
    }
}

/// Map one SQLite cell to its JSON representation. BLOBs come back as
/// base64 strings.
fn json_value(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => json!(i),
        ValueRef::Real(f) => json!(f),
        ValueRef::Text(t) => Value::String(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Value::String(base64::engine::general_purpose::STANDARD.encode(b)),
    }
}
