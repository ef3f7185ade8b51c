//! DuckDB-backed law catalog source.
//!
//! Holds the `laws` table the catalog is loaded from. CSV and Parquet
//! exports are imported through DuckDB's own readers, so column types and
//! quoting follow DuckDB's inference.

use std::path::Path;

use arrow::record_batch::RecordBatch;
use duckdb::Connection;
use lawlink_core::LawEntry;
use tracing::info;

use crate::{StoreError, entries_from_batches};

const LAWS_TABLE: &str = "laws";

/// DuckDB database holding the `laws` table.
///
/// Supports both in-memory (ephemeral) and persistent (file-backed) modes.
/// Use [`open`](Self::open) for in-memory and [`open_persistent`](Self::open_persistent)
/// for a catalog database that survives across process restarts.
pub struct DuckCatalog {
    conn: Connection,
}

impl DuckCatalog {
    /// Open an in-memory DuckDB database.
    pub fn open() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Ok(Self { conn })
    }

    /// Open or create a persistent DuckDB database at the given path.
    ///
    /// If the file already holds a `laws` table it is available immediately;
    /// use [`has_laws`](Self::has_laws) to check whether an import is needed.
    pub fn open_persistent(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        Ok(Self { conn })
    }

    /// Check whether the `laws` table exists.
    pub fn has_laws(&self) -> bool {
        self.count().is_ok()
    }

    /// Load a CSV file (header row required) into the `laws` table.
    pub fn load_csv(&self, path: &Path) -> Result<usize, StoreError> {
        self.load_with(path, "read_csv_auto")
    }

    /// Load a Parquet file into the `laws` table.
    pub fn load_parquet(&self, path: &Path) -> Result<usize, StoreError> {
        self.load_with(path, "read_parquet")
    }

    fn load_with(&self, path: &Path, reader: &str) -> Result<usize, StoreError> {
        if !path.exists() {
            return Err(StoreError::FileNotFound(path.to_path_buf()));
        }
        let literal = path.display().to_string().replace('\'', "''");
        let sql = format!("CREATE OR REPLACE TABLE {LAWS_TABLE} AS SELECT * FROM {reader}('{literal}')");
        self.conn.execute_batch(&sql)?;
        let count = self.count()?;
        info!(count, path = %path.display(), "loaded laws table");
        Ok(count)
    }

    /// Number of rows in the `laws` table.
    pub fn count(&self) -> Result<usize, StoreError> {
        let sql = format!("SELECT count(*)::BIGINT AS cnt FROM {LAWS_TABLE}");
        let mut stmt = self.conn.prepare(&sql)?;
        let batches: Vec<RecordBatch> = stmt.query_arrow([])?.collect();
        let batch = batches
            .first()
            .ok_or_else(|| StoreError::Other("count query returned no rows".into()))?;
        let col = batch
            .column(0)
            .as_any()
            .downcast_ref::<arrow::array::Int64Array>()
            .ok_or_else(|| StoreError::Other("count column not i64".into()))?;
        Ok(col.value(0) as usize)
    }

    /// All rows of the `laws` table as catalog entries.
    pub fn entries(&self) -> Result<Vec<LawEntry>, StoreError> {
        let sql = format!("SELECT * FROM {LAWS_TABLE}");
        let mut stmt = self.conn.prepare(&sql)?;
        let batches: Vec<RecordBatch> = stmt.query_arrow([])?.collect();
        entries_from_batches(&batches)
    }
}
