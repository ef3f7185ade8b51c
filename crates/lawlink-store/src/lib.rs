//! Catalog storage: versioned in-memory snapshots, plus JSON, Parquet, and DuckDB loaders.

mod error;
pub use error::StoreError;

mod batches;
pub use batches::entries_from_batches;

mod catalog;
pub use catalog::{CatalogStore, ImportReport, load_json};

#[cfg(feature = "duckdb")]
mod duck;
#[cfg(feature = "duckdb")]
pub use duck::DuckCatalog;

#[cfg(feature = "parquet")]
mod parquet_io;
#[cfg(feature = "parquet")]
pub use parquet_io::{read_catalog_parquet, write_catalog_parquet};
