//! Parquet import/export of the law catalog.

use std::path::Path;
use std::sync::Arc;

use arrow::array::{ArrayRef, StringArray, TimestampMicrosecondArray};
use arrow::record_batch::RecordBatch;
use lawlink_core::schema::catalog;
use lawlink_core::{CatalogSnapshot, LawEntry};
use parquet::arrow::ArrowWriter;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use tracing::info;

use crate::{StoreError, entries_from_batches};

/// Read catalog rows from a Parquet file with `law_ref` and `description` columns.
pub fn read_catalog_parquet(path: &Path) -> Result<Vec<LawEntry>, StoreError> {
    if !path.exists() {
        return Err(StoreError::FileNotFound(path.to_path_buf()));
    }
    let file = std::fs::File::open(path)?;
    let reader = ParquetRecordBatchReaderBuilder::try_new(file)?.build()?;
    let batches: Vec<RecordBatch> = reader.collect::<Result<_, _>>()?;
    let entries = entries_from_batches(&batches)?;
    info!(count = entries.len(), path = %path.display(), "read catalog parquet");
    Ok(entries)
}

/// Write a snapshot to Parquet using [`catalog::law_catalog_schema`].
///
/// Returns the number of rows written.
pub fn write_catalog_parquet(snapshot: &CatalogSnapshot, path: &Path) -> Result<usize, StoreError> {
    let schema = Arc::new(catalog::law_catalog_schema());
    let records: Vec<_> = snapshot.records().collect();

    let columns: Vec<ArrayRef> = vec![
        Arc::new(StringArray::from_iter_values(
            records.iter().map(|r| r.key.as_str()),
        )),
        Arc::new(StringArray::from_iter_values(
            records.iter().map(|r| r.description.as_str()),
        )),
        Arc::new(StringArray::from(
            records
                .iter()
                .map(|r| r.category.as_deref())
                .collect::<Vec<_>>(),
        )),
        Arc::new(StringArray::from(
            records
                .iter()
                .map(|r| r.jurisdiction.as_deref())
                .collect::<Vec<_>>(),
        )),
        Arc::new(
            TimestampMicrosecondArray::from(
                records
                    .iter()
                    .map(|r| r.updated_at.timestamp_micros())
                    .collect::<Vec<_>>(),
            )
            .with_timezone("UTC"),
        ),
    ];
    let batch = RecordBatch::try_new(Arc::clone(&schema), columns)?;

    let file = std::fs::File::create(path)?;
    let mut writer = ArrowWriter::try_new(file, schema, None)?;
    writer.write(&batch)?;
    writer.close()?;

    info!(
        rows = records.len(),
        version = snapshot.version(),
        path = %path.display(),
        "wrote catalog parquet"
    );
    Ok(records.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use lawlink_core::LawRecord;
    use tempfile::TempDir;

    #[test]
    fn export_then_import_preserves_records() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("laws.parquet");
        let snapshot = CatalogSnapshot::from_records(
            4,
            vec![
                LawRecord::new("Article 21", "Protection of life and liberty.")
                    .with_jurisdiction("IN"),
                LawRecord::new("Section 420", "Cheating.").with_category("criminal"),
            ],
        );

        assert_eq!(write_catalog_parquet(&snapshot, &path).unwrap(), 2);

        let entries = read_catalog_parquet(&path).unwrap();
        let (reloaded, report) = CatalogSnapshot::ingest(5, entries);
        assert_eq!(report.malformed, 0);
        assert_eq!(reloaded.len(), 2);
        let article = reloaded.get("article 21").unwrap();
        assert_eq!(article.jurisdiction.as_deref(), Some("IN"));
        assert_eq!(
            article.updated_at.timestamp_micros(),
            snapshot.get("article 21").unwrap().updated_at.timestamp_micros()
        );
        assert_eq!(
            reloaded.get("section 420").unwrap().category.as_deref(),
            Some("criminal")
        );
    }

    #[test]
    fn missing_parquet_errors() {
        let err = read_catalog_parquet(Path::new("/nonexistent/laws.parquet")).unwrap_err();
        assert!(matches!(err, StoreError::FileNotFound(_)));
    }
}
