//! Conversion from Arrow record batches to catalog rows.
//!
//! Shared by the Parquet and DuckDB loaders. Accepts either `law_ref` or
//! `key` as the reference column; `category`, `jurisdiction`, and
//! `updated_at` are optional.

use arrow::array::{
    Array, LargeStringArray, StringArray, StringViewArray, TimestampMicrosecondArray,
    TimestampMillisecondArray, TimestampNanosecondArray,
};
use arrow::datatypes::DataType;
use arrow::record_batch::RecordBatch;
use chrono::{DateTime, Utc};
use lawlink_core::LawEntry;
use lawlink_core::schema::catalog;

use crate::StoreError;

/// Extract catalog rows from Arrow record batches.
///
/// Null cells become `None` so that malformed rows survive until snapshot
/// ingestion, which counts and skips them.
pub fn entries_from_batches(batches: &[RecordBatch]) -> Result<Vec<LawEntry>, StoreError> {
    let total: usize = batches.iter().map(|b| b.num_rows()).sum();
    let mut entries = Vec::with_capacity(total);

    for batch in batches {
        let keys = match string_column(batch, catalog::LAW_REF)? {
            Some(col) => col,
            None => string_column(batch, "key")?
                .ok_or_else(|| StoreError::MissingColumn(catalog::LAW_REF.into()))?,
        };
        let descriptions = string_column(batch, catalog::DESCRIPTION)?
            .ok_or_else(|| StoreError::MissingColumn(catalog::DESCRIPTION.into()))?;
        let categories = string_column(batch, catalog::CATEGORY)?;
        let jurisdictions = string_column(batch, catalog::JURISDICTION)?;
        let updated = timestamp_column(batch, catalog::UPDATED_AT);

        for i in 0..batch.num_rows() {
            entries.push(LawEntry {
                key: keys.get(i),
                description: descriptions.get(i),
                category: categories.as_ref().and_then(|c| c.get(i)),
                jurisdiction: jurisdictions.as_ref().and_then(|c| c.get(i)),
                updated_at: updated.as_ref().and_then(|c| c.get(i)),
            });
        }
    }

    Ok(entries)
}

/// A string column in any of Arrow's UTF-8 layouts.
enum StringColumn<'a> {
    Utf8(&'a StringArray),
    Large(&'a LargeStringArray),
    View(&'a StringViewArray),
}

impl StringColumn<'_> {
    fn get(&self, i: usize) -> Option<String> {
        match self {
            Self::Utf8(a) => (!a.is_null(i)).then(|| a.value(i).to_string()),
            Self::Large(a) => (!a.is_null(i)).then(|| a.value(i).to_string()),
            Self::View(a) => (!a.is_null(i)).then(|| a.value(i).to_string()),
        }
    }
}

fn string_column<'a>(
    batch: &'a RecordBatch,
    name: &str,
) -> Result<Option<StringColumn<'a>>, StoreError> {
    let Some(col) = batch.column_by_name(name) else {
        return Ok(None);
    };
    let any = col.as_any();
    if let Some(arr) = any.downcast_ref::<StringArray>() {
        Ok(Some(StringColumn::Utf8(arr)))
    } else if let Some(arr) = any.downcast_ref::<LargeStringArray>() {
        Ok(Some(StringColumn::Large(arr)))
    } else if let Some(arr) = any.downcast_ref::<StringViewArray>() {
        Ok(Some(StringColumn::View(arr)))
    } else if col.data_type() == &DataType::Null {
        // An all-null column (e.g. an empty optional CSV column).
        Ok(None)
    } else {
        Err(StoreError::ColumnType {
            column: name.to_string(),
            data_type: col.data_type().to_string(),
        })
    }
}

/// Timestamps are best effort: an unrecognised layout is ignored and the
/// ingestion time is used instead.
enum TimestampColumn<'a> {
    Millis(&'a TimestampMillisecondArray),
    Micros(&'a TimestampMicrosecondArray),
    Nanos(&'a TimestampNanosecondArray),
}

impl TimestampColumn<'_> {
    fn get(&self, i: usize) -> Option<DateTime<Utc>> {
        match self {
            Self::Millis(a) => (!a.is_null(i))
                .then(|| DateTime::from_timestamp_millis(a.value(i)))
                .flatten(),
            Self::Micros(a) => (!a.is_null(i))
                .then(|| DateTime::from_timestamp_micros(a.value(i)))
                .flatten(),
            Self::Nanos(a) => (!a.is_null(i)).then(|| DateTime::from_timestamp_nanos(a.value(i))),
        }
    }
}

fn timestamp_column<'a>(batch: &'a RecordBatch, name: &str) -> Option<TimestampColumn<'a>> {
    let any = batch.column_by_name(name)?.as_any();
    if let Some(arr) = any.downcast_ref::<TimestampMicrosecondArray>() {
        Some(TimestampColumn::Micros(arr))
    } else if let Some(arr) = any.downcast_ref::<TimestampMillisecondArray>() {
        Some(TimestampColumn::Millis(arr))
    } else {
        any.downcast_ref::<TimestampNanosecondArray>()
            .map(TimestampColumn::Nanos)
    }
}
