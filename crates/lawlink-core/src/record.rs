//! Law records and immutable, versioned catalog snapshots.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::normalize::normalize_reference;

/// Canonical unit of legal knowledge: one citable provision and its description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LawRecord {
    /// Normalized reference, e.g. `"article 21"`.
    pub key: String,
    pub description: String,
    pub category: Option<String>,
    pub jurisdiction: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl LawRecord {
    /// Create a record, normalizing the key and trimming the description.
    pub fn new(key: &str, description: &str) -> Self {
        Self {
            key: normalize_reference(key),
            description: description.trim().to_string(),
            category: None,
            jurisdiction: None,
            updated_at: Utc::now(),
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_jurisdiction(mut self, jurisdiction: impl Into<String>) -> Self {
        self.jurisdiction = Some(jurisdiction.into());
        self
    }

    /// Text fed to the embedding backend: key and description, space-separated.
    pub fn embedding_text(&self) -> String {
        format!("{} {}", self.key, self.description)
    }

    /// Validate and convert a loosely-typed catalog row.
    ///
    /// Returns `None` for malformed rows (missing or blank key/description).
    pub fn from_entry(entry: LawEntry) -> Option<Self> {
        let key = normalize_reference(entry.key.as_deref()?);
        let description = entry.description.as_deref()?.trim().to_string();
        if key.is_empty() || description.is_empty() {
            return None;
        }
        Some(Self {
            key,
            description,
            category: non_blank(entry.category),
            jurisdiction: non_blank(entry.jurisdiction),
            updated_at: entry.updated_at.unwrap_or_else(Utc::now),
        })
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// A catalog row as handed over by an external source (JSON, CSV, Parquet, DB).
///
/// Every field is optional so that malformed rows can be counted and skipped
/// at ingestion instead of failing the whole load.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LawEntry {
    #[serde(alias = "law_ref", default)]
    pub key: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub jurisdiction: Option<String>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl LawEntry {
    pub fn new(key: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            key: Some(key.into()),
            description: Some(description.into()),
            ..Default::default()
        }
    }
}

impl From<&LawRecord> for LawEntry {
    fn from(record: &LawRecord) -> Self {
        Self {
            key: Some(record.key.clone()),
            description: Some(record.description.clone()),
            category: record.category.clone(),
            jurisdiction: record.jurisdiction.clone(),
            updated_at: Some(record.updated_at),
        }
    }
}

/// Outcome of ingesting a batch of catalog rows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestReport {
    /// Records present in the resulting snapshot.
    pub accepted: usize,
    /// Rows skipped for a missing or blank key or description.
    pub malformed: usize,
    /// Rows whose key repeated an earlier row (the later row wins).
    pub duplicates: usize,
}

/// Immutable view of the whole catalog at one version.
///
/// Keys are unique and kept sorted, so iteration order is deterministic
/// across runs. A catalog change never edits a snapshot in place: it derives
/// a new one with a higher version.
#[derive(Debug, Clone, Default)]
pub struct CatalogSnapshot {
    version: u64,
    records: BTreeMap<String, LawRecord>,
}

impl CatalogSnapshot {
    /// An empty snapshot at the given version.
    pub fn empty(version: u64) -> Self {
        Self {
            version,
            records: BTreeMap::new(),
        }
    }

    /// Build a snapshot from raw catalog rows.
    ///
    /// Malformed rows are skipped with a warning. An empty result is reported
    /// here, once, rather than rediscovered by every query.
    pub fn ingest(
        version: u64,
        entries: impl IntoIterator<Item = LawEntry>,
    ) -> (Self, IngestReport) {
        let mut records = BTreeMap::new();
        let mut report = IngestReport::default();

        for entry in entries {
            let raw_key = entry.key.clone();
            match LawRecord::from_entry(entry) {
                Some(record) => {
                    if records.insert(record.key.clone(), record).is_some() {
                        report.duplicates += 1;
                    }
                }
                None => {
                    warn!(key = ?raw_key, "skipping malformed catalog entry");
                    report.malformed += 1;
                }
            }
        }

        report.accepted = records.len();
        if records.is_empty() {
            warn!(version, "catalog snapshot is empty; no references will resolve");
        } else {
            debug!(
                version,
                records = report.accepted,
                malformed = report.malformed,
                duplicates = report.duplicates,
                "ingested catalog snapshot"
            );
        }

        (Self { version, records }, report)
    }

    /// Build a snapshot from records, normalizing keys. Blank records are dropped.
    pub fn from_records(version: u64, records: impl IntoIterator<Item = LawRecord>) -> Self {
        let records = records
            .into_iter()
            .map(|mut r| {
                r.key = normalize_reference(&r.key);
                r
            })
            .filter(|r| !r.key.is_empty() && !r.description.trim().is_empty())
            .map(|r| (r.key.clone(), r))
            .collect();
        Self { version, records }
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.records.contains_key(key)
    }

    pub fn get(&self, key: &str) -> Option<&LawRecord> {
        self.records.get(key)
    }

    /// Exact lookup of a normalized key.
    pub fn description(&self, key: &str) -> Option<&str> {
        self.records.get(key).map(|r| r.description.as_str())
    }

    /// Keys in lexicographic order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.records.keys().map(String::as_str)
    }

    /// Records in key order.
    pub fn records(&self) -> impl Iterator<Item = &LawRecord> {
        self.records.values()
    }

    /// Derive a snapshot with `record` inserted or replaced.
    pub fn with_record(&self, version: u64, mut record: LawRecord) -> Self {
        record.key = normalize_reference(&record.key);
        let mut records = self.records.clone();
        records.insert(record.key.clone(), record);
        Self { version, records }
    }

    /// Derive a snapshot without `key`.
    pub fn without(&self, version: u64, key: &str) -> Self {
        let mut records = self.records.clone();
        records.remove(&normalize_reference(key));
        Self { version, records }
    }
}
