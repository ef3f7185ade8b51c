//! Versioned in-memory law catalog.
//!
//! The store owns a pointer to the current [`CatalogSnapshot`]. Every
//! successful mutation derives a new snapshot with the next version number
//! and swaps the pointer; snapshots already handed out are never touched.
//! Writers are serialised by a single writer lock, readers only clone an
//! `Arc` and never wait on a writer's work.

use std::collections::HashSet;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use chrono::Utc;
use lawlink_core::{CatalogSnapshot, IngestReport, LawEntry, LawRecord, normalize_reference};
use tokio::sync::watch;
use tracing::info;

use crate::StoreError;

/// Outcome of [`CatalogStore::import`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportReport {
    pub inserted: usize,
    /// Rows whose key already existed in the catalog (or earlier in the batch).
    pub skipped: usize,
    /// Rows with a missing or blank key or description.
    pub malformed: usize,
    /// Catalog version after the import.
    pub version: u64,
}

/// Mutable catalog handle that publishes immutable snapshots.
pub struct CatalogStore {
    current: RwLock<Arc<CatalogSnapshot>>,
    writer: Mutex<()>,
    versions: watch::Sender<u64>,
}

impl Default for CatalogStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CatalogStore {
    /// An empty catalog at version 0.
    pub fn new() -> Self {
        let (versions, _) = watch::channel(0);
        Self {
            current: RwLock::new(Arc::new(CatalogSnapshot::empty(0))),
            writer: Mutex::new(()),
            versions,
        }
    }

    /// A catalog seeded from raw rows, published as version 1.
    pub fn from_entries(entries: impl IntoIterator<Item = LawEntry>) -> (Self, IngestReport) {
        let store = Self::new();
        let report = store.replace_all(entries);
        (store, report)
    }

    /// The current snapshot. Cheap: clones an `Arc`.
    pub fn snapshot(&self) -> Arc<CatalogSnapshot> {
        Arc::clone(&self.current.read().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn version(&self) -> u64 {
        self.snapshot().version()
    }

    /// Receive the new version number after every published change.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.versions.subscribe()
    }

    /// Replace the whole catalog (bulk reload).
    pub fn replace_all(&self, entries: impl IntoIterator<Item = LawEntry>) -> IngestReport {
        let _guard = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        let version = self.snapshot().version() + 1;
        let (next, report) = CatalogSnapshot::ingest(version, entries);
        self.publish(next);
        report
    }

    /// Add a new law. Fails if the key is already present.
    pub fn add(&self, record: LawRecord) -> Result<u64, StoreError> {
        let record = canonical(record)?;
        self.mutate(|current, version| {
            if current.contains(&record.key) {
                return Err(StoreError::LawExists(record.key.clone()));
            }
            Ok((current.with_record(version, record), version))
        })
    }

    /// Insert or replace a law, refreshing its timestamp.
    pub fn upsert(&self, record: LawRecord) -> Result<u64, StoreError> {
        let mut record = canonical(record)?;
        record.updated_at = Utc::now();
        self.mutate(|current, version| Ok((current.with_record(version, record), version)))
    }

    /// Change the description of an existing law.
    pub fn update_description(&self, key: &str, description: &str) -> Result<u64, StoreError> {
        let key = normalize_reference(key);
        let description = description.trim();
        if description.is_empty() {
            return Err(StoreError::InvalidRecord(format!("blank description for {key}")));
        }
        self.mutate(|current, version| {
            let mut record = current
                .get(&key)
                .cloned()
                .ok_or_else(|| StoreError::LawNotFound(key.clone()))?;
            record.description = description.to_string();
            record.updated_at = Utc::now();
            Ok((current.with_record(version, record), version))
        })
    }

    /// Delete a law by key.
    pub fn remove(&self, key: &str) -> Result<u64, StoreError> {
        let key = normalize_reference(key);
        self.mutate(|current, version| {
            if !current.contains(&key) {
                return Err(StoreError::LawNotFound(key));
            }
            Ok((current.without(version, &key), version))
        })
    }

    /// Insert rows whose keys are not yet present; existing keys are left alone.
    ///
    /// Publishes a new version only when at least one row was inserted.
    pub fn import(&self, entries: impl IntoIterator<Item = LawEntry>) -> ImportReport {
        let _guard = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        let current = self.snapshot();
        let version = current.version() + 1;

        let mut report = ImportReport::default();
        let mut seen = HashSet::new();
        let mut inserted = Vec::new();
        for entry in entries {
            match LawRecord::from_entry(entry) {
                Some(record) if current.contains(&record.key) || !seen.insert(record.key.clone()) => {
                    report.skipped += 1
                }
                Some(record) => inserted.push(record),
                None => report.malformed += 1,
            }
        }
        report.inserted = inserted.len();

        if report.inserted == 0 {
            report.version = current.version();
            return report;
        }
        report.version = version;
        info!(
            inserted = report.inserted,
            skipped = report.skipped,
            malformed = report.malformed,
            "imported laws"
        );
        let next = CatalogSnapshot::from_records(
            version,
            current.records().cloned().chain(inserted),
        );
        self.publish(next);
        report
    }

    fn mutate<T>(
        &self,
        f: impl FnOnce(&CatalogSnapshot, u64) -> Result<(CatalogSnapshot, T), StoreError>,
    ) -> Result<T, StoreError> {
        let _guard = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        let current = self.snapshot();
        let (next, out) = f(&current, current.version() + 1)?;
        self.publish(next);
        Ok(out)
    }

    fn publish(&self, next: CatalogSnapshot) {
        let version = next.version();
        let records = next.len();
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(next);
        self.versions.send_replace(version);
        info!(version, records, "published catalog snapshot");
    }
}

/// Normalize the key and trim the description; reject blanks.
fn canonical(mut record: LawRecord) -> Result<LawRecord, StoreError> {
    record.key = normalize_reference(&record.key);
    record.description = record.description.trim().to_string();
    if record.key.is_empty() {
        return Err(StoreError::InvalidRecord("blank key".into()));
    }
    if record.description.is_empty() {
        return Err(StoreError::InvalidRecord(format!(
            "blank description for {}",
            record.key
        )));
    }
    Ok(record)
}

/// Read catalog rows from a JSON array file.
pub fn load_json(path: &Path) -> Result<Vec<LawEntry>, StoreError> {
    if !path.exists() {
        return Err(StoreError::FileNotFound(path.to_path_buf()));
    }
    let text = std::fs::read_to_string(path)?;
    let entries: Vec<LawEntry> = serde_json::from_str(&text)?;
    info!(count = entries.len(), path = %path.display(), "read catalog json");
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn seeded() -> CatalogStore {
        let (store, _) = CatalogStore::from_entries(vec![
            LawEntry::new("Article 21", "Protection of life and liberty."),
            LawEntry::new("Section 420", "Cheating."),
        ]);
        store
    }

    #[test]
    fn new_store_is_empty_version_zero() {
        let store = CatalogStore::new();
        assert_eq!(store.version(), 0);
        assert!(store.snapshot().is_empty());
    }

    #[test]
    fn each_mutation_bumps_version_once() {
        let store = seeded();
        assert_eq!(store.version(), 1);
        assert_eq!(store.add(LawRecord::new("Article 14", "Equality.")).unwrap(), 2);
        assert_eq!(store.update_description("article 14", "Equality before law.").unwrap(), 3);
        assert_eq!(store.remove("section 420").unwrap(), 4);
        assert_eq!(store.upsert(LawRecord::new("Section 420", "Cheating.")).unwrap(), 5);
        assert_eq!(store.snapshot().len(), 3);
    }

    #[test]
    fn duplicate_add_rejected_without_new_version() {
        let store = seeded();
        let err = store.add(LawRecord::new("ARTICLE 21", "dup")).unwrap_err();
        assert!(matches!(err, StoreError::LawExists(k) if k == "article 21"));
        assert_eq!(store.version(), 1);
    }

    #[test]
    fn remove_missing_is_not_found() {
        let store = seeded();
        assert!(matches!(
            store.remove("article 99"),
            Err(StoreError::LawNotFound(_))
        ));
        assert!(matches!(
            store.update_description("article 99", "x"),
            Err(StoreError::LawNotFound(_))
        ));
    }

    #[test]
    fn mutations_accept_any_spelling_of_a_key() {
        let store = seeded();
        assert_eq!(store.update_description("Article 21", "Right to life.").unwrap(), 2);
        assert_eq!(store.snapshot().description("article 21"), Some("Right to life."));
        assert_eq!(store.remove("ARTICLE 21").unwrap(), 3);
        assert!(!store.snapshot().contains("article 21"));
    }

    #[test]
    fn literal_record_is_stored_under_canonical_key() {
        let store = CatalogStore::new();
        let literal = LawRecord {
            key: "Article 21".into(),
            description: " Protection of life and liberty. ".into(),
            ..LawRecord::new("placeholder", "placeholder")
        };
        store.add(literal.clone()).unwrap();
        let snap = store.snapshot();
        assert_eq!(snap.keys().collect::<Vec<_>>(), vec!["article 21"]);
        assert_eq!(snap.description("article 21"), Some("Protection of life and liberty."));

        assert!(matches!(store.add(literal.clone()), Err(StoreError::LawExists(k)) if k == "article 21"));
        store.upsert(literal).unwrap();
        assert_eq!(store.snapshot().len(), 1);
    }

    #[test]
    fn blank_record_rejected() {
        let store = seeded();
        assert!(matches!(
            store.add(LawRecord::new("  ", "text")),
            Err(StoreError::InvalidRecord(_))
        ));
        assert!(matches!(
            store.update_description("article 21", " "),
            Err(StoreError::InvalidRecord(_))
        ));
    }

    #[test]
    fn old_snapshots_are_unaffected_by_mutation() {
        let store = seeded();
        let before = store.snapshot();
        store.remove("article 21").unwrap();
        assert!(before.contains("article 21"));
        assert_eq!(before.version(), 1);
        assert!(!store.snapshot().contains("article 21"));
    }

    #[test]
    fn import_skips_existing_and_blank() {
        let store = seeded();
        let report = store.import(vec![
            LawEntry::new("Article 21", "ignored"),
            LawEntry::new("Section 302", "Punishment for murder."),
            LawEntry::new("section 302", "repeat within batch"),
            LawEntry::new("", "blank"),
        ]);
        assert_eq!(report.inserted, 1);
        assert_eq!(report.skipped, 2);
        assert_eq!(report.malformed, 1);
        assert_eq!(report.version, 2);
        let snap = store.snapshot();
        assert_eq!(snap.description("article 21"), Some("Protection of life and liberty."));
        assert_eq!(snap.description("section 302"), Some("Punishment for murder."));
    }

    #[test]
    fn import_with_nothing_new_keeps_version() {
        let store = seeded();
        let report = store.import(vec![LawEntry::new("Section 420", "again")]);
        assert_eq!(report.inserted, 0);
        assert_eq!(report.version, 1);
        assert_eq!(store.version(), 1);
    }

    #[tokio::test]
    async fn subscribers_observe_new_versions() {
        let store = seeded();
        let mut rx = store.subscribe();
        assert_eq!(*rx.borrow_and_update(), 1);
        store.add(LawRecord::new("Article 14", "Equality.")).unwrap();
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow(), 2);
    }

    #[test]
    fn load_json_reads_entries() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[{{"law_ref": "Article 21", "description": "Life."}}, {{"key": "bad"}}]"#
        )
        .unwrap();
        let entries = load_json(file.path()).unwrap();
        let (store, report) = CatalogStore::from_entries(entries);
        assert_eq!(report.accepted, 1);
        assert_eq!(report.malformed, 1);
        assert!(store.snapshot().contains("article 21"));
    }

    #[test]
    fn load_json_missing_file() {
        let err = load_json(Path::new("/nonexistent/laws.json")).unwrap_err();
        assert!(matches!(err, StoreError::FileNotFound(_)));
    }
}
