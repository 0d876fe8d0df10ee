//! In-process catalog backed by a JSON file.
//!
//! Used by the CLI and by tests. Records live behind an `Arc<Mutex<_>>` so a
//! [`MemoryRecord`] handle writes straight into the shared store, the same way
//! field writes on a live catalog take effect immediately.
//!
//! File format:
//!
//! ```json
//! {
//!   "fields": ["GUID", "Catalog Name", "..."],
//!   "records": [
//!     {
//!       "uuid": "0f6a…",
//!       "fields": { "GUID": "0f6a…", "Catalog Name": "Conservation" },
//!       "read_only": ["GUID"],
//!       "content": "assets/0f6a.tif"
//!     }
//!   ]
//! }
//! ```

use super::fields;
use super::query::{CatalogQuery, Clause};
use super::{Catalog, CatalogRecord};
use crate::error::{KeepsakeError, Result, ResultExt as _};
use chrono::{DateTime, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

/// One record as stored in the catalog file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoredRecord {
    pub uuid: String,
    #[serde(default)]
    pub fields: BTreeMap<String, String>,
    #[serde(default)]
    pub read_only: BTreeSet<String>,
    #[serde(default)]
    pub content: Option<PathBuf>,
}

impl StoredRecord {
    /// A record whose `GUID` field is set to `uuid`.
    pub fn new(uuid: impl Into<String>) -> Self {
        let uuid = uuid.into();
        let mut fields = BTreeMap::new();
        fields.insert(fields::GUID.to_owned(), uuid.clone());
        Self {
            uuid,
            fields,
            read_only: BTreeSet::new(),
            content: None,
        }
    }

    #[must_use]
    pub fn with_field(mut self, name: &str, value: impl Into<String>) -> Self {
        self.fields.insert(name.to_owned(), value.into());
        self
    }

    #[must_use]
    pub fn with_read_only(mut self, name: &str) -> Self {
        self.read_only.insert(name.to_owned());
        self
    }

    #[must_use]
    pub fn with_content(mut self, path: impl Into<PathBuf>) -> Self {
        self.content = Some(path.into());
        self
    }

    fn value(&self, field: &str) -> Option<&str> {
        self.fields
            .get(field)
            .map(String::as_str)
            .filter(|v| !v.trim().is_empty())
    }

    fn matches(&self, clause: &Clause) -> bool {
        match clause {
            Clause::Equals(field, expected) => self.value(field) == Some(expected.as_str()),
            Clause::OneOf(field, allowed) => self
                .value(field)
                .is_some_and(|v| allowed.iter().any(|a| a == v)),
            Clause::Contains(field, needle) => {
                self.value(field).is_some_and(|v| v.contains(needle.as_str()))
            }
            Clause::HasValue(field) => self.value(field).is_some(),
            Clause::HasNoValue(field) => self.value(field).is_none(),
            Clause::Before(field, day) => {
                self.value(field).and_then(parse_catalog_date).is_some_and(|d| d < *day)
            }
            Clause::After(field, day) => {
                self.value(field).and_then(parse_catalog_date).is_some_and(|d| d > *day)
            }
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct CatalogStore {
    #[serde(default)]
    fields: BTreeSet<String>,
    #[serde(default)]
    records: Vec<StoredRecord>,
}

/// Catalog of records held in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryCatalog {
    store: Arc<Mutex<CatalogStore>>,
}

impl MemoryCatalog {
    /// An empty catalog defining no fields.
    pub fn new() -> Self {
        Self::default()
    }

    /// An empty catalog defining every field this crate uses.
    pub fn with_standard_fields() -> Self {
        let catalog = Self::new();
        if let Ok(mut store) = catalog.store.lock() {
            store
                .fields
                .extend(fields::STANDARD_FIELDS.iter().map(|f| (*f).to_owned()));
        }
        catalog
    }

    /// Load a catalog from a JSON file.
    ///
    /// # Errors
    ///
    /// Unreadable or malformed files are [`KeepsakeError::Catalog`] errors.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            KeepsakeError::Catalog(format!("Failed to read catalog {}: {e}", path.display()))
        })?;
        let mut store: CatalogStore = serde_json::from_str(&raw).map_err(|e| {
            KeepsakeError::Catalog(format!("Failed to parse catalog {}: {e}", path.display()))
        })?;

        let defined: Vec<String> = store
            .records
            .iter()
            .flat_map(|r| r.fields.keys().cloned())
            .collect();
        store.fields.extend(defined);

        tracing::debug!(
            records = store.records.len(),
            "Loaded catalog from {}",
            path.display()
        );

        Ok(Self {
            store: Arc::new(Mutex::new(store)),
        })
    }

    /// Write the catalog back to a JSON file.
    ///
    /// # Errors
    ///
    /// Returns error if the catalog lock is poisoned or the file (or its
    /// parent directory) cannot be written.
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = {
            let store = self.lock()?;
            serde_json::to_string_pretty(&*store).context("Failed to serialize catalog")?
        };

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        std::fs::write(path, json)
            .with_context(|| format!("Failed to write catalog to {}", path.display()))
    }

    /// Define a field so records may hold and be written with it.
    ///
    /// # Errors
    ///
    /// Returns [`KeepsakeError::Catalog`] if the catalog lock is poisoned.
    pub fn define_field(&self, name: &str) -> Result<()> {
        self.lock()?.fields.insert(name.to_owned());
        Ok(())
    }

    /// Add a record and return a handle to it.
    ///
    /// # Errors
    ///
    /// Returns [`KeepsakeError::Argument`] if a record with the same UUID
    /// exists, and [`KeepsakeError::Catalog`] if the catalog lock is poisoned.
    pub fn insert(&self, record: StoredRecord) -> Result<MemoryRecord> {
        let mut store = self.lock()?;
        if store.records.iter().any(|r| r.uuid == record.uuid) {
            return Err(KeepsakeError::Argument(format!(
                "record {} already exists",
                record.uuid
            )));
        }

        let defined: Vec<String> = record.fields.keys().cloned().collect();
        store.fields.extend(defined);

        let uuid = record.uuid.clone();
        store.records.push(record);

        Ok(MemoryRecord {
            store: Arc::clone(&self.store),
            index: store.records.len() - 1,
            uuid,
        })
    }

    /// Handle to the record with the given UUID.
    ///
    /// # Errors
    ///
    /// Returns [`KeepsakeError::Catalog`] if the catalog lock is poisoned.
    pub fn record(&self, uuid: &str) -> Result<Option<MemoryRecord>> {
        let store = self.lock()?;
        Ok(store
            .records
            .iter()
            .position(|r| r.uuid == uuid)
            .map(|index| MemoryRecord {
                store: Arc::clone(&self.store),
                index,
                uuid: uuid.to_owned(),
            }))
    }

    pub fn len(&self) -> usize {
        self.lock().map(|s| s.records.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> Result<MutexGuard<'_, CatalogStore>> {
        self.store
            .lock()
            .map_err(|_poisoned| KeepsakeError::Catalog("catalog store lock poisoned".to_owned()))
    }
}

impl Catalog for MemoryCatalog {
    type Record = MemoryRecord;

    fn find(&self, query: &CatalogQuery) -> Result<Vec<MemoryRecord>> {
        let store = self.lock()?;
        let found = store
            .records
            .iter()
            .enumerate()
            .filter(|(_, record)| query.clauses.iter().all(|clause| record.matches(clause)))
            .map(|(index, record)| MemoryRecord {
                store: Arc::clone(&self.store),
                index,
                uuid: record.uuid.clone(),
            })
            .collect();
        Ok(found)
    }
}

/// Handle to one record of a [`MemoryCatalog`].
#[derive(Debug, Clone)]
pub struct MemoryRecord {
    store: Arc<Mutex<CatalogStore>>,
    index: usize,
    uuid: String,
}

impl MemoryRecord {
    fn with_record<T>(&self, f: impl FnOnce(&CatalogStore, &StoredRecord) -> T) -> Result<T> {
        let store = self
            .store
            .lock()
            .map_err(|_poisoned| KeepsakeError::Catalog("catalog store lock poisoned".to_owned()))?;
        let record = store.records.get(self.index).ok_or_else(|| {
            KeepsakeError::Catalog(format!("record {} vanished from catalog", self.uuid))
        })?;
        Ok(f(&store, record))
    }
}

impl CatalogRecord for MemoryRecord {
    fn uuid(&self) -> &str {
        &self.uuid
    }

    fn field_value(&self, field: &str) -> Result<Option<String>> {
        self.with_record(|_, record| record.value(field).map(str::to_owned))
    }

    fn set_field_value(&mut self, field: &str, value: &str) -> Result<()> {
        let mut store = self
            .store
            .lock()
            .map_err(|_poisoned| KeepsakeError::Catalog("catalog store lock poisoned".to_owned()))?;

        if !store.fields.contains(field) {
            return Err(KeepsakeError::RequiredField(format!(
                "field '{field}' is not defined in the catalog"
            )));
        }

        let record = store.records.get_mut(self.index).ok_or_else(|| {
            KeepsakeError::Catalog(format!("record {} vanished from catalog", self.uuid))
        })?;

        if record.read_only.contains(field) {
            return Err(KeepsakeError::RequiredField(format!(
                "field '{field}' of record {} is read-only",
                self.uuid
            )));
        }

        record.fields.insert(field.to_owned(), value.to_owned());
        Ok(())
    }

    fn has_field(&self, field: &str) -> bool {
        self.with_record(|store, _| store.fields.contains(field))
            .unwrap_or(false)
    }

    fn is_field_writable(&self, field: &str) -> bool {
        self.with_record(|store, record| {
            store.fields.contains(field) && !record.read_only.contains(field)
        })
        .unwrap_or(false)
    }

    fn fields(&self) -> Result<Vec<(String, String)>> {
        self.with_record(|_, record| {
            record
                .fields
                .iter()
                .filter(|(_, v)| !v.trim().is_empty())
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect()
        })
    }

    fn content_path(&self) -> Result<PathBuf> {
        self.with_record(|_, record| record.content.clone())?
            .ok_or_else(|| {
                KeepsakeError::RequiredField(format!("record {} has no content file", self.uuid))
            })
    }
}

/// Parse a catalog date value: RFC 3339 timestamps or plain `YYYY-MM-DD` days.
pub fn parse_catalog_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.date_naive())
        .ok()
        .or_else(|| NaiveDate::parse_from_str(value, "%Y-%m-%d").ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Selection;
    use tempfile::TempDir;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn ready(uuid: &str) -> StoredRecord {
        StoredRecord::new(uuid)
            .with_field(fields::CATALOG_NAME, "Conservation")
            .with_field(fields::REGISTRATION_STATE, "Finished")
            .with_field(fields::PRESERVATION_STATUS, "Ready for archival")
    }

    #[test]
    fn test_find_ready_records() {
        let catalog = MemoryCatalog::with_standard_fields();
        catalog.insert(ready("a")).unwrap();
        catalog.insert(ready("b").with_field(fields::CATALOG_NAME, "Other")).unwrap();
        catalog
            .insert(ready("c").with_field(fields::REGISTRATION_STATE, "Pending"))
            .unwrap();

        let query = Selection::ReadyForArchival
            .query("Conservation", day(2024, 1, 1))
            .unwrap();
        let found = catalog.find(&query).unwrap();

        assert_eq!(found.len(), 1);
        assert_eq!(found[0].uuid(), "a");
    }

    #[test]
    fn test_failed_records_are_selected_again() {
        let catalog = MemoryCatalog::with_standard_fields();
        catalog
            .insert(ready("failed").with_field(fields::PRESERVATION_STATUS, "Archival failed"))
            .unwrap();
        catalog
            .insert(ready("done").with_field(fields::PRESERVATION_STATUS, "Archival completed"))
            .unwrap();

        let query = Selection::ReadyForArchival
            .query("Conservation", day(2024, 1, 1))
            .unwrap();
        let found = catalog.find(&query).unwrap();

        assert_eq!(found.len(), 1);
        assert_eq!(found[0].uuid(), "failed");
    }

    #[test]
    fn test_update_pending_dates() {
        let catalog = MemoryCatalog::with_standard_fields();
        let preserved = |uuid: &str, preserved: &str, modified: &str| {
            ready(uuid)
                .with_field(fields::PRESERVATION_STATUS, "Archival completed")
                .with_field(fields::PRESERVATION_DATE, preserved)
                .with_field(fields::LAST_MODIFIED, modified)
        };
        catalog
            .insert(preserved("old-changed", "2023-01-01", "2024-03-20T10:00:00Z"))
            .unwrap();
        catalog
            .insert(preserved("old-unchanged", "2023-01-01", "2023-01-02"))
            .unwrap();
        catalog
            .insert(preserved("fresh", "2024-03-25", "2024-03-26"))
            .unwrap();

        let query = Selection::UpdatePending { days: 30 }
            .query("Conservation", day(2024, 3, 31))
            .unwrap();
        let uuids: Vec<String> = catalog
            .find(&query)
            .unwrap()
            .iter()
            .map(|r| r.uuid().to_owned())
            .collect();

        assert_eq!(uuids, vec!["old-changed".to_owned()]);
    }

    #[test]
    fn test_write_through_handle() {
        let catalog = MemoryCatalog::with_standard_fields();
        let mut handle = catalog.insert(ready("a")).unwrap();
        handle
            .set_field_value(fields::METADATA_GUID, "meta-1")
            .unwrap();

        let again = catalog.record("a").unwrap().unwrap();
        assert_eq!(
            again.field_value(fields::METADATA_GUID).unwrap().as_deref(),
            Some("meta-1")
        );
    }

    #[test]
    fn test_read_only_and_undefined_fields() {
        let catalog = MemoryCatalog::new();
        let mut handle = catalog
            .insert(ready("a").with_read_only(fields::CATALOG_NAME))
            .unwrap();

        assert!(!handle.is_field_writable(fields::CATALOG_NAME));
        assert!(handle.set_field_value(fields::CATALOG_NAME, "x").is_err());
        assert!(!handle.has_field(fields::METADATA_GUID));
        assert!(handle.set_field_value(fields::METADATA_GUID, "x").is_err());
    }

    #[test]
    fn test_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("catalog.json");

        let catalog = MemoryCatalog::with_standard_fields();
        catalog
            .insert(ready("a").with_content("assets/a.tif"))
            .unwrap();
        catalog.save(&path).unwrap();

        let loaded = MemoryCatalog::load(&path).unwrap();
        let record = loaded.record("a").unwrap().unwrap();

        assert_eq!(loaded.len(), 1);
        assert_eq!(record.content_path().unwrap(), PathBuf::from("assets/a.tif"));
        assert!(record.has_field(fields::METADATA_HISTORY));
    }

    #[test]
    fn test_load_missing_file_is_catalog_error() {
        let err = MemoryCatalog::load(Path::new("/nonexistent/catalog.json")).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_parse_catalog_date() {
        assert_eq!(parse_catalog_date("2024-03-01"), Some(day(2024, 3, 1)));
        assert_eq!(
            parse_catalog_date("2024-03-01T23:10:00+00:00"),
            Some(day(2024, 3, 1))
        );
        assert_eq!(parse_catalog_date("last tuesday"), None);
    }
}
