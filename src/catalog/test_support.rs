//! Catalog doubles shared by unit tests.

use super::{Catalog, CatalogQuery, CatalogRecord, MemoryCatalog, MemoryRecord};
use crate::error::{KeepsakeError, Result};
use std::path::PathBuf;

/// A [`MemoryCatalog`] whose connection drops when one record is written.
///
/// Reads always work; any field write on the offline record fails with a
/// [`KeepsakeError::Catalog`] error.
pub(crate) struct FlakyCatalog {
    inner: MemoryCatalog,
    offline_uuid: String,
}

impl FlakyCatalog {
    pub(crate) fn new(inner: MemoryCatalog, offline_uuid: &str) -> Self {
        Self {
            inner,
            offline_uuid: offline_uuid.to_owned(),
        }
    }
}

impl Catalog for FlakyCatalog {
    type Record = FlakyRecord;

    fn find(&self, query: &CatalogQuery) -> Result<Vec<FlakyRecord>> {
        Ok(self
            .inner
            .find(query)?
            .into_iter()
            .map(|inner| FlakyRecord {
                offline: inner.uuid() == self.offline_uuid,
                inner,
            })
            .collect())
    }
}

pub(crate) struct FlakyRecord {
    inner: MemoryRecord,
    offline: bool,
}

impl CatalogRecord for FlakyRecord {
    fn uuid(&self) -> &str {
        self.inner.uuid()
    }

    fn field_value(&self, field: &str) -> Result<Option<String>> {
        self.inner.field_value(field)
    }

    fn set_field_value(&mut self, field: &str, value: &str) -> Result<()> {
        if self.offline {
            return Err(KeepsakeError::Catalog(format!(
                "connection lost while writing '{field}' of {}",
                self.inner.uuid()
            )));
        }
        self.inner.set_field_value(field, value)
    }

    fn has_field(&self, field: &str) -> bool {
        self.inner.has_field(field)
    }

    fn is_field_writable(&self, field: &str) -> bool {
        self.inner.is_field_writable(field)
    }

    fn fields(&self) -> Result<Vec<(String, String)>> {
        self.inner.fields()
    }

    fn content_path(&self) -> Result<PathBuf> {
        self.inner.content_path()
    }
}
