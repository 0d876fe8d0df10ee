//! Validation of preserved records against the archive.
//!
//! A record is queued for a tier by setting its validation field to the tier's
//! pending token. The engine picks those records up, checks them and writes the
//! verdict back:
//!
//! | Tier     | Checks                                                        |
//! |----------|---------------------------------------------------------------|
//! | `Simple` | archive-reported package checksum vs. stored archive checksum |
//! | `Full`   | package checksum, record presence, payload size and checksum  |
//!
//! Every error raised while checking a record is caught and recorded as that
//! record's failure; only fatal errors end the run.

mod full;
mod simple;

pub use full::check_full;
pub use simple::check_simple;

use crate::archive::ArchiveStore;
use crate::catalog::fields::{self, ValidationStatus};
use crate::catalog::{Catalog, CatalogRecord, Selection};
use crate::error::{KeepsakeError, Result, ResultExt as _};
use crate::integrity::ChecksumAlgorithm;
use crate::report::{RecordOutcome, RecordState, RunResult};
use chrono::{Local, SecondsFormat, Utc};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Instant;

/// How thoroughly a record is validated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValidationTier {
    Simple,
    Full,
}

impl ValidationTier {
    /// Validation field value that queues a record for this tier.
    pub fn pending_status(self) -> ValidationStatus {
        match self {
            Self::Simple => ValidationStatus::SimpleCheckPending,
            Self::Full => ValidationStatus::FullCheckPending,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Simple => "simple",
            Self::Full => "full",
        }
    }
}

impl fmt::Display for ValidationTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ValidationTier {
    type Err = KeepsakeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "simple" => Ok(Self::Simple),
            "full" => Ok(Self::Full),
            other => Err(KeepsakeError::Argument(format!(
                "unknown validation tier '{other}'"
            ))),
        }
    }
}

pub(crate) fn timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Mark `record` as validated with a note.
///
/// # Errors
///
/// Returns the catalog error of the first field write that fails.
pub fn mark_ok<R: CatalogRecord + ?Sized>(record: &mut R, note: &str) -> Result<()> {
    record.set_field_value(fields::VALIDATION_STATUS, ValidationStatus::Ok.as_str())?;
    record.set_field_value(fields::VALIDATION_MESSAGE, note)
}

/// Mark `record` as failing validation.
///
/// # Errors
///
/// Returns the catalog error of the first field write that fails.
pub fn mark_failed<R: CatalogRecord + ?Sized>(record: &mut R, reason: &str) -> Result<()> {
    record.set_field_value(fields::VALIDATION_STATUS, ValidationStatus::Failed.as_str())?;
    record.set_field_value(fields::VALIDATION_MESSAGE, reason)
}

/// Runs validation tiers over a catalog.
pub struct ValidationEngine<'a, C, A> {
    catalog: &'a C,
    archive: &'a A,
    algorithm: ChecksumAlgorithm,
    scratch_dir: PathBuf,
}

impl<'a, C, A> ValidationEngine<'a, C, A>
where
    C: Catalog,
    A: ArchiveStore,
{
    pub fn new(
        catalog: &'a C,
        archive: &'a A,
        algorithm: ChecksumAlgorithm,
        scratch_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            catalog,
            archive,
            algorithm,
            scratch_dir: scratch_dir.into(),
        }
    }

    /// Records of `catalog_name` queued for `tier`.
    ///
    /// # Errors
    ///
    /// Returns [`KeepsakeError::Argument`] for an empty catalog name and the
    /// catalog error if the query fails.
    pub fn select_pending(&self, catalog_name: &str, tier: ValidationTier) -> Result<Vec<C::Record>> {
        let query = Selection::ValidationPending(tier).query(catalog_name, Local::now().date_naive())?;
        self.catalog
            .find(&query)
            .with_context(|| format!("Failed to select records ({query})"))
    }

    /// Validate every queued record of `catalog_name`.
    ///
    /// # Errors
    ///
    /// Only fatal errors are returned; failed checks are in the result.
    pub fn validate_catalog(&self, catalog_name: &str, tier: ValidationTier) -> Result<RunResult> {
        let start = Instant::now();
        let mut records = self.select_pending(catalog_name, tier)?;

        tracing::info!(
            catalog = catalog_name,
            %tier,
            records = records.len(),
            "Starting validation run"
        );

        let mut outcomes = Vec::with_capacity(records.len());
        for record in &mut records {
            let state = self.validate_record(record, tier)?;
            outcomes.push(RecordOutcome {
                uuid: record.uuid().to_owned(),
                state,
            });
        }

        let result = RunResult::new(outcomes, start.elapsed());
        tracing::info!(catalog = catalog_name, %tier, "{}", result.report.summary());
        Ok(result)
    }

    /// Check one record and write the verdict onto it.
    ///
    /// # Errors
    ///
    /// Failed checks are returned as [`RecordState::Failed`]. Only fatal
    /// errors, such as a catalog that rejects the verdict, are returned.
    pub fn validate_record(&self, record: &mut C::Record, tier: ValidationTier) -> Result<RecordState> {
        let verdict = match tier {
            ValidationTier::Simple => check_simple(record, self.archive),
            ValidationTier::Full => check_full(record, self.archive, self.algorithm, &self.scratch_dir),
        };

        let state = match verdict {
            Ok(note) => {
                tracing::debug!(record = record.uuid(), %tier, "Validation passed");
                let written = mark_ok(record, &note);
                write_verdict(record, written)?;
                RecordState::Completed
            }
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                let reason = e.to_string();
                tracing::warn!(record = record.uuid(), %tier, error = %reason, "Validation failed");
                let written = mark_failed(record, &reason);
                write_verdict(record, written)?;
                RecordState::Failed(reason)
            }
        };

        Ok(state)
    }
}

/// A verdict that cannot be written is logged; only fatal errors propagate.
fn write_verdict<R: CatalogRecord + ?Sized>(record: &R, written: Result<()>) -> Result<()> {
    match written {
        Err(e) if e.is_fatal() => Err(e),
        Err(e) => {
            tracing::warn!(record = record.uuid(), error = %e, "Could not record validation verdict");
            Ok(())
        }
        Ok(()) => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::test_support::FlakyCatalog;
    use crate::catalog::{MemoryCatalog, StoredRecord};
    use std::collections::HashMap;

    /// Archive that only knows checksums.
    #[derive(Default)]
    struct ChecksumOnlyArchive {
        checksums: HashMap<(String, String), String>,
    }

    impl ArchiveStore for ChecksumOnlyArchive {
        fn get_file(&self, package_id: &str, _collection_id: &str) -> Result<PathBuf> {
            Err(KeepsakeError::ArchiveIo(format!("no file for {package_id}")))
        }

        fn get_checksum(&self, package_id: &str, collection_id: &str) -> Result<String> {
            self.checksums
                .get(&(package_id.to_owned(), collection_id.to_owned()))
                .cloned()
                .ok_or_else(|| KeepsakeError::ArchiveIo(format!("unknown package {package_id}")))
        }
    }

    fn queued(uuid: &str, status: &str, checksum: &str) -> StoredRecord {
        StoredRecord::new(uuid)
            .with_field(fields::CATALOG_NAME, "Photos")
            .with_field(fields::REGISTRATION_STATE, fields::REGISTRATION_FINISHED)
            .with_field(fields::VALIDATION_STATUS, status)
            .with_field(fields::COLLECTION_ID, "books")
            .with_field(fields::RESOURCE_PACKAGE_ID, format!("pkg-{uuid}"))
            .with_field(fields::ARCHIVE_CHECKSUM, checksum)
    }

    fn archive() -> ChecksumOnlyArchive {
        let mut archive = ChecksumOnlyArchive::default();
        archive
            .checksums
            .insert(("pkg-a".to_owned(), "books".to_owned()), "ABCD".to_owned());
        archive
            .checksums
            .insert(("pkg-b".to_owned(), "books".to_owned()), "1234".to_owned());
        archive
    }

    #[test]
    fn test_simple_validation_is_case_insensitive() {
        let catalog = MemoryCatalog::with_standard_fields();
        catalog.insert(queued("a", "Simple check", "abcd")).unwrap();
        let archive = archive();

        let result = ValidationEngine::new(&catalog, &archive, ChecksumAlgorithm::Md5, std::env::temp_dir())
            .validate_catalog("Photos", ValidationTier::Simple)
            .unwrap();

        assert_eq!(result.report.succeeded, 1);
        let record = catalog.record("a").unwrap().unwrap();
        assert_eq!(
            record.field_value(fields::VALIDATION_STATUS).unwrap().as_deref(),
            Some("OK")
        );
        assert!(
            record
                .field_value(fields::VALIDATION_MESSAGE)
                .unwrap()
                .unwrap()
                .starts_with("Simple validation OK at ")
        );
    }

    #[test]
    fn test_simple_validation_mismatch_and_archive_error() {
        let catalog = MemoryCatalog::with_standard_fields();
        catalog.insert(queued("b", "Simple check", "abcd")).unwrap();
        catalog.insert(queued("c", "Simple check", "abcd")).unwrap();
        catalog.insert(queued("d", "Full check", "abcd")).unwrap();
        let archive = archive();

        let result = ValidationEngine::new(&catalog, &archive, ChecksumAlgorithm::Md5, std::env::temp_dir())
            .validate_catalog("Photos", ValidationTier::Simple)
            .unwrap();

        assert_eq!(result.report.failed, 2);
        assert!(result.state_of("d").is_none());

        let mismatched = catalog.record("b").unwrap().unwrap();
        assert_eq!(
            mismatched.field_value(fields::VALIDATION_STATUS).unwrap().as_deref(),
            Some("Failed")
        );
        assert!(
            mismatched
                .field_value(fields::VALIDATION_MESSAGE)
                .unwrap()
                .unwrap()
                .contains("integrity issue, discovered at")
        );

        let unreachable = catalog.record("c").unwrap().unwrap();
        assert!(
            unreachable
                .field_value(fields::VALIDATION_MESSAGE)
                .unwrap()
                .unwrap()
                .contains("unknown package pkg-c")
        );
    }

    #[test]
    fn test_catalog_failure_stops_validation_run() {
        let memory = MemoryCatalog::with_standard_fields();
        memory.insert(queued("a", "Simple check", "abcd")).unwrap();
        memory.insert(queued("b", "Simple check", "abcd")).unwrap();
        memory.insert(queued("c", "Simple check", "abcd")).unwrap();
        let catalog = FlakyCatalog::new(memory.clone(), "b");
        let archive = archive();

        let err = ValidationEngine::new(&catalog, &archive, ChecksumAlgorithm::Md5, std::env::temp_dir())
            .validate_catalog("Photos", ValidationTier::Simple)
            .unwrap_err();

        assert!(matches!(err, KeepsakeError::Catalog(_)), "{err}");
        let status = |uuid: &str| {
            memory
                .record(uuid)
                .unwrap()
                .unwrap()
                .field_value(fields::VALIDATION_STATUS)
                .unwrap()
        };
        assert_eq!(status("a").as_deref(), Some("OK"));
        assert_eq!(status("b").as_deref(), Some("Simple check"));
        assert_eq!(status("c").as_deref(), Some("Simple check"));
    }

    #[test]
    fn test_tier_parse_and_token() {
        assert_eq!("FULL".parse::<ValidationTier>().unwrap(), ValidationTier::Full);
        assert!("medium".parse::<ValidationTier>().is_err());
        assert_eq!(
            ValidationTier::Simple.pending_status(),
            ValidationStatus::SimpleCheckPending
        );
    }

    #[test]
    fn test_empty_catalog_name_is_fatal() {
        let catalog = MemoryCatalog::with_standard_fields();
        let archive = archive();
        let engine = ValidationEngine::new(&catalog, &archive, ChecksumAlgorithm::Md5, std::env::temp_dir());

        assert!(engine.validate_catalog(" ", ValidationTier::Full).unwrap_err().is_fatal());
    }
}
