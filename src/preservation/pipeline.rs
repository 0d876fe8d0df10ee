//! Preservation run over one catalog.
//!
//! Each selected record goes through the same stages:
//!
//! 1. **Initialise**: content checksum and size (full runs only), then the
//!    identifier rules of [`IdentityAssigner`]
//! 2. **Preconditions**: required fields hold values, written fields are
//!    writable. Nothing of a record failing here is packaged
//! 3. **Package**: every planned object is materialised (transformed and
//!    validated where it is metadata) and handed to the packager
//!
//! A record's error is written onto that record and the loop moves on. Only
//! fatal errors (bad arguments, unreachable catalog) end the run early.
//! After the loop the packager uploads everything it buffered in one call,
//! and the records that made it are marked completed.

use super::decompose::{ObjectSource, PlannedObject, RecordDecomposer};
use super::object::{ArchivalObject, AssetRole, ObjectKind, Payload};
use crate::archive::{Packager, UploadedPackage};
use crate::catalog::fields::{self, PreservationStatus};
use crate::catalog::{Catalog, CatalogRecord, Selection, record_to_xml};
use crate::config::{KeepsakeConfig, RequiredFields};
use crate::error::{KeepsakeError, Result, ResultExt as _};
use crate::identity::{IdentityAssigner, RecordIdentity};
use crate::integrity::{ChecksumAlgorithm, compute_file_checksum, digests_equal};
use crate::report::{RecordOutcome, RecordState, RunResult};
use crate::transform::Transformer;
use chrono::{Local, SecondsFormat, Utc};
use std::collections::BTreeSet;
use std::fmt;
use std::time::Instant;

/// What a run preserves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreservationMode {
    /// Content and metadata of records ready for archival
    Full,
    /// Fresh metadata for already preserved records that changed since
    UpdateOnly,
}

impl PreservationMode {
    /// Records a run of this mode selects by default.
    pub fn default_selection(self, update_window_days: u32) -> Selection {
        match self {
            Self::Full => Selection::ReadyForArchival,
            Self::UpdateOnly => Selection::UpdatePending {
                days: update_window_days,
            },
        }
    }

    /// Whether objects of `kind` are packaged in this mode.
    pub fn packages(self, kind: ObjectKind) -> bool {
        !(self == Self::UpdateOnly && kind == ObjectKind::Resource)
    }
}

impl fmt::Display for PreservationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Full => "full",
            Self::UpdateOnly => "update-only",
        })
    }
}

/// Deployment settings a run needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineSettings {
    pub algorithm: ChecksumAlgorithm,
    pub required_fields: RequiredFields,
    pub update_window_days: u32,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self::from(&KeepsakeConfig::default())
    }
}

impl From<&KeepsakeConfig> for PipelineSettings {
    fn from(config: &KeepsakeConfig) -> Self {
        Self {
            algorithm: config.checksum_algorithm,
            required_fields: config.required_fields.clone(),
            update_window_days: config.update_window_days,
        }
    }
}

/// What one record left in the packager's buffer.
#[derive(Debug, Default)]
struct PackagedRecord {
    collection_id: String,
    resource_package: Option<String>,
    /// Superseded `metadataId ## packageId` reference (update runs)
    history_line: Option<String>,
}

/// Packages the records of a catalog.
pub struct PreservationPipeline<'a, C, P, T> {
    catalog: &'a C,
    packager: &'a mut P,
    transformer: &'a T,
    settings: PipelineSettings,
    assigner: IdentityAssigner,
}

impl<'a, C, P, T> PreservationPipeline<'a, C, P, T>
where
    C: Catalog,
    P: Packager,
    T: Transformer,
{
    pub fn new(
        catalog: &'a C,
        packager: &'a mut P,
        transformer: &'a T,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            catalog,
            packager,
            transformer,
            settings,
            assigner: IdentityAssigner::new(),
        }
    }

    /// Preserve the records `mode` selects by default.
    ///
    /// # Errors
    ///
    /// Only fatal errors are returned; record failures are in the result.
    pub fn preserve_catalog(&mut self, catalog_name: &str, mode: PreservationMode) -> Result<RunResult> {
        let selection = mode.default_selection(self.settings.update_window_days);
        self.preserve_selection(catalog_name, &selection, mode)
    }

    /// Preserve the records of an explicit selection.
    ///
    /// # Errors
    ///
    /// Returns the fatal error that ended the run (bad selection, catalog
    /// failure). Anything buffered in the packager is discarded first.
    pub fn preserve_selection(
        &mut self,
        catalog_name: &str,
        selection: &Selection,
        mode: PreservationMode,
    ) -> Result<RunResult> {
        let start = Instant::now();

        let query = selection.query(catalog_name, Local::now().date_naive())?;
        let mut records = self
            .catalog
            .find(&query)
            .with_context(|| format!("Failed to select records ({query})"))?;

        tracing::info!(
            catalog = catalog_name,
            %mode,
            records = records.len(),
            "Starting preservation run"
        );

        let mut outcomes = Vec::with_capacity(records.len());
        let packaged = match self.preserve_records(&mut records, mode, &mut outcomes) {
            Ok(packaged) => packaged,
            Err(e) => {
                self.packager.discard();
                return Err(e);
            }
        };

        self.finalize(&mut records, &packaged, &mut outcomes)?;

        let result = RunResult::new(outcomes, start.elapsed());
        tracing::info!(catalog = catalog_name, %mode, "{}", result.report.summary());
        Ok(result)
    }

    /// Preserve each record in turn. Record failures are written onto the
    /// record; a fatal error stops the loop and is returned.
    fn preserve_records(
        &mut self,
        records: &mut [C::Record],
        mode: PreservationMode,
        outcomes: &mut Vec<RecordOutcome>,
    ) -> Result<Vec<Option<PackagedRecord>>> {
        let mut packaged = Vec::with_capacity(records.len());

        for record in records.iter_mut() {
            let uuid = record.uuid().to_owned();
            match self.preserve_record(record, mode) {
                Ok(done) => {
                    outcomes.push(RecordOutcome {
                        uuid,
                        state: RecordState::Completed,
                    });
                    packaged.push(Some(done));
                }
                Err(e) if e.is_fatal() => {
                    tracing::error!(record = %uuid, error = %e, "Preservation run aborted");
                    return Err(e);
                }
                Err(e) => {
                    let message = e.to_string();
                    tracing::warn!(record = %uuid, error = %message, "Record preservation failed");
                    mark_failed(record, &message)?;
                    outcomes.push(RecordOutcome {
                        uuid,
                        state: RecordState::Failed(message),
                    });
                    packaged.push(None);
                }
            }
        }

        Ok(packaged)
    }

    fn preserve_record(&mut self, record: &mut C::Record, mode: PreservationMode) -> Result<PackagedRecord> {
        let history_line = match mode {
            PreservationMode::UpdateOnly => previous_package_reference(record)?,
            PreservationMode::Full => {
                self.initialize_content(record)?;
                None
            }
        };

        self.assigner.ensure_intellectual_entity_id(record)?;
        self.assigner.reset_metadata_id(record)?;
        let role = AssetRole::of(record)?;
        let representation = if role.is_master() {
            Some(self.assigner.split_for_representation(record)?)
        } else {
            None
        };

        self.check_preconditions(record)?;

        let identity = RecordIdentity::read(record, representation)?;
        let plan = RecordDecomposer::decompose(&identity, role)?;

        let mut standards = BTreeSet::new();
        let mut packaged = PackagedRecord {
            collection_id: identity.collection_id.clone(),
            resource_package: None,
            history_line,
        };

        for planned in plan.iter().filter(|p| mode.packages(p.kind)) {
            let mut object = self.materialize(record, &identity, planned, &mut standards)?;
            self.packager
                .pack(&mut object)
                .with_context(|| format!("Failed to package {} {}", planned.kind, planned.identifier))?;

            let package_id = object.package_id.ok_or_else(|| {
                KeepsakeError::ArchiveIo(format!(
                    "packager assigned no package to {} {}",
                    planned.kind, planned.identifier
                ))
            })?;
            tracing::debug!(
                record = record.uuid(),
                kind = %planned.kind,
                object = %planned.identifier,
                package = %package_id,
                "Packed object"
            );

            match planned.kind {
                ObjectKind::Resource => {
                    record.set_field_value(fields::RESOURCE_PACKAGE_ID, &package_id)?;
                    packaged.resource_package = Some(package_id);
                }
                ObjectKind::Metadata => {
                    record.set_field_value(fields::METADATA_PACKAGE_ID, &package_id)?;
                }
                ObjectKind::RepresentationMetadata | ObjectKind::IntellectualEntity => {}
            }
        }

        if !standards.is_empty() {
            let listed: Vec<String> = standards.into_iter().collect();
            record.set_field_value(fields::METADATA_STANDARDS, &listed.join("\n"))?;
        }

        Ok(packaged)
    }

    /// Checksum and size of the content file. A stored checksum must match.
    fn initialize_content(&self, record: &mut C::Record) -> Result<()> {
        let path = record.content_path()?;
        let checksum = compute_file_checksum(&path, self.settings.algorithm)?;

        match record.field_value(fields::CONTENT_CHECKSUM)? {
            Some(stored) if !digests_equal(&stored, &checksum) => {
                return Err(KeepsakeError::IntegrityMismatch(format!(
                    "content file {} has {} {checksum}, catalog holds {stored}",
                    path.display(),
                    self.settings.algorithm
                )));
            }
            Some(_) => {}
            None => record.set_field_value(fields::CONTENT_CHECKSUM, &checksum)?,
        }

        let size = std::fs::metadata(&path)
            .with_context(|| format!("Failed to stat {}", path.display()))?
            .len();
        record.set_field_value(fields::FILE_SIZE, &size.to_string())
    }

    fn check_preconditions(&self, record: &C::Record) -> Result<()> {
        let mut problems = Vec::new();

        for field in &self.settings.required_fields.base {
            if !record.has_field(field) {
                problems.push(format!("'{field}' does not exist"));
            } else if !record.has_value(field)? {
                problems.push(format!("'{field}' has no value"));
            }
        }

        let written = self
            .settings
            .required_fields
            .writable
            .iter()
            .map(String::as_str)
            .chain(fields::PRESERVATION_WRITTEN_FIELDS.iter().copied());
        for field in written {
            if !record.has_field(field) {
                problems.push(format!("'{field}' does not exist"));
            } else if !record.is_field_writable(field) {
                problems.push(format!("'{field}' is not writable"));
            }
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(KeepsakeError::RequiredField(format!(
                "record {} is not ready for preservation: {}",
                record.uuid(),
                problems.join("; ")
            )))
        }
    }

    fn materialize(
        &self,
        record: &C::Record,
        identity: &RecordIdentity,
        planned: &PlannedObject,
        standards: &mut BTreeSet<String>,
    ) -> Result<ArchivalObject> {
        let input = match &planned.source {
            ObjectSource::Content => {
                return Ok(ArchivalObject::new(
                    planned.identifier.clone(),
                    planned.kind,
                    Payload::File(record.content_path()?),
                    identity.collection_id.clone(),
                ));
            }
            ObjectSource::CatalogFields => record_to_xml(record, &planned.identifier)?,
            ObjectSource::IntellectualEntity(stub) => stub.to_xml()?,
        };

        let kind = planned.kind.transform_kind().ok_or_else(|| {
            KeepsakeError::Transformation(format!("{} objects are not transformed", planned.kind))
        })?;
        let output = self
            .transformer
            .transform(kind, &input)
            .with_context(|| format!("Failed to transform {kind} {}", planned.identifier))?;
        self.transformer
            .validate(kind, &output)
            .with_context(|| format!("Invalid {kind} document {}", planned.identifier))?;
        standards.extend(self.transformer.metadata_standards(&output)?);

        Ok(ArchivalObject::new(
            planned.identifier.clone(),
            planned.kind,
            Payload::Bytes(output.into_bytes()),
            identity.collection_id.clone(),
        ))
    }

    /// Upload the run's packages, then settle the status of every record
    /// that was packaged.
    fn finalize(
        &mut self,
        records: &mut [C::Record],
        packaged: &[Option<PackagedRecord>],
        outcomes: &mut [RecordOutcome],
    ) -> Result<()> {
        let upload = match self.packager.upload_all() {
            Ok(upload) => upload,
            Err(e) => {
                tracing::error!(error = %e, "Package upload failed");
                self.packager.discard();
                let message = format!("Upload failed: {e}");
                for ((record, outcome), done) in records.iter_mut().zip(outcomes.iter_mut()).zip(packaged) {
                    if done.is_some() {
                        mark_failed(record, &message)?;
                        outcome.state = RecordState::Failed(message.clone());
                    }
                }
                return Ok(());
            }
        };

        let preserved_at = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
        for ((record, outcome), done) in records.iter_mut().zip(outcomes.iter_mut()).zip(packaged) {
            let Some(done) = done else { continue };

            let completed = match upload.failure_for(&done.collection_id) {
                Some(failed) => Err(KeepsakeError::ArchiveIo(format!(
                    "Upload failed: package {} of collection {}: {}",
                    failed.package_id, failed.collection_id, failed.reason
                ))),
                None => complete_record(record, done, &upload.uploaded, &preserved_at),
            };

            if let Err(e) = completed {
                if e.is_fatal() {
                    return Err(e);
                }
                let message = e.to_string();
                tracing::warn!(record = record.uuid(), error = %message, "Could not complete record");
                mark_failed(record, &message)?;
                outcome.state = RecordState::Failed(message);
            }
        }
        Ok(())
    }
}

/// `metadataId ## packageId` of the metadata package an update supersedes.
fn previous_package_reference<R: CatalogRecord + ?Sized>(record: &R) -> Result<Option<String>> {
    let metadata_id = record.field_value(fields::METADATA_GUID)?;
    let package_id = record.field_value(fields::METADATA_PACKAGE_ID)?;
    Ok(metadata_id
        .zip(package_id)
        .map(|(metadata, package)| format!("{metadata} ## {package}")))
}

fn complete_record<R: CatalogRecord + ?Sized>(
    record: &mut R,
    packaged: &PackagedRecord,
    uploaded: &[UploadedPackage],
    preserved_at: &str,
) -> Result<()> {
    if let Some(package_id) = &packaged.resource_package {
        let package = uploaded
            .iter()
            .find(|u| u.package_id == *package_id && u.collection_id == packaged.collection_id)
            .ok_or_else(|| {
                KeepsakeError::ArchiveIo(format!(
                    "package {package_id} of collection {} was not uploaded",
                    packaged.collection_id
                ))
            })?;
        record.set_field_value(fields::ARCHIVE_CHECKSUM, &package.checksum)?;
    }

    if let Some(line) = &packaged.history_line {
        record.append_field_line(fields::METADATA_HISTORY, line)?;
    }

    record.set_field_value(
        fields::PRESERVATION_STATUS,
        PreservationStatus::ArchivalCompleted.as_str(),
    )?;
    record.set_field_value(fields::PRESERVATION_ERROR, "")?;
    record.set_field_value(fields::PRESERVATION_DATE, preserved_at)
}

/// Write a failure onto the record. Only a fatal write error is returned.
fn mark_failed<R: CatalogRecord + ?Sized>(record: &mut R, message: &str) -> Result<()> {
    let written = record
        .set_field_value(
            fields::PRESERVATION_STATUS,
            PreservationStatus::ArchivalFailed.as_str(),
        )
        .and_then(|()| record.set_field_value(fields::PRESERVATION_ERROR, message));

    match written {
        Err(e) if e.is_fatal() => Err(e),
        Err(e) => {
            tracing::warn!(record = record.uuid(), error = %e, "Could not record failure");
            Ok(())
        }
        Ok(()) => Ok(()),
    }
}
