//! Literal catalog field names and the status vocabularies stored in them.

use crate::error::KeepsakeError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Record identity GUID.
pub const GUID: &str = "GUID";
/// Name of the catalog the record belongs to.
pub const CATALOG_NAME: &str = "Catalog Name";
/// Registration workflow state; only `Finished` records are preserved.
pub const REGISTRATION_STATE: &str = "Registration State";
/// Value of [`REGISTRATION_STATE`] for fully registered records.
pub const REGISTRATION_FINISHED: &str = "Finished";

pub const PRESERVATION_STATUS: &str = "Preservation status";
/// Free-text error of the last failed preservation attempt.
pub const PRESERVATION_ERROR: &str = "Preservation error";
/// When the record was last confirmed archived.
pub const PRESERVATION_DATE: &str = "Preservation date";
/// Catalog-maintained modification timestamp.
pub const LAST_MODIFIED: &str = "Record Modification Date";

pub const VALIDATION_STATUS: &str = "Preservation validation";
pub const VALIDATION_MESSAGE: &str = "Preservation validation message";

/// Checksum of the original master content file.
pub const CONTENT_CHECKSUM: &str = "Content checksum";
/// Size in bytes of the content file.
pub const FILE_SIZE: &str = "File data size";
/// Checksum of the package holding the resource, as reported at upload.
pub const ARCHIVE_CHECKSUM: &str = "Archive checksum";

pub const METADATA_GUID: &str = "Metadata GUID";
pub const REPRESENTATION_METADATA_GUID: &str = "Representation metadata GUID";
pub const INTELLECTUAL_ENTITY_GUID: &str = "Intellectual entity GUID";
pub const REPRESENTATION_INTELLECTUAL_ENTITY_GUID: &str = "Representation intellectual entity GUID";

pub const COLLECTION_ID: &str = "Collection ID";
pub const RESOURCE_PACKAGE_ID: &str = "Resource package ID";
pub const METADATA_PACKAGE_ID: &str = "Metadata package ID";
/// One `metadataId ## packageId` line per superseded metadata package.
pub const METADATA_HISTORY: &str = "Metadata package history";
/// Namespaces declared by the transformed metadata, one per line.
pub const METADATA_STANDARDS: &str = "Metadata standards";

/// Relation to component records. A value here makes the record a master asset.
pub const RELATED_SUB_ASSETS: &str = "Related Sub Assets";
/// Relation to the owning master asset(s).
pub const RELATED_MASTER_ASSETS: &str = "Related Master Assets";

/// Separator between the segments of a combined identifier.
pub const COMBINED_ID_SEPARATOR: &str = "##";

/// Fields the preservation pipeline writes. They must all be writable before a
/// record is packaged.
pub const PRESERVATION_WRITTEN_FIELDS: &[&str] = &[
    PRESERVATION_STATUS,
    PRESERVATION_ERROR,
    PRESERVATION_DATE,
    CONTENT_CHECKSUM,
    FILE_SIZE,
    ARCHIVE_CHECKSUM,
    METADATA_GUID,
    REPRESENTATION_METADATA_GUID,
    INTELLECTUAL_ENTITY_GUID,
    REPRESENTATION_INTELLECTUAL_ENTITY_GUID,
    RESOURCE_PACKAGE_ID,
    METADATA_PACKAGE_ID,
    METADATA_HISTORY,
    METADATA_STANDARDS,
];

/// Every field name this crate refers to.
pub const STANDARD_FIELDS: &[&str] = &[
    GUID,
    CATALOG_NAME,
    REGISTRATION_STATE,
    PRESERVATION_STATUS,
    PRESERVATION_ERROR,
    PRESERVATION_DATE,
    LAST_MODIFIED,
    VALIDATION_STATUS,
    VALIDATION_MESSAGE,
    CONTENT_CHECKSUM,
    FILE_SIZE,
    ARCHIVE_CHECKSUM,
    METADATA_GUID,
    REPRESENTATION_METADATA_GUID,
    INTELLECTUAL_ENTITY_GUID,
    REPRESENTATION_INTELLECTUAL_ENTITY_GUID,
    COLLECTION_ID,
    RESOURCE_PACKAGE_ID,
    METADATA_PACKAGE_ID,
    METADATA_HISTORY,
    METADATA_STANDARDS,
    RELATED_SUB_ASSETS,
    RELATED_MASTER_ASSETS,
];

/// Values of the [`PRESERVATION_STATUS`] field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PreservationStatus {
    ReadyForArchival,
    ArchivalCompleted,
    ArchivalFailed,
    NoArchival,
}

impl PreservationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ReadyForArchival => "Ready for archival",
            Self::ArchivalCompleted => "Archival completed",
            Self::ArchivalFailed => "Archival failed",
            Self::NoArchival => "No archival",
        }
    }
}

impl fmt::Display for PreservationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PreservationStatus {
    type Err = KeepsakeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [
            Self::ReadyForArchival,
            Self::ArchivalCompleted,
            Self::ArchivalFailed,
            Self::NoArchival,
        ]
        .into_iter()
        .find(|status| status.as_str().eq_ignore_ascii_case(s.trim()))
        .ok_or_else(|| KeepsakeError::Argument(format!("unknown preservation status '{s}'")))
    }
}

/// Values of the [`VALIDATION_STATUS`] field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValidationStatus {
    Ok,
    SimpleCheckPending,
    FullCheckPending,
    Failed,
}

impl ValidationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::SimpleCheckPending => "Simple check",
            Self::FullCheckPending => "Full check",
            Self::Failed => "Failed",
        }
    }
}

impl fmt::Display for ValidationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ValidationStatus {
    type Err = KeepsakeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [
            Self::Ok,
            Self::SimpleCheckPending,
            Self::FullCheckPending,
            Self::Failed,
        ]
        .into_iter()
        .find(|status| status.as_str().eq_ignore_ascii_case(s.trim()))
        .ok_or_else(|| KeepsakeError::Argument(format!("unknown validation status '{s}'")))
    }
}
