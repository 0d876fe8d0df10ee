//! Archival objects and asset roles.

use crate::catalog::CatalogRecord;
use crate::catalog::fields;
use crate::error::{Result, ResultExt as _};
use crate::transform::TransformKind;
use std::fmt;
use std::fs::File;
use std::io::{BufReader, Cursor, Read};
use std::path::PathBuf;

/// What an archival object holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    /// The binary content file
    Resource,
    /// Transformed technical/descriptive metadata
    Metadata,
    /// Metadata of the representation of a master asset
    RepresentationMetadata,
    /// Work-level descriptor
    IntellectualEntity,
}

impl ObjectKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Resource => "resource",
            Self::Metadata => "metadata",
            Self::RepresentationMetadata => "representation-metadata",
            Self::IntellectualEntity => "intellectual-entity",
        }
    }

    /// MIME type of the payload.
    pub fn content_type(self) -> &'static str {
        match self {
            Self::Resource => "application/octet-stream",
            Self::Metadata | Self::RepresentationMetadata | Self::IntellectualEntity => {
                "text/xml"
            }
        }
    }

    /// Transformation producing the payload, `None` for the raw resource.
    pub fn transform_kind(self) -> Option<TransformKind> {
        match self {
            Self::Resource => None,
            Self::Metadata => Some(TransformKind::Metadata),
            Self::RepresentationMetadata => Some(TransformKind::RepresentationMetadata),
            Self::IntellectualEntity => Some(TransformKind::IntellectualEntity),
        }
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Bytes of an archival object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    File(PathBuf),
    Bytes(Vec<u8>),
}

impl Payload {
    /// Open the payload for streaming.
    ///
    /// # Errors
    ///
    /// Returns error if a file payload cannot be opened.
    pub fn open(&self) -> Result<Box<dyn Read + '_>> {
        match self {
            Self::File(path) => {
                let file = File::open(path)
                    .with_context(|| format!("Failed to open payload {}", path.display()))?;
                Ok(Box::new(BufReader::new(file)))
            }
            Self::Bytes(bytes) => Ok(Box::new(Cursor::new(bytes.as_slice()))),
        }
    }

    /// Payload size in bytes.
    ///
    /// # Errors
    ///
    /// Returns error if a file payload cannot be stat'ed.
    pub fn len(&self) -> Result<u64> {
        match self {
            Self::File(path) => Ok(std::fs::metadata(path)
                .with_context(|| format!("Failed to stat payload {}", path.display()))?
                .len()),
            Self::Bytes(bytes) => Ok(bytes.len() as u64),
        }
    }

    /// # Errors
    ///
    /// Returns error if a file payload cannot be stat'ed.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

/// One object handed to the packager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchivalObject {
    pub identifier: String,
    pub kind: ObjectKind,
    pub payload: Payload,
    pub collection_id: String,
    /// Assigned by the packager
    pub package_id: Option<String>,
}

impl ArchivalObject {
    pub fn new(
        identifier: impl Into<String>,
        kind: ObjectKind,
        payload: Payload,
        collection_id: impl Into<String>,
    ) -> Self {
        Self {
            identifier: identifier.into(),
            kind,
            payload,
            collection_id: collection_id.into(),
            package_id: None,
        }
    }
}

/// Position of a record in the master/sub-asset relation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetRole {
    /// Has sub-assets; also wins when the record is a sub-asset itself
    Master,
    /// Component of some master asset
    Sub,
    Plain,
}

impl AssetRole {
    /// Determine the role from the record's relation fields.
    ///
    /// # Errors
    ///
    /// Returns the catalog error if a relation field cannot be read.
    pub fn of<R: CatalogRecord + ?Sized>(record: &R) -> Result<Self> {
        if record.has_value(fields::RELATED_SUB_ASSETS)? {
            Ok(Self::Master)
        } else if record.has_value(fields::RELATED_MASTER_ASSETS)? {
            Ok(Self::Sub)
        } else {
            Ok(Self::Plain)
        }
    }

    pub fn is_master(self) -> bool {
        self == Self::Master
    }
}
