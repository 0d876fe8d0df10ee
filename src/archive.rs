//! Archival packaging and retrieval.
//!
//! Two seams separate the pipeline from any particular archive:
//!
//! - [`Packager`] buffers archival objects into packages and uploads them
//! - [`ArchiveStore`] hands back uploaded packages and their checksums
//!
//! A packager instance belongs to exactly one run. Objects handed to
//! [`Packager::pack`] stay buffered until [`Packager::upload_all`] is called
//! once at the end of the run. A run that aborts calls [`Packager::discard`]
//! instead, so nothing half-built is left behind.
//!
//! [`local::LocalArchive`] implements both traits on a directory tree, storing
//! every package as a WARC file (see [`warc`]).

pub mod local;
pub mod warc;

pub use local::LocalArchive;
pub use warc::{WarcHeader, WarcReader, WarcWriter};

use crate::error::Result;
use crate::preservation::ArchivalObject;
use std::path::PathBuf;

/// A package that reached the archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedPackage {
    pub package_id: String,
    pub collection_id: String,
    /// Checksum of the package file as stored
    pub checksum: String,
}

/// A package that could not be uploaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedUpload {
    pub package_id: String,
    pub collection_id: String,
    pub reason: String,
}

/// Outcome of [`Packager::upload_all`], per package.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadReport {
    pub uploaded: Vec<UploadedPackage>,
    pub failed: Vec<FailedUpload>,
}

impl UploadReport {
    /// The failure of the package buffered for `collection_id`, if it failed.
    pub fn failure_for(&self, collection_id: &str) -> Option<&FailedUpload> {
        self.failed.iter().find(|f| f.collection_id == collection_id)
    }
}

/// Buffers archival objects into packages.
pub trait Packager {
    /// Buffer `object` and assign it the id of the package it went into.
    ///
    /// On success `object.package_id` is set.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::KeepsakeError::ArchiveIo`] if the object cannot
    /// be buffered.
    fn pack(&mut self, object: &mut ArchivalObject) -> Result<()>;

    /// Upload every buffered package and empty the buffer.
    ///
    /// Packages are uploaded independently: one that fails is reported in
    /// [`UploadReport::failed`] and removed from the buffer without affecting
    /// the others.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::KeepsakeError::ArchiveIo`] when the archive
    /// cannot be reached at all; nothing was uploaded in that case.
    fn upload_all(&mut self) -> Result<UploadReport>;

    /// Drop every buffered package without uploading it.
    fn discard(&mut self);
}

/// Read access to uploaded packages.
pub trait ArchiveStore {
    /// Local path to the package file.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::KeepsakeError::ArchiveIo`] if the package is
    /// not in the archive.
    fn get_file(&self, package_id: &str, collection_id: &str) -> Result<PathBuf>;

    /// Checksum the archive recorded for the package.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::KeepsakeError::ArchiveIo`] if the package or
    /// its recorded checksum is missing.
    fn get_checksum(&self, package_id: &str, collection_id: &str) -> Result<String>;
}
