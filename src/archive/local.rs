//! Directory-backed archive.
//!
//! ```text
//! <root>/
//!   .staging/<package>.warc           buffered, not yet uploaded
//!   <collection>/<package>.warc       uploaded package
//!   <collection>/<package>.warc.md5   checksum recorded at upload
//! ```
//!
//! Each instance stages one package per collection. Uploading moves the
//! staged files into place and records their checksums next to them.

use super::warc::{self, WarcHeader, WarcWriter};
use super::{ArchiveStore, FailedUpload, Packager, UploadReport, UploadedPackage};
use crate::error::{KeepsakeError, Result};
use crate::identity::fresh_guid;
use crate::integrity::{ChecksumAlgorithm, compute_file_checksum};
use crate::preservation::{ArchivalObject, ObjectKind};
use chrono::{SecondsFormat, Utc};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write as _};
use std::path::{Path, PathBuf};

const STAGING_DIR: &str = ".staging";
const PACKAGE_EXTENSION: &str = "warc";

struct StagedPackage {
    package_id: String,
    path: PathBuf,
    writer: WarcWriter<BufWriter<File>>,
}

/// Archive rooted at a local directory.
pub struct LocalArchive {
    root: PathBuf,
    algorithm: ChecksumAlgorithm,
    staged: BTreeMap<String, StagedPackage>,
}

impl std::fmt::Debug for LocalArchive {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalArchive")
            .field("root", &self.root)
            .field("algorithm", &self.algorithm)
            .field("staged", &self.staged.keys().collect::<Vec<_>>())
            .finish()
    }
}

fn archive_err(context: String) -> impl FnOnce(io::Error) -> KeepsakeError {
    move |e| KeepsakeError::ArchiveIo(format!("{context}: {e}"))
}

/// Reject ids that would escape the archive directory.
fn check_path_component(kind: &str, value: &str) -> Result<()> {
    let value = value.trim();
    if value.is_empty()
        || value == "."
        || value.contains("..")
        || value.contains(['/', '\\'])
        || value.starts_with('.')
    {
        return Err(KeepsakeError::ArchiveIo(format!(
            "{kind} '{value}' is not usable as an archive path"
        )));
    }
    Ok(())
}

impl LocalArchive {
    /// Open (and create if needed) an archive at `root`.
    ///
    /// # Errors
    ///
    /// Returns [`KeepsakeError::ArchiveIo`] if the directories cannot be created.
    pub fn open(root: impl Into<PathBuf>, algorithm: ChecksumAlgorithm) -> Result<Self> {
        let root = root.into();
        let staging = root.join(STAGING_DIR);
        fs::create_dir_all(&staging).map_err(archive_err(format!(
            "Failed to create archive staging directory {}",
            staging.display()
        )))?;

        Ok(Self {
            root,
            algorithm,
            staged: BTreeMap::new(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Number of packages waiting for upload.
    pub fn staged_count(&self) -> usize {
        self.staged.len()
    }

    /// Where an uploaded package lives.
    pub fn package_path(&self, package_id: &str, collection_id: &str) -> PathBuf {
        self.root
            .join(collection_id)
            .join(format!("{package_id}.{PACKAGE_EXTENSION}"))
    }

    fn checksum_path(&self, package_id: &str, collection_id: &str) -> PathBuf {
        self.root.join(collection_id).join(format!(
            "{package_id}.{PACKAGE_EXTENSION}.{}",
            self.algorithm.as_str()
        ))
    }

    fn stage(&mut self, collection_id: &str) -> Result<&mut StagedPackage> {
        if !self.staged.contains_key(collection_id) {
            let package_id = fresh_guid();
            let path = self
                .root
                .join(STAGING_DIR)
                .join(format!("{package_id}.{PACKAGE_EXTENSION}"));
            let file = File::create(&path).map_err(archive_err(format!(
                "Failed to create staging package {}",
                path.display()
            )))?;

            tracing::debug!(collection = collection_id, package = %package_id, "Opened staging package");
            self.staged.insert(
                collection_id.to_owned(),
                StagedPackage {
                    package_id,
                    path,
                    writer: WarcWriter::new(BufWriter::new(file)),
                },
            );
        }

        self.staged.get_mut(collection_id).ok_or_else(|| {
            KeepsakeError::ArchiveIo(format!("no staging package for collection {collection_id}"))
        })
    }

    fn publish(&self, collection_id: &str, staged: StagedPackage) -> Result<UploadedPackage> {
        let StagedPackage {
            package_id,
            path,
            writer,
        } = staged;

        let mut buffered = writer.into_inner();
        buffered.flush().map_err(archive_err(format!(
            "Failed to flush staging package {}",
            path.display()
        )))?;
        drop(buffered);

        let checksum = compute_file_checksum(&path, self.algorithm)
            .map_err(|e| KeepsakeError::ArchiveIo(e.to_string()))?;

        let destination = self.package_path(&package_id, collection_id);
        if let Some(dir) = destination.parent() {
            fs::create_dir_all(dir).map_err(archive_err(format!(
                "Failed to create collection directory {}",
                dir.display()
            )))?;
        }
        fs::rename(&path, &destination).map_err(archive_err(format!(
            "Failed to move package into {}",
            destination.display()
        )))?;

        let sidecar = self.checksum_path(&package_id, collection_id);
        if let Err(e) = fs::write(&sidecar, format!("{checksum}\n")) {
            // A package without its recorded checksum is not in the archive.
            remove_quietly(&destination);
            return Err(KeepsakeError::ArchiveIo(format!(
                "Failed to record checksum {}: {e}",
                sidecar.display()
            )));
        }

        Ok(UploadedPackage {
            package_id,
            collection_id: collection_id.to_owned(),
            checksum,
        })
    }
}

fn remove_quietly(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(path = %path.display(), error = %e, "Could not remove package file"),
    }
}

impl Packager for LocalArchive {
    fn pack(&mut self, object: &mut ArchivalObject) -> Result<()> {
        check_path_component("collection id", &object.collection_id)?;

        let header = WarcHeader {
            warc_type: match object.kind {
                ObjectKind::Resource => "resource",
                _ => "metadata",
            }
            .to_owned(),
            record_id: warc::record_id(&object.identifier),
            date: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            content_type: object.kind.content_type().to_owned(),
            content_length: object.payload.len()?,
            extra: vec![("Keepsake-Object-Kind".to_owned(), object.kind.as_str().to_owned())],
        };
        let payload = object.payload.open()?;

        let staged = self.stage(&object.collection_id)?;
        staged.writer.write_record(&header, payload).map_err(|e| match e {
            KeepsakeError::Io(io) => {
                KeepsakeError::ArchiveIo(format!("Failed to write {}: {io}", header.record_id))
            }
            other => other,
        })?;

        object.package_id = Some(staged.package_id.clone());
        Ok(())
    }

    fn upload_all(&mut self) -> Result<UploadReport> {
        let staged = std::mem::take(&mut self.staged);
        let mut report = UploadReport::default();

        for (collection_id, package) in staged {
            let records = package.writer.records();
            let package_id = package.package_id.clone();
            let staging_path = package.path.clone();

            match self.publish(&collection_id, package) {
                Ok(published) => {
                    tracing::info!(
                        collection = %collection_id,
                        package = %published.package_id,
                        records,
                        checksum = %published.checksum,
                        "Uploaded package"
                    );
                    report.uploaded.push(published);
                }
                Err(e) => {
                    tracing::error!(
                        collection = %collection_id,
                        package = %package_id,
                        error = %e,
                        "Package upload failed"
                    );
                    remove_quietly(&staging_path);
                    report.failed.push(FailedUpload {
                        package_id,
                        collection_id,
                        reason: e.to_string(),
                    });
                }
            }
        }

        Ok(report)
    }

    fn discard(&mut self) {
        for (collection_id, package) in std::mem::take(&mut self.staged) {
            let StagedPackage { package_id, path, writer } = package;
            drop(writer);
            remove_quietly(&path);
            tracing::debug!(collection = %collection_id, package = %package_id, "Discarded staging package");
        }
    }
}

impl ArchiveStore for LocalArchive {
    fn get_file(&self, package_id: &str, collection_id: &str) -> Result<PathBuf> {
        check_path_component("package id", package_id)?;
        check_path_component("collection id", collection_id)?;

        let path = self.package_path(package_id, collection_id);
        if path.is_file() {
            Ok(path)
        } else {
            Err(KeepsakeError::ArchiveIo(format!(
                "package {package_id} not found in collection {collection_id}"
            )))
        }
    }

    fn get_checksum(&self, package_id: &str, collection_id: &str) -> Result<String> {
        check_path_component("package id", package_id)?;
        check_path_component("collection id", collection_id)?;

        let sidecar = self.checksum_path(package_id, collection_id);
        let raw = fs::read_to_string(&sidecar).map_err(archive_err(format!(
            "No checksum recorded for package {package_id} in collection {collection_id}"
        )))?;
        Ok(raw.trim().to_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::WarcReader;
    use crate::integrity::compute_checksum;
    use crate::preservation::Payload;
    use std::io::BufReader;
    use tempfile::TempDir;

    fn object(id: &str, kind: ObjectKind, collection: &str, bytes: &[u8]) -> ArchivalObject {
        ArchivalObject::new(id, kind, Payload::Bytes(bytes.to_vec()), collection)
    }

    #[test]
    fn test_one_package_per_collection() {
        let dir = TempDir::new().unwrap();
        let mut archive = LocalArchive::open(dir.path(), ChecksumAlgorithm::Md5).unwrap();

        let mut a = object("a", ObjectKind::Resource, "books", b"aaa");
        let mut b = object("b", ObjectKind::Metadata, "books", b"<b/>");
        let mut c = object("c", ObjectKind::Resource, "maps", b"ccc");
        archive.pack(&mut a).unwrap();
        archive.pack(&mut b).unwrap();
        archive.pack(&mut c).unwrap();

        assert_eq!(a.package_id, b.package_id);
        assert_ne!(a.package_id, c.package_id);
        assert_eq!(archive.staged_count(), 2);

        let report = archive.upload_all().unwrap();
        assert_eq!(report.uploaded.len(), 2);
        assert!(report.failed.is_empty());
        assert_eq!(archive.staged_count(), 0);
    }

    #[test]
    fn test_upload_records_checksum() {
        let dir = TempDir::new().unwrap();
        let mut archive = LocalArchive::open(dir.path(), ChecksumAlgorithm::Md5).unwrap();

        let mut a = object("rec-1", ObjectKind::Resource, "books", b"payload");
        archive.pack(&mut a).unwrap();
        let uploaded = archive.upload_all().unwrap().uploaded.remove(0);
        let package_id = a.package_id.unwrap();

        assert_eq!(uploaded.package_id, package_id);
        assert_eq!(
            archive.get_checksum(&package_id, "books").unwrap(),
            uploaded.checksum
        );

        let path = archive.get_file(&package_id, "books").unwrap();
        let bytes = fs::read(&path).unwrap();
        assert_eq!(
            compute_checksum(&bytes[..], ChecksumAlgorithm::Md5).unwrap(),
            uploaded.checksum
        );

        let mut reader = WarcReader::new(BufReader::new(File::open(path).unwrap()));
        let header = reader.next_header().unwrap().unwrap();
        assert_eq!(header.record_id, "<urn:uuid:rec-1>");
        assert_eq!(header.warc_type, "resource");
        let mut payload = Vec::new();
        reader.copy_payload(&mut payload).unwrap();
        assert_eq!(payload, b"payload");
    }

    #[test]
    fn test_missing_package() {
        let dir = TempDir::new().unwrap();
        let archive = LocalArchive::open(dir.path(), ChecksumAlgorithm::Md5).unwrap();

        let err = archive.get_file("nope", "books").unwrap_err();
        assert!(matches!(err, KeepsakeError::ArchiveIo(_)));
        assert!(archive.get_checksum("nope", "books").is_err());
    }

    #[test]
    fn test_rejects_escaping_collection() {
        let dir = TempDir::new().unwrap();
        let mut archive = LocalArchive::open(dir.path(), ChecksumAlgorithm::Md5).unwrap();

        let mut bad = object("x", ObjectKind::Resource, "../outside", b"x");
        assert!(archive.pack(&mut bad).is_err());
        assert!(bad.package_id.is_none());
    }

    #[test]
    fn test_upload_without_objects() {
        let dir = TempDir::new().unwrap();
        let mut archive = LocalArchive::open(dir.path(), ChecksumAlgorithm::Md5).unwrap();
        assert_eq!(archive.upload_all().unwrap(), UploadReport::default());
    }

    fn staging_entries(archive: &LocalArchive) -> usize {
        fs::read_dir(archive.root().join(STAGING_DIR)).unwrap().count()
    }

    #[test]
    fn test_blocked_collection_does_not_affect_others() {
        let dir = TempDir::new().unwrap();
        let mut archive = LocalArchive::open(dir.path(), ChecksumAlgorithm::Md5).unwrap();
        // a plain file where the collection directory should go
        fs::write(dir.path().join("maps"), b"not a directory").unwrap();

        let mut book = object("book-1", ObjectKind::Resource, "books", b"pages");
        let mut map = object("map-1", ObjectKind::Resource, "maps", b"sheet");
        archive.pack(&mut book).unwrap();
        archive.pack(&mut map).unwrap();

        let report = archive.upload_all().unwrap();

        assert_eq!(report.uploaded.len(), 1);
        assert_eq!(report.uploaded[0].collection_id, "books");
        let failure = report.failure_for("maps").unwrap();
        assert_eq!(Some(&failure.package_id), map.package_id.as_ref());
        assert!(report.failure_for("books").is_none());

        let book_package = book.package_id.unwrap();
        assert!(archive.get_file(&book_package, "books").is_ok());
        assert_eq!(staging_entries(&archive), 0);
        assert_eq!(archive.staged_count(), 0);
    }

    #[test]
    fn test_discard_removes_staged_packages() {
        let dir = TempDir::new().unwrap();
        let mut archive = LocalArchive::open(dir.path(), ChecksumAlgorithm::Md5).unwrap();

        let mut a = object("a", ObjectKind::Resource, "books", b"aaa");
        archive.pack(&mut a).unwrap();
        assert_eq!(staging_entries(&archive), 1);

        archive.discard();

        assert_eq!(archive.staged_count(), 0);
        assert_eq!(staging_entries(&archive), 0);
        assert!(archive.get_file(&a.package_id.unwrap(), "books").is_err());
        assert!(archive.upload_all().unwrap().uploaded.is_empty());
    }
}
