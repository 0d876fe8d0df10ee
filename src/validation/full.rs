use super::timestamp;
use crate::archive::{ArchiveStore, WarcReader};
use crate::catalog::CatalogRecord;
use crate::catalog::fields;
use crate::error::{KeepsakeError, Result, ResultExt as _};
use crate::integrity::{ChecksumAlgorithm, compute_file_checksum, digests_equal, matches_identifier};
use std::fs::File;
use std::io::{BufReader, Write as _};
use std::path::Path;

/// Re-verify a record against its archived package.
///
/// 1. fetch the resource package
/// 2. package checksum vs. stored archive checksum
/// 3. locate the record's WARC record inside the package
/// 4. declared payload size vs. stored file size
/// 5. payload checksum vs. stored content checksum
///
/// The payload is copied to a scratch file under `scratch_dir` for hashing;
/// the file is removed however the check ends.
///
/// # Errors
///
/// Each failed step returns its own error; mismatches are
/// [`KeepsakeError::IntegrityMismatch`].
pub fn check_full<R, A>(
    record: &R,
    archive: &A,
    algorithm: ChecksumAlgorithm,
    scratch_dir: &Path,
) -> Result<String>
where
    R: CatalogRecord + ?Sized,
    A: ArchiveStore + ?Sized,
{
    let uuid = record.uuid();
    let package_id = record.required_value(fields::RESOURCE_PACKAGE_ID)?;
    let collection_id = record.required_value(fields::COLLECTION_ID)?;
    let package_checksum = record.required_value(fields::ARCHIVE_CHECKSUM)?;
    let content_checksum = record.required_value(fields::CONTENT_CHECKSUM)?;
    let stored_size = record.required_value(fields::FILE_SIZE)?;
    let stored_size: u64 = stored_size.trim().parse().map_err(|e| {
        KeepsakeError::RequiredField(format!("'{}' holds '{stored_size}', not a size: {e}", fields::FILE_SIZE))
    })?;

    let package = archive.get_file(&package_id, &collection_id)?;

    let actual = compute_file_checksum(&package, algorithm)?;
    if !digests_equal(&actual, &package_checksum) {
        return Err(KeepsakeError::IntegrityMismatch(format!(
            "package checksum mismatch for {package_id}: computed {actual}, catalog holds {package_checksum}"
        )));
    }

    let file = File::open(&package).with_context(|| format!("Failed to open {}", package.display()))?;
    let mut reader = WarcReader::new(BufReader::new(file));
    let header = loop {
        match reader.next_header()? {
            Some(header) if matches_identifier(&header.record_id, uuid) => break header,
            Some(_) => {}
            None => {
                return Err(KeepsakeError::ArchiveIo(format!(
                    "could not find record {uuid} in file {}",
                    package.display()
                )));
            }
        }
    };

    if header.content_length != stored_size {
        return Err(KeepsakeError::IntegrityMismatch(format!(
            "payload size mismatch for {uuid}: package declares {} bytes, catalog holds {stored_size}",
            header.content_length
        )));
    }

    let mut scratch = tempfile::Builder::new()
        .prefix(&scratch_prefix(uuid))
        .suffix(".payload")
        .tempfile_in(scratch_dir)
        .with_context(|| format!("Failed to create scratch file in {}", scratch_dir.display()))?;
    reader.copy_payload(scratch.as_file_mut())?;
    scratch.as_file_mut().flush()?;
    let payload_checksum = compute_file_checksum(scratch.path(), algorithm)?;
    drop(scratch);

    if !matches_identifier(&payload_checksum, &content_checksum) {
        return Err(KeepsakeError::IntegrityMismatch(format!(
            "payload checksum mismatch for {uuid}: computed {payload_checksum}, catalog holds {content_checksum}"
        )));
    }

    Ok(format!("Full validation OK at {}", timestamp()))
}

/// File-name prefix of a record's scratch file. Only ASCII alphanumerics,
/// `-` and `_` of the uuid are kept, so the file cannot leave `scratch_dir`.
fn scratch_prefix(uuid: &str) -> String {
    let mut prefix: String = uuid
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_'))
        .take(64)
        .collect();
    prefix.push('-');
    prefix
}
