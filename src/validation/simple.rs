use super::timestamp;
use crate::archive::ArchiveStore;
use crate::catalog::CatalogRecord;
use crate::catalog::fields;
use crate::error::{KeepsakeError, Result};
use crate::integrity::digests_equal;

/// Compare the checksum the archive reports for the record's resource package
/// with the one stored in the catalog.
///
/// Returns the note to store on success.
///
/// # Errors
///
/// A mismatch is [`KeepsakeError::IntegrityMismatch`]; missing fields and
/// archive lookups fail with their own categories.
pub fn check_simple<R, A>(record: &R, archive: &A) -> Result<String>
where
    R: CatalogRecord + ?Sized,
    A: ArchiveStore + ?Sized,
{
    let package_id = record.required_value(fields::RESOURCE_PACKAGE_ID)?;
    let collection_id = record.required_value(fields::COLLECTION_ID)?;
    let expected = record.required_value(fields::ARCHIVE_CHECKSUM)?;

    let reported = archive.get_checksum(&package_id, &collection_id)?;

    if digests_equal(&reported, &expected) {
        Ok(format!("Simple validation OK at {}", timestamp()))
    } else {
        Err(KeepsakeError::IntegrityMismatch(format!(
            "integrity issue, discovered at {}: archive reports {reported}, catalog holds {expected}",
            timestamp()
        )))
    }
}
