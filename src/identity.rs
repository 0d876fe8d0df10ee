//! Identifier assignment and threading.
//!
//! A record carries the identifiers of the archival objects derived from it.
//! They are minted or reused here, following these rules:
//!
//! - the intellectual-entity id is assigned once and then kept forever
//! - the metadata id is fresh on every preservation run (each run writes a new
//!   metadata object; the archive is write-once)
//! - a master asset gets a second pair of ids for its representation. The
//!   record's metadata id becomes `orig##rep`, and its intellectual-entity id
//!   becomes `origIe##repIe` unless it is already combined
//!
//! ```text
//! Metadata GUID:            8c1e…##41d0…
//! Intellectual entity GUID: 02b7…##9fa3…
//! ```

use crate::catalog::CatalogRecord;
use crate::catalog::fields::{
    self, COMBINED_ID_SEPARATOR, INTELLECTUAL_ENTITY_GUID, METADATA_GUID,
    REPRESENTATION_INTELLECTUAL_ENTITY_GUID, REPRESENTATION_METADATA_GUID,
};
use crate::error::Result;
use uuid::Uuid;

/// Identifiers minted for the representation of a master asset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepresentationIds {
    pub metadata_id: String,
    pub intellectual_entity_id: String,
}

/// Generate a fresh GUID.
pub fn fresh_guid() -> String {
    Uuid::new_v4().to_string()
}

/// Join two identifiers into the combined `first##second` notation.
pub fn combine_ids(first: &str, second: &str) -> String {
    format!("{first}{COMBINED_ID_SEPARATOR}{second}")
}

/// Whether `id` is already in combined notation.
pub fn is_combined(id: &str) -> bool {
    id.contains(COMBINED_ID_SEPARATOR)
}

/// First segment of a possibly combined identifier.
pub fn primary_segment(id: &str) -> &str {
    id.split(COMBINED_ID_SEPARATOR).next().unwrap_or(id)
}

/// Second segment of a combined identifier, if any.
pub fn representation_segment(id: &str) -> Option<&str> {
    id.split_once(COMBINED_ID_SEPARATOR)
        .map(|(_, rest)| primary_segment(rest))
        .filter(|s| !s.is_empty())
}

/// Assigns and threads identifiers on catalog records.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityAssigner;

impl IdentityAssigner {
    pub fn new() -> Self {
        Self
    }

    /// Give the record an intellectual-entity id unless it already has one.
    ///
    /// Returns the record's (possibly combined) intellectual-entity id.
    ///
    /// # Errors
    ///
    /// Returns the catalog error if the field cannot be read or written.
    pub fn ensure_intellectual_entity_id<R: CatalogRecord + ?Sized>(
        &self,
        record: &mut R,
    ) -> Result<String> {
        if let Some(existing) = record.field_value(INTELLECTUAL_ENTITY_GUID)? {
            return Ok(existing);
        }

        let id = fresh_guid();
        record.set_field_value(INTELLECTUAL_ENTITY_GUID, &id)?;
        tracing::debug!(record = record.uuid(), ie = %id, "Assigned intellectual entity id");
        Ok(id)
    }

    /// Give the record a fresh metadata id. Called once per preservation run.
    ///
    /// # Errors
    ///
    /// Returns the catalog error if the field cannot be written.
    pub fn reset_metadata_id<R: CatalogRecord + ?Sized>(&self, record: &mut R) -> Result<String> {
        let id = fresh_guid();
        record.set_field_value(METADATA_GUID, &id)?;
        Ok(id)
    }

    /// Mint the representation identifiers of a master asset and rewrite the
    /// record's identifiers into combined form.
    ///
    /// The metadata id is always rewritten to `orig##rep`. The
    /// intellectual-entity id is only rewritten when it is not combined yet; an
    /// already split identity keeps its representation segment, which is then
    /// reused as the representation intellectual-entity id.
    ///
    /// # Errors
    ///
    /// Returns [`KeepsakeError::RequiredField`](crate::error::KeepsakeError::RequiredField) if the record has no metadata
    /// id yet, and catalog errors from the field writes.
    pub fn split_for_representation<R: CatalogRecord + ?Sized>(
        &self,
        record: &mut R,
    ) -> Result<RepresentationIds> {
        let metadata_id = record.required_value(METADATA_GUID)?;
        let ie_id = self.ensure_intellectual_entity_id(record)?;

        let rep_metadata_id = fresh_guid();
        record.set_field_value(REPRESENTATION_METADATA_GUID, &rep_metadata_id)?;
        record.set_field_value(
            METADATA_GUID,
            &combine_ids(primary_segment(&metadata_id), &rep_metadata_id),
        )?;

        let rep_ie_id = match representation_segment(&ie_id) {
            Some(existing) => existing.to_owned(),
            None => {
                let minted = fresh_guid();
                record.set_field_value(INTELLECTUAL_ENTITY_GUID, &combine_ids(&ie_id, &minted))?;
                minted
            }
        };
        record.set_field_value(REPRESENTATION_INTELLECTUAL_ENTITY_GUID, &rep_ie_id)?;

        tracing::debug!(
            record = record.uuid(),
            rep_metadata = %rep_metadata_id,
            rep_ie = %rep_ie_id,
            "Split identifiers for representation"
        );

        Ok(RepresentationIds {
            metadata_id: rep_metadata_id,
            intellectual_entity_id: rep_ie_id,
        })
    }
}

/// The identifiers of one record as they stand after assignment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordIdentity {
    /// The record's own GUID, which is also the resource object's identifier
    pub uuid: String,
    /// Primary metadata id (first segment of the metadata field)
    pub metadata_id: String,
    /// Primary intellectual-entity id (first segment of the IE field)
    pub intellectual_entity_id: String,
    pub collection_id: String,
    /// Present for master assets only
    pub representation: Option<RepresentationIds>,
}

impl RecordIdentity {
    /// Read the current identifiers back from the record.
    ///
    /// # Errors
    ///
    /// Returns [`KeepsakeError::RequiredField`](crate::error::KeepsakeError::RequiredField) if an identifier or the
    /// collection id is missing.
    pub fn read<R: CatalogRecord + ?Sized>(
        record: &R,
        representation: Option<RepresentationIds>,
    ) -> Result<Self> {
        let metadata = record.required_value(METADATA_GUID)?;
        let ie = record.required_value(INTELLECTUAL_ENTITY_GUID)?;
        Ok(Self {
            uuid: record.uuid().to_owned(),
            metadata_id: primary_segment(&metadata).to_owned(),
            intellectual_entity_id: primary_segment(&ie).to_owned(),
            collection_id: record.required_value(fields::COLLECTION_ID)?,
            representation,
        })
    }
}
