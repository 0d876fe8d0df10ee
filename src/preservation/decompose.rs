//! Record decomposition.
//!
//! One catalog record becomes an ordered list of planned archival objects:
//!
//! ```text
//! plain / sub-asset:  Resource → Metadata
//! master asset:       Resource → Metadata → IntellectualEntity(primary)
//!                              → RepresentationMetadata → IntellectualEntity(representation)
//! ```
//!
//! The order matters for re-runs: intellectual-entity objects reference the
//! metadata id they describe, so they always follow it.

use super::object::{AssetRole, ObjectKind};
use crate::error::{KeepsakeError, Result};
use crate::identity::RecordIdentity;
use quick_xml::Writer;
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};

/// Where the payload of a planned object comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObjectSource {
    /// The record's content file
    Content,
    /// The record's catalog fields, transformed
    CatalogFields,
    /// A synthetic intellectual-entity document, transformed
    IntellectualEntity(IeStub),
}

/// Minimal intellectual-entity document fed to the transformation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IeStub {
    pub intellectual_entity_id: String,
    pub metadata_id: String,
    /// Only the entity linked to the resource carries it
    pub resource_id: Option<String>,
}

impl IeStub {
    /// # Errors
    ///
    /// Returns error if the XML cannot be written.
    pub fn to_xml(&self) -> Result<String> {
        let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);

        let mut root = BytesStart::new("intellectualEntity");
        root.push_attribute(("id", self.intellectual_entity_id.as_str()));
        writer.write_event(Event::Start(root))?;

        writer
            .create_element("ieUuid")
            .write_text_content(BytesText::new(&self.intellectual_entity_id))?;
        writer
            .create_element("metadataUuid")
            .write_text_content(BytesText::new(&self.metadata_id))?;
        if let Some(resource_id) = &self.resource_id {
            writer
                .create_element("fileUuid")
                .write_text_content(BytesText::new(resource_id))?;
        }

        writer.write_event(Event::End(BytesEnd::new("intellectualEntity")))?;

        String::from_utf8(writer.into_inner())
            .map_err(|e| KeepsakeError::Transformation(format!("IE stub is not UTF-8: {e}")))
    }
}

/// An archival object before its payload is produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedObject {
    pub kind: ObjectKind,
    pub identifier: String,
    pub source: ObjectSource,
}

/// Splits a record into the archival objects to preserve.
#[derive(Debug, Clone, Copy, Default)]
pub struct RecordDecomposer;

impl RecordDecomposer {
    /// Plan the objects of one record.
    ///
    /// # Errors
    ///
    /// A master asset without representation identifiers cannot be planned.
    pub fn decompose(identity: &RecordIdentity, role: AssetRole) -> Result<Vec<PlannedObject>> {
        let mut plan = vec![
            PlannedObject {
                kind: ObjectKind::Resource,
                identifier: identity.uuid.clone(),
                source: ObjectSource::Content,
            },
            PlannedObject {
                kind: ObjectKind::Metadata,
                identifier: identity.metadata_id.clone(),
                source: ObjectSource::CatalogFields,
            },
        ];

        if !role.is_master() {
            return Ok(plan);
        }

        let representation = identity.representation.as_ref().ok_or_else(|| {
            KeepsakeError::Other(format!(
                "master asset {} has no representation identifiers",
                identity.uuid
            ))
        })?;

        plan.push(PlannedObject {
            kind: ObjectKind::IntellectualEntity,
            identifier: identity.intellectual_entity_id.clone(),
            source: ObjectSource::IntellectualEntity(IeStub {
                intellectual_entity_id: identity.intellectual_entity_id.clone(),
                metadata_id: identity.metadata_id.clone(),
                resource_id: Some(identity.uuid.clone()),
            }),
        });
        plan.push(PlannedObject {
            kind: ObjectKind::RepresentationMetadata,
            identifier: representation.metadata_id.clone(),
            source: ObjectSource::CatalogFields,
        });
        plan.push(PlannedObject {
            kind: ObjectKind::IntellectualEntity,
            identifier: representation.intellectual_entity_id.clone(),
            source: ObjectSource::IntellectualEntity(IeStub {
                intellectual_entity_id: representation.intellectual_entity_id.clone(),
                metadata_id: representation.metadata_id.clone(),
                resource_id: None,
            }),
        });

        Ok(plan)
    }
}
