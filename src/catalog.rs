//! Catalog binding.
//!
//! The catalog owns the records; the pipeline only reads and writes named
//! fields on them. This module defines that contract:
//!
//! - [`Catalog`]: executes a [`CatalogQuery`] and hands back record handles
//! - [`CatalogRecord`]: field-level access to one record
//! - [`fields`]: the literal field names and status vocabularies
//! - [`query`]: the selection predicates a run composes
//! - [`memory`]: an in-process catalog backed by a JSON file
//!
//! Writes through a [`CatalogRecord`] take effect immediately in the catalog;
//! there is no separate commit step.

pub mod fields;
pub mod memory;
pub mod query;
#[cfg(test)]
pub(crate) mod test_support;

pub use fields::{PreservationStatus, ValidationStatus};
pub use memory::{MemoryCatalog, MemoryRecord, StoredRecord};
pub use query::{CatalogQuery, Clause, Selection};

use crate::error::{KeepsakeError, Result};
use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use std::path::PathBuf;

/// A catalog the pipeline can select records from.
pub trait Catalog {
    /// Handle to one record of this catalog.
    type Record: CatalogRecord;

    /// Return every record satisfying all clauses of `query`.
    ///
    /// # Errors
    ///
    /// A failure to execute the query is a [`KeepsakeError::Catalog`] error and
    /// is fatal to the calling run.
    fn find(&self, query: &CatalogQuery) -> Result<Vec<Self::Record>>;
}

/// Field-level access to a single catalog record.
pub trait CatalogRecord {
    /// The record's identity GUID.
    fn uuid(&self) -> &str;

    /// Current value of `field`. Absent and empty values both read as `None`.
    fn field_value(&self, field: &str) -> Result<Option<String>>;

    /// Overwrite `field` with `value`.
    ///
    /// # Errors
    ///
    /// Fails if the field is not defined in the catalog or is read-only.
    fn set_field_value(&mut self, field: &str, value: &str) -> Result<()>;

    /// Whether the catalog defines `field` at all.
    fn has_field(&self, field: &str) -> bool;

    /// Whether the pipeline may write `field`.
    fn is_field_writable(&self, field: &str) -> bool;

    /// All non-empty fields of the record, in a stable order.
    fn fields(&self) -> Result<Vec<(String, String)>>;

    /// Location of the record's binary asset.
    fn content_path(&self) -> Result<PathBuf>;

    /// Value of `field`, or a [`KeepsakeError::RequiredField`] error naming it.
    fn required_value(&self, field: &str) -> Result<String> {
        self.field_value(field)?.ok_or_else(|| {
            KeepsakeError::RequiredField(format!(
                "record {} has no value for '{field}'",
                self.uuid()
            ))
        })
    }

    /// Whether `field` currently holds a non-empty value.
    fn has_value(&self, field: &str) -> Result<bool> {
        Ok(self.field_value(field)?.is_some())
    }

    /// Append `line` to a multi-line field, keeping the existing lines.
    fn append_field_line(&mut self, field: &str, line: &str) -> Result<()> {
        let value = match self.field_value(field)? {
            Some(existing) => format!("{existing}\n{line}"),
            None => line.to_owned(),
        };
        self.set_field_value(field, &value)
    }
}

/// Serialise a record's fields as catalog-field XML, the input of the
/// metadata transformation.
///
/// `object_id` is the identifier of the archival object the document will
/// become and is carried on the root element.
///
/// ```text
/// <record id="{object_id}" uuid="{record uuid}">
///   <field name="Catalog Name">Conservation</field>
///   ...
/// </record>
/// ```
pub fn record_to_xml<R: CatalogRecord + ?Sized>(record: &R, object_id: &str) -> Result<String> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

    let mut root = BytesStart::new("record");
    root.push_attribute(("id", object_id));
    root.push_attribute(("uuid", record.uuid()));
    writer.write_event(Event::Start(root))?;

    for (name, value) in record.fields()? {
        writer
            .create_element("field")
            .with_attribute(("name", name.as_str()))
            .write_text_content(BytesText::new(&value))?;
    }

    writer.write_event(Event::End(BytesEnd::new("record")))?;

    String::from_utf8(writer.into_inner())
        .map_err(|e| KeepsakeError::Transformation(format!("catalog XML is not UTF-8: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_catalog() -> (MemoryCatalog, MemoryRecord) {
        let catalog = MemoryCatalog::with_standard_fields();
        let record = catalog
            .insert(
                StoredRecord::new("rec-1")
                    .with_field(fields::CATALOG_NAME, "Conservation")
                    .with_field(fields::COLLECTION_ID, "books & maps"),
            )
            .unwrap();
        (catalog, record)
    }

    #[test]
    fn test_required_value_missing() {
        let (_catalog, record) = sample_catalog();
        let err = record.required_value(fields::METADATA_GUID).unwrap_err();

        assert!(matches!(err, KeepsakeError::RequiredField(_)));
        assert!(err.to_string().contains("Metadata GUID"));
    }

    #[test]
    fn test_append_field_line() {
        let (_catalog, mut record) = sample_catalog();
        record.append_field_line(fields::METADATA_HISTORY, "a ## p1").unwrap();
        record.append_field_line(fields::METADATA_HISTORY, "b ## p2").unwrap();

        assert_eq!(
            record.field_value(fields::METADATA_HISTORY).unwrap().unwrap(),
            "a ## p1\nb ## p2"
        );
    }

    #[test]
    fn test_record_to_xml_escapes_values() {
        let (_catalog, record) = sample_catalog();
        let xml = record_to_xml(&record, "meta-1").unwrap();

        assert!(xml.starts_with("<?xml"));
        assert!(xml.contains(r#"<record id="meta-1" uuid="rec-1">"#));
        assert!(xml.contains("books &amp; maps"));
        assert!(xml.contains(r#"name="Catalog Name""#));
    }
}
