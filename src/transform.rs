//! Metadata transformation.
//!
//! Catalog-field XML and intellectual-entity stubs are turned into archival
//! metadata documents by a [`Transformer`]. The pipeline only relies on the
//! trait; [`mets::MetsTransformer`] is the bundled implementation.

pub mod mets;

pub use mets::MetsTransformer;

use crate::error::Result;
use quick_xml::Reader;
use quick_xml::events::Event;
use std::collections::BTreeSet;
use std::fmt;

/// Which transformation a document goes through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransformKind {
    Metadata,
    RepresentationMetadata,
    IntellectualEntity,
}

impl TransformKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Metadata => "metadata",
            Self::RepresentationMetadata => "representation-metadata",
            Self::IntellectualEntity => "intellectual-entity",
        }
    }
}

impl fmt::Display for TransformKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Converts catalog XML into archival metadata and checks the result.
pub trait Transformer {
    /// Transform `xml` for the given kind of object.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::KeepsakeError::Transformation`] if the input
    /// cannot be parsed or lacks the object identifier.
    fn transform(&self, kind: TransformKind, xml: &str) -> Result<String>;

    /// Check a transformed document against the target schema.
    fn validate(&self, kind: TransformKind, xml: &str) -> Result<()>;

    /// Namespace URIs declared anywhere in `xml`.
    fn metadata_standards(&self, xml: &str) -> Result<BTreeSet<String>> {
        declared_namespaces(xml)
    }
}

/// Collect the values of every `xmlns` / `xmlns:*` attribute in `xml`.
///
/// # Errors
///
/// Returns [`crate::error::KeepsakeError::Transformation`] if `xml` is malformed.
pub fn declared_namespaces(xml: &str) -> Result<BTreeSet<String>> {
    let mut reader = Reader::from_str(xml);
    let mut namespaces = BTreeSet::new();

    loop {
        match reader.read_event()? {
            Event::Start(element) | Event::Empty(element) => {
                for attr in element.attributes() {
                    let attr = attr?;
                    let key = attr.key.as_ref();
                    if key == b"xmlns" || key.starts_with(b"xmlns:") {
                        let value = attr.unescape_value()?;
                        if !value.trim().is_empty() {
                            namespaces.insert(value.trim().to_owned());
                        }
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(namespaces)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_declared_namespaces() {
        let xml = r#"<a xmlns="urn:one" xmlns:x="urn:two"><x:b xmlns:y="urn:one"/></a>"#;
        let found = declared_namespaces(xml).unwrap();

        assert_eq!(
            found.into_iter().collect::<Vec<_>>(),
            vec!["urn:one".to_owned(), "urn:two".to_owned()]
        );
    }

    #[test]
    fn test_no_namespaces() {
        assert!(declared_namespaces("<plain/>").unwrap().is_empty());
    }
}
