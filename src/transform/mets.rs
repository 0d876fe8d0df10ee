//! METS envelope transformation.
//!
//! Wraps the input document in a METS container:
//!
//! ```text
//! <mets:mets OBJID="{id}" TYPE="{kind}" xmlns:mets=… xmlns:premis=…>
//!   <mets:metsHdr CREATEDATE="…">…</mets:metsHdr>
//!   <mets:dmdSec ID="dmd-{id}">
//!     <mets:mdWrap MDTYPE="…"><mets:xmlData>{input}</mets:xmlData></mets:mdWrap>
//!   </mets:dmdSec>
//! </mets:mets>
//! ```
//!
//! The object identifier is taken from the `id` attribute of the input's root
//! element.

use super::{TransformKind, Transformer};
use crate::error::{KeepsakeError, Result};
use chrono::{SecondsFormat, Utc};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

pub const METS_NAMESPACE: &str = "http://www.loc.gov/METS/";
pub const PREMIS_NAMESPACE: &str = "http://www.loc.gov/premis/v3";
pub const XLINK_NAMESPACE: &str = "http://www.w3.org/1999/xlink";

const ROOT: &[u8] = b"mets:mets";
const DMD_SECTION: &[u8] = b"mets:dmdSec";

/// Produces METS documents from catalog XML.
#[derive(Debug, Clone)]
pub struct MetsTransformer {
    agent: String,
}

impl Default for MetsTransformer {
    fn default() -> Self {
        Self::new()
    }
}

impl MetsTransformer {
    pub fn new() -> Self {
        Self {
            agent: format!("keepsake {}", env!("CARGO_PKG_VERSION")),
        }
    }

    fn mets_type(kind: TransformKind) -> &'static str {
        match kind {
            TransformKind::Metadata => "Metadata",
            TransformKind::RepresentationMetadata => "Representation",
            TransformKind::IntellectualEntity => "IntellectualEntity",
        }
    }

    fn md_type(kind: TransformKind) -> &'static str {
        match kind {
            TransformKind::Metadata | TransformKind::RepresentationMetadata => "OTHER",
            TransformKind::IntellectualEntity => "PREMIS:OBJECT",
        }
    }
}

impl Transformer for MetsTransformer {
    fn transform(&self, kind: TransformKind, xml: &str) -> Result<String> {
        let object_id = root_id(xml)?;

        let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
        writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

        let root = BytesStart::new("mets:mets").with_attributes([
            ("xmlns:mets", METS_NAMESPACE),
            ("xmlns:premis", PREMIS_NAMESPACE),
            ("xmlns:xlink", XLINK_NAMESPACE),
            ("OBJID", object_id.as_str()),
            ("TYPE", Self::mets_type(kind)),
        ]);
        writer.write_event(Event::Start(root))?;

        let created = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
        writer
            .create_element("mets:metsHdr")
            .with_attribute(("CREATEDATE", created.as_str()))
            .write_inner_content(|w| {
                w.create_element("mets:agent")
                    .with_attributes([
                        ("ROLE", "CREATOR"),
                        ("TYPE", "OTHER"),
                        ("OTHERTYPE", "SOFTWARE"),
                    ])
                    .write_inner_content(|w| {
                        w.create_element("mets:name")
                            .write_text_content(BytesText::new(&self.agent))?;
                        Ok(())
                    })?;
                Ok(())
            })?;

        let dmd_id = format!("dmd-{object_id}");
        writer.write_event(Event::Start(
            BytesStart::new("mets:dmdSec").with_attributes([("ID", dmd_id.as_str())]),
        ))?;
        writer.write_event(Event::Start(
            BytesStart::new("mets:mdWrap").with_attributes([("MDTYPE", Self::md_type(kind))]),
        ))?;
        writer.write_event(Event::Start(BytesStart::new("mets:xmlData")))?;

        copy_body(xml, &mut writer)?;

        writer.write_event(Event::End(BytesEnd::new("mets:xmlData")))?;
        writer.write_event(Event::End(BytesEnd::new("mets:mdWrap")))?;
        writer.write_event(Event::End(BytesEnd::new("mets:dmdSec")))?;
        writer.write_event(Event::End(BytesEnd::new("mets:mets")))?;

        String::from_utf8(writer.into_inner())
            .map_err(|e| KeepsakeError::Transformation(format!("METS output is not UTF-8: {e}")))
    }

    fn validate(&self, kind: TransformKind, xml: &str) -> Result<()> {
        let mut reader = Reader::from_str(xml);
        let mut depth = 0usize;
        let mut saw_root = false;
        let mut saw_dmd = false;

        loop {
            let event = reader.read_event()?;
            match &event {
                Event::Start(element) | Event::Empty(element) => {
                    if !saw_root {
                        if element.name().as_ref() != ROOT {
                            return Err(KeepsakeError::Transformation(format!(
                                "root element is <{}>, expected <mets:mets>",
                                String::from_utf8_lossy(element.name().as_ref())
                            )));
                        }
                        check_root_attributes(element, kind)?;
                        saw_root = true;
                    } else if depth == 0 {
                        return Err(KeepsakeError::Transformation(
                            "document has more than one root element".to_owned(),
                        ));
                    }
                    if element.name().as_ref() == DMD_SECTION {
                        saw_dmd = true;
                    }
                    if matches!(event, Event::Start(_)) {
                        depth += 1;
                    }
                }
                Event::End(_) => depth = depth.saturating_sub(1),
                Event::Eof => break,
                _ => {}
            }
        }

        if !saw_root {
            return Err(KeepsakeError::Transformation("document is empty".to_owned()));
        }
        if depth != 0 {
            return Err(KeepsakeError::Transformation(format!(
                "{depth} element(s) left unclosed"
            )));
        }
        if !saw_dmd {
            return Err(KeepsakeError::Transformation(
                "document has no mets:dmdSec".to_owned(),
            ));
        }
        Ok(())
    }
}

fn check_root_attributes(root: &BytesStart<'_>, kind: TransformKind) -> Result<()> {
    let mut object_id = None;
    let mut mets_type = None;

    for attr in root.attributes() {
        let attr = attr?;
        match attr.key.as_ref() {
            b"OBJID" => object_id = Some(attr.unescape_value()?.into_owned()),
            b"TYPE" => mets_type = Some(attr.unescape_value()?.into_owned()),
            _ => {}
        }
    }

    match object_id {
        Some(id) if !id.trim().is_empty() => {}
        _ => {
            return Err(KeepsakeError::Transformation(
                "mets:mets has no OBJID".to_owned(),
            ));
        }
    }

    let expected = MetsTransformer::mets_type(kind);
    if mets_type.as_deref() != Some(expected) {
        return Err(KeepsakeError::Transformation(format!(
            "mets:mets TYPE is {mets_type:?}, expected \"{expected}\""
        )));
    }
    Ok(())
}

/// `id` attribute of the first element in `xml`.
fn root_id(xml: &str) -> Result<String> {
    let mut reader = Reader::from_str(xml);

    loop {
        match reader.read_event()? {
            Event::Start(element) | Event::Empty(element) => {
                for attr in element.attributes() {
                    let attr = attr?;
                    if attr.key.as_ref() == b"id" {
                        let id = attr.unescape_value()?.trim().to_owned();
                        if !id.is_empty() {
                            return Ok(id);
                        }
                    }
                }
                return Err(KeepsakeError::Transformation(format!(
                    "root element <{}> carries no id",
                    String::from_utf8_lossy(element.name().as_ref())
                )));
            }
            Event::Eof => {
                return Err(KeepsakeError::Transformation(
                    "input document is empty".to_owned(),
                ));
            }
            _ => {}
        }
    }
}

/// Re-emit the element content of `xml` into `writer`, dropping the prolog
/// and indentation. Text inside fields is copied verbatim.
fn copy_body(xml: &str, writer: &mut Writer<Vec<u8>>) -> Result<()> {
    let mut reader = Reader::from_str(xml);

    loop {
        match reader.read_event()? {
            Event::Decl(_) | Event::DocType(_) | Event::PI(_) => {}
            Event::Text(text) if text.iter().all(u8::is_ascii_whitespace) => {}
            Event::Eof => break,
            event => writer.write_event(event)?,
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::declared_namespaces;

    const INPUT: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<record id="meta-1" uuid="rec-1">
  <field name="Catalog Name">Conservation</field>
</record>"#;

    #[test]
    fn test_transform_wraps_input() {
        let transformer = MetsTransformer::new();
        let out = transformer.transform(TransformKind::Metadata, INPUT).unwrap();

        assert!(out.contains(r#"OBJID="meta-1""#));
        assert!(out.contains(r#"TYPE="Metadata""#));
        assert!(out.contains(r#"<field name="Catalog Name">Conservation</field>"#));
        assert_eq!(out.matches("<?xml").count(), 1);
        transformer.validate(TransformKind::Metadata, &out).unwrap();
    }

    #[test]
    fn test_transform_keeps_padded_values() {
        let input = r#"<record id="meta-1" uuid="rec-1"><field name="Title">  two  spaces  </field></record>"#;
        let out = MetsTransformer::new()
            .transform(TransformKind::Metadata, input)
            .unwrap();

        assert!(out.contains(r#"<field name="Title">  two  spaces  </field>"#), "{out}");
    }

    #[test]
    fn test_standards_are_declared_namespaces() {
        let transformer = MetsTransformer::new();
        let out = transformer
            .transform(TransformKind::IntellectualEntity, r#"<intellectualEntity id="ie"/>"#)
            .unwrap();

        let standards = transformer.metadata_standards(&out).unwrap();
        assert!(standards.contains(METS_NAMESPACE));
        assert!(standards.contains(PREMIS_NAMESPACE));
        assert_eq!(standards, declared_namespaces(&out).unwrap());
    }

    #[test]
    fn test_input_without_id_is_rejected() {
        let err = MetsTransformer::new()
            .transform(TransformKind::Metadata, "<record/>")
            .unwrap_err();
        assert!(matches!(err, KeepsakeError::Transformation(_)));
    }

    #[test]
    fn test_validate_rejects_wrong_type() {
        let transformer = MetsTransformer::new();
        let out = transformer.transform(TransformKind::Metadata, INPUT).unwrap();

        assert!(
            transformer
                .validate(TransformKind::RepresentationMetadata, &out)
                .is_err()
        );
    }

    #[test]
    fn test_validate_rejects_foreign_root() {
        let err = MetsTransformer::new()
            .validate(TransformKind::Metadata, r#"<record id="x"/>"#)
            .unwrap_err();
        assert!(err.to_string().contains("expected <mets:mets>"));
    }

    #[test]
    fn test_validate_rejects_unclosed() {
        let xml = r#"<mets:mets OBJID="a" TYPE="Metadata"><mets:dmdSec>"#;
        assert!(MetsTransformer::new().validate(TransformKind::Metadata, xml).is_err());
    }
}
