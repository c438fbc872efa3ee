// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// XML plumbing shared by the eSCL parsers and the scan-settings writer.
//
// eSCL documents mix two namespaces: `scan` for eSCL-specific elements and
// `pwg` for PWG semantic-model elements.  Devices disagree on the exact
// namespace version (2011/02/08 vs 2011/05/03, ...), so element matching is
// done by local name plus namespace family rather than by exact URI.

use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use roxmltree::{Document, Node};

use scanwerk_core::error::{Result, ScanwerkError};
use scanwerk_core::types::ScanSettings;

/// eSCL namespace written into outgoing documents.
pub const SCAN_NS: &str = "http://schemas.hp.com/imaging/escl/2011/05/03";

/// PWG semantic model namespace written into outgoing documents.
pub const PWG_NS: &str = "http://www.pwg.org/schemas/2010/12/sm";

const SCAN_NS_FAMILY: &str = "http://schemas.hp.com/imaging/escl/";
const PWG_NS_FAMILY: &str = "http://www.pwg.org/schemas/";

/// Region units used in scan settings (1/300 inch).
pub const CONTENT_REGION_UNITS: &str = "escl:ThreeHundredthsOfInches";

/// One of the two eSCL namespace families.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ns {
    Scan,
    Pwg,
}

impl Ns {
    fn family(self) -> &'static str {
        match self {
            Ns::Scan => SCAN_NS_FAMILY,
            Ns::Pwg => PWG_NS_FAMILY,
        }
    }

    /// Whether a namespace URI belongs to this family, regardless of version.
    pub fn matches(self, uri: Option<&str>) -> bool {
        uri.is_some_and(|u| u.starts_with(self.family()))
    }
}

/// Parse XML text, reporting syntax errors as malformed documents.
pub(crate) fn parse_document(text: &str) -> Result<Document<'_>> {
    Document::parse(text)
        .map_err(|e| ScanwerkError::MalformedDocument(format!("invalid XML: {e}")))
}

/// Return the root element if it is `ns:name`, otherwise a malformed
/// document error naming what was found.
pub(crate) fn expect_root<'a, 'input>(
    doc: &'a Document<'input>,
    ns: Ns,
    name: &str,
) -> Result<Node<'a, 'input>> {
    let root = doc.root_element();
    if is_element(root, ns, name) {
        Ok(root)
    } else {
        Err(ScanwerkError::MalformedDocument(format!(
            "unexpected root element: {{{}}}{}",
            root.tag_name().namespace().unwrap_or(""),
            root.tag_name().name()
        )))
    }
}

fn is_element(node: Node<'_, '_>, ns: Ns, name: &str) -> bool {
    node.is_element() && node.tag_name().name() == name && ns.matches(node.tag_name().namespace())
}

/// First child element `ns:name`.
pub(crate) fn child<'a, 'input>(node: Node<'a, 'input>, ns: Ns, name: &str) -> Option<Node<'a, 'input>> {
    node.children().find(|c| is_element(*c, ns, name))
}

/// All child elements `ns:name`, in document order.
pub(crate) fn children<'a, 'input: 'a>(
    node: Node<'a, 'input>,
    ns: Ns,
    name: &'a str,
) -> impl Iterator<Item = Node<'a, 'input>> + 'a {
    node.children().filter(move |c| is_element(*c, ns, name))
}

/// Trimmed text content of an element.
pub(crate) fn text_of(node: Node<'_, '_>) -> String {
    node.text().unwrap_or("").trim().to_owned()
}

/// Trimmed text of the first child `ns:name`, if present.
pub(crate) fn child_text(node: Node<'_, '_>, ns: Ns, name: &str) -> Option<String> {
    child(node, ns, name).map(text_of)
}

/// Integer value of the first child `ns:name`.  A present but non-numeric
/// value is a malformed document.
pub(crate) fn child_u32(node: Node<'_, '_>, ns: Ns, name: &str) -> Result<Option<u32>> {
    child(node, ns, name).map(parse_u32).transpose()
}

pub(crate) fn parse_u32(node: Node<'_, '_>) -> Result<u32> {
    let text = text_of(node);
    text.parse().map_err(|_| {
        ScanwerkError::MalformedDocument(format!(
            "expected an integer in <{}>, found '{text}'",
            node.tag_name().name()
        ))
    })
}

// ---------------------------------------------------------------------------
// Scan settings serialization
// ---------------------------------------------------------------------------

/// Serialize scan settings into a `scan:ScanSettings` document.
pub fn scan_settings_document(settings: &ScanSettings) -> Result<String> {
    let mut writer = Writer::new(Vec::new());
    writer
        .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
        .map_err(write_error)?;

    let mut root = BytesStart::new("scan:ScanSettings");
    root.push_attribute(("xmlns:scan", SCAN_NS));
    root.push_attribute(("xmlns:pwg", PWG_NS));
    writer.write_event(Event::Start(root)).map_err(write_error)?;

    write_text_element(&mut writer, "pwg:Version", &settings.version)?;
    write_text_element(&mut writer, "scan:Intent", settings.intent.as_wire())?;

    let mut regions = BytesStart::new("pwg:ScanRegions");
    regions.push_attribute(("pwg:MustHonor", "true"));
    writer.write_event(Event::Start(regions)).map_err(write_error)?;
    writer
        .write_event(Event::Start(BytesStart::new("pwg:ScanRegion")))
        .map_err(write_error)?;
    write_text_element(&mut writer, "pwg:Height", &settings.height.to_string())?;
    write_text_element(&mut writer, "pwg:ContentRegionUnits", CONTENT_REGION_UNITS)?;
    write_text_element(&mut writer, "pwg:Width", &settings.width.to_string())?;
    write_text_element(&mut writer, "pwg:XOffset", &settings.x_offset.to_string())?;
    write_text_element(&mut writer, "pwg:YOffset", &settings.y_offset.to_string())?;
    writer
        .write_event(Event::End(BytesEnd::new("pwg:ScanRegion")))
        .map_err(write_error)?;
    writer
        .write_event(Event::End(BytesEnd::new("pwg:ScanRegions")))
        .map_err(write_error)?;

    write_text_element(&mut writer, "pwg:InputSource", settings.input_source.as_wire())?;
    write_text_element(&mut writer, "scan:Duplex", if settings.duplex { "true" } else { "false" })?;
    write_text_element(&mut writer, "scan:ColorMode", settings.color_mode.as_wire())?;
    write_text_element(&mut writer, "scan:XResolution", &settings.x_resolution.to_string())?;
    write_text_element(&mut writer, "scan:YResolution", &settings.y_resolution.to_string())?;
    if let Some(factor) = settings.compression_factor {
        write_text_element(&mut writer, "scan:CompressionFactor", &factor.to_string())?;
    }
    write_text_element(&mut writer, "pwg:DocumentFormat", &settings.document_format)?;

    writer
        .write_event(Event::End(BytesEnd::new("scan:ScanSettings")))
        .map_err(write_error)?;

    String::from_utf8(writer.into_inner())
        .map_err(|e| ScanwerkError::Protocol(format!("scan settings are not UTF-8: {e}")))
}

fn write_text_element(writer: &mut Writer<Vec<u8>>, name: &str, value: &str) -> Result<()> {
    writer
        .write_event(Event::Start(BytesStart::new(name)))
        .map_err(write_error)?;
    writer
        .write_event(Event::Text(BytesText::new(value)))
        .map_err(write_error)?;
    writer
        .write_event(Event::End(BytesEnd::new(name)))
        .map_err(write_error)?;
    Ok(())
}

fn write_error(e: impl std::fmt::Display) -> ScanwerkError {
    ScanwerkError::Protocol(format!("failed to write scan settings: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use scanwerk_core::types::{ColorMode, InputSource};

    #[test]
    fn namespace_family_ignores_version() {
        assert!(Ns::Scan.matches(Some("http://schemas.hp.com/imaging/escl/2011/02/08")));
        assert!(Ns::Scan.matches(Some(SCAN_NS)));
        assert!(!Ns::Scan.matches(Some(PWG_NS)));
        assert!(!Ns::Pwg.matches(None));
    }

    #[test]
    fn expect_root_rejects_other_elements() {
        let xml = format!(r#"<scan:ScannerStatus xmlns:scan="{SCAN_NS}"/>"#);
        let doc = parse_document(&xml).unwrap();
        let err = expect_root(&doc, Ns::Scan, "ScannerCapabilities").unwrap_err();
        assert!(err.to_string().contains("ScannerStatus"));
    }

    #[test]
    fn child_u32_rejects_garbage() {
        let xml = format!(
            r#"<scan:Caps xmlns:scan="{SCAN_NS}"><scan:MaxWidth>wide</scan:MaxWidth></scan:Caps>"#
        );
        let doc = parse_document(&xml).unwrap();
        let root = doc.root_element();
        assert!(child_u32(root, Ns::Scan, "MaxWidth").is_err());
        assert_eq!(child_u32(root, Ns::Scan, "MinWidth").unwrap(), None);
    }

    #[test]
    fn settings_document_escapes_text() {
        let settings = ScanSettings {
            document_format: "image/<jpeg>".into(),
            ..Default::default()
        };
        let xml = scan_settings_document(&settings).unwrap();
        assert!(xml.contains("image/&lt;jpeg&gt;"));
    }

    #[test]
    fn settings_document_round_trips_through_parser() {
        let settings = ScanSettings {
            input_source: InputSource::Feeder,
            duplex: true,
            color_mode: ColorMode::BlackAndWhite1,
            compression_factor: Some(40),
            ..Default::default()
        };
        let xml = scan_settings_document(&settings).unwrap();
        let doc = parse_document(&xml).unwrap();
        let root = expect_root(&doc, Ns::Scan, "ScanSettings").unwrap();

        assert_eq!(child_text(root, Ns::Pwg, "InputSource").as_deref(), Some("Feeder"));
        assert_eq!(child_text(root, Ns::Scan, "Duplex").as_deref(), Some("true"));
        assert_eq!(child_u32(root, Ns::Scan, "CompressionFactor").unwrap(), Some(40));

        let region = child(root, Ns::Pwg, "ScanRegions")
            .and_then(|r| child(r, Ns::Pwg, "ScanRegion"))
            .unwrap();
        assert_eq!(
            child_text(region, Ns::Pwg, "ContentRegionUnits").as_deref(),
            Some(CONTENT_REGION_UNITS)
        );
    }
}
