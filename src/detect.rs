//! Package classification and main document part discovery.

use crate::container::OoxmlContainer;
use crate::error::{Error, Result};

/// ZIP file magic bytes: PK\x03\x04
const ZIP_MAGIC: [u8; 4] = [0x50, 0x4B, 0x03, 0x04];

/// Content types of a word-processing main part, paired with the package kind.
const MAIN_CONTENT_TYPES: [(&str, DocumentKind); 4] = [
    (
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml",
        DocumentKind::Document,
    ),
    (
        "application/vnd.openxmlformats-officedocument.wordprocessingml.template.main+xml",
        DocumentKind::Template,
    ),
    (
        "application/vnd.ms-word.document.macroEnabled.main+xml",
        DocumentKind::MacroEnabledDocument,
    ),
    (
        "application/vnd.ms-word.template.macroEnabledTemplate.main+xml",
        DocumentKind::MacroEnabledTemplate,
    ),
];

/// Relationship type of the package's main part.
const OFFICE_DOCUMENT_RELATIONSHIP: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument";

/// Kind of word-processing package.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    /// Word document (.docx)
    Document,
    /// Word template (.dotx)
    Template,
    /// Macro-enabled Word document (.docm)
    MacroEnabledDocument,
    /// Macro-enabled Word template (.dotm)
    MacroEnabledTemplate,
}

impl DocumentKind {
    /// Returns the file extension for this kind.
    pub fn extension(&self) -> &'static str {
        match self {
            DocumentKind::Document => "docx",
            DocumentKind::Template => "dotx",
            DocumentKind::MacroEnabledDocument => "docm",
            DocumentKind::MacroEnabledTemplate => "dotm",
        }
    }

    /// Returns a human-readable name for this kind.
    pub fn name(&self) -> &'static str {
        match self {
            DocumentKind::Document => "Word Document",
            DocumentKind::Template => "Word Template",
            DocumentKind::MacroEnabledDocument => "Macro-Enabled Word Document",
            DocumentKind::MacroEnabledTemplate => "Macro-Enabled Word Template",
        }
    }
}

impl std::fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Where the main document part lives and what kind of package holds it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MainPart {
    /// Part path inside the archive, without a leading slash
    pub path: String,
    /// Package kind
    pub kind: DocumentKind,
}

/// Locate the main document part of a word-processing package.
///
/// The `[Content_Types].xml` overrides are consulted first; packages that
/// declare no recognised main content type fall back to the package-level
/// `officeDocument` relationship and finally to `word/document.xml`.
pub fn locate_main_part(container: &OoxmlContainer) -> Result<MainPart> {
    let content_types = container.read_xml("[Content_Types].xml")?;

    if let Some(found) = main_part_from_content_types(&content_types)? {
        return Ok(found);
    }

    // Spreadsheets and presentations are valid OOXML, just not ours
    if content_types.contains("spreadsheetml") || content_types.contains("presentationml") {
        return Err(Error::UnsupportedFormat(
            "package is not a word-processing document".to_string(),
        ));
    }

    let package_rels = container.read_relationships("")?;
    let from_rels = package_rels
        .by_type
        .get(OFFICE_DOCUMENT_RELATIONSHIP)
        .and_then(|rels| rels.first())
        .map(|rel| OoxmlContainer::resolve_path("", &rel.target));

    let path = from_rels.unwrap_or_else(|| "word/document.xml".to_string());
    if !container.exists(&path) {
        return Err(Error::MissingComponent(path));
    }

    Ok(MainPart {
        path,
        kind: DocumentKind::Document,
    })
}

/// Scan `<Override>` entries for a word-processing main part.
fn main_part_from_content_types(content_types: &str) -> Result<Option<MainPart>> {
    let mut reader = quick_xml::Reader::from_str(content_types);
    reader.config_mut().trim_text(true);

    loop {
        match reader.read_event() {
            Ok(quick_xml::events::Event::Empty(e)) | Ok(quick_xml::events::Event::Start(e))
                if e.local_name().as_ref() == b"Override" =>
            {
                let mut part_name = None;
                let mut content_type = None;
                for attr in e.attributes().flatten() {
                    let value = String::from_utf8_lossy(&attr.value).to_string();
                    match attr.key.as_ref() {
                        b"PartName" => part_name = Some(value),
                        b"ContentType" => content_type = Some(value),
                        _ => {}
                    }
                }

                let kind = content_type.and_then(|ct| {
                    MAIN_CONTENT_TYPES
                        .iter()
                        .find(|(known, _)| *known == ct)
                        .map(|(_, kind)| *kind)
                });

                if let (Some(part_name), Some(kind)) = (part_name, kind) {
                    return Ok(Some(MainPart {
                        path: part_name.trim_start_matches('/').to_string(),
                        kind,
                    }));
                }
            }
            Ok(quick_xml::events::Event::Eof) => return Ok(None),
            Err(e) => return Err(Error::XmlParse(e.to_string())),
            _ => {}
        }
    }
}

/// Check if data starts with ZIP magic bytes.
pub fn is_zip_file(data: &[u8]) -> bool {
    data.len() >= 4 && data[..4] == ZIP_MAGIC
}
