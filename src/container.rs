//! ZIP container abstraction for OOXML packages.
//!
//! [`OoxmlContainer`] reads parts out of the template archive and keeps a set
//! of rewritten or newly added parts. When the container is serialized, every
//! untouched entry is copied over raw (no recompression), rewritten entries
//! replace their originals in place, and new entries are appended.

use crate::error::{Error, Result};
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs::File;
use std::io::{self, BufReader, Cursor, Read, Seek, Write};
use std::path::{Path, PathBuf};
use zip::write::SimpleFileOptions;
use zip::CompressionMethod;

/// Relationship type URI for images.
pub const IMAGE_RELATIONSHIP_TYPE: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/image";

/// Namespace of relationship parts.
pub const RELATIONSHIPS_NAMESPACE: &str =
    "http://schemas.openxmlformats.org/package/2006/relationships";

/// A relationship entry from a .rels file.
#[derive(Debug, Clone)]
pub struct Relationship {
    /// Relationship ID (e.g., "rId1")
    pub id: String,
    /// Relationship type URI
    pub rel_type: String,
    /// Target path (relative or absolute)
    pub target: String,
    /// Whether the target is external
    pub external: bool,
}

/// Collection of relationships parsed from a .rels file.
#[derive(Debug, Clone, Default)]
pub struct Relationships {
    /// Map from relationship ID to relationship data
    pub by_id: HashMap<String, Relationship>,
    /// Map from relationship type to list of relationships
    pub by_type: HashMap<String, Vec<Relationship>>,
}

impl Relationships {
    /// Create a new empty relationships collection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a relationship by ID.
    pub fn get(&self, id: &str) -> Option<&Relationship> {
        self.by_id.get(id)
    }

    /// Get relationships whose type URI ends with the given suffix
    /// (e.g. `"/header"`).
    pub fn get_by_type_suffix(&self, suffix: &str) -> Vec<&Relationship> {
        let mut rels: Vec<&Relationship> = self
            .by_type
            .iter()
            .filter(|(rel_type, _)| rel_type.ends_with(suffix))
            .flat_map(|(_, rels)| rels.iter())
            .collect();
        rels.sort_by(|a, b| a.target.cmp(&b.target));
        rels
    }

    /// Add a relationship.
    pub fn add(&mut self, rel: Relationship) {
        self.by_type
            .entry(rel.rel_type.clone())
            .or_default()
            .push(rel.clone());
        self.by_id.insert(rel.id.clone(), rel);
    }

    /// Next unused `rIdN` identifier.
    pub fn next_id(&self) -> String {
        let highest = self
            .by_id
            .keys()
            .filter_map(|id| id.strip_prefix("rId"))
            .filter_map(|n| n.parse::<u32>().ok())
            .max()
            .unwrap_or(0);

        let mut n = highest + 1;
        while self.by_id.contains_key(&format!("rId{}", n)) {
            n += 1;
        }
        format!("rId{}", n)
    }
}

/// Parse the XML of a relationships part.
pub fn parse_relationships_xml(content: &str) -> Result<Relationships> {
    let mut rels = Relationships::new();
    if content.trim().is_empty() {
        return Ok(rels);
    }

    let mut reader = quick_xml::Reader::from_str(content);
    reader.config_mut().trim_text(true);

    loop {
        match reader.read_event() {
            Ok(quick_xml::events::Event::Empty(e)) | Ok(quick_xml::events::Event::Start(e))
                if e.name().as_ref() == b"Relationship" =>
            {
                let mut id = String::new();
                let mut rel_type = String::new();
                let mut target = String::new();
                let mut external = false;

                for attr in e.attributes().flatten() {
                    let value = String::from_utf8_lossy(&attr.value).to_string();
                    match attr.key.as_ref() {
                        b"Id" => id = value,
                        b"Type" => rel_type = value,
                        b"Target" => target = value,
                        b"TargetMode" => external = value.eq_ignore_ascii_case("external"),
                        _ => {}
                    }
                }

                if !id.is_empty() {
                    rels.add(Relationship {
                        id,
                        rel_type,
                        target,
                        external,
                    });
                }
            }
            Ok(quick_xml::events::Event::Eof) => break,
            Err(e) => return Err(Error::XmlParse(e.to_string())),
            _ => {}
        }
    }

    Ok(rels)
}

/// Path of the relationships part that belongs to `part_path`.
///
/// `word/document.xml` maps to `word/_rels/document.xml.rels`; the package
/// root maps to `_rels/.rels`.
pub fn rels_path_for(part_path: &str) -> String {
    if part_path.is_empty() || part_path == "/" {
        return "_rels/.rels".to_string();
    }

    match part_path.rsplit_once('/') {
        Some((dir, file)) => format!("{}/_rels/{}.rels", dir, file),
        None => format!("_rels/{}.rels", part_path),
    }
}

/// Rewrite a UTF-16 encoding declaration to UTF-8.
///
/// Parts decoded from UTF-16 are written back as UTF-8, so the declaration
/// has to follow.
fn fix_xml_encoding_declaration(content: String) -> String {
    let Some(end_decl) = content
        .starts_with("<?xml")
        .then(|| content.find("?>"))
        .flatten()
    else {
        return content;
    };

    let decl = content[..end_decl + 2]
        .replace("encoding=\"UTF-16\"", "encoding=\"UTF-8\"")
        .replace("encoding='UTF-16'", "encoding='UTF-8'")
        .replace("encoding=\"utf-16\"", "encoding=\"UTF-8\"")
        .replace("encoding='utf-16'", "encoding='UTF-8'");

    format!("{}{}", decl, &content[end_decl + 2..])
}

/// Decode XML bytes handling different encodings (UTF-8, UTF-16 LE/BE).
pub fn decode_xml_bytes(bytes: &[u8]) -> Result<String> {
    if let Some(rest) = bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]) {
        return String::from_utf8(rest.to_vec())
            .map_err(|e| Error::Io(io::Error::new(io::ErrorKind::InvalidData, e)));
    }
    if let Some(rest) = bytes.strip_prefix(&[0xFF, 0xFE]) {
        return decode_utf16(rest, u16::from_le_bytes).map(fix_xml_encoding_declaration);
    }
    if let Some(rest) = bytes.strip_prefix(&[0xFE, 0xFF]) {
        return decode_utf16(rest, u16::from_be_bytes).map(fix_xml_encoding_declaration);
    }

    match String::from_utf8(bytes.to_vec()) {
        Ok(s) => Ok(s),
        // ASCII markup in UTF-16 without a BOM leaves every other byte zero
        Err(_) if bytes.len() >= 4 && bytes[1] == 0 && bytes[3] == 0 => {
            decode_utf16(bytes, u16::from_le_bytes).map(fix_xml_encoding_declaration)
        }
        Err(_) if bytes.len() >= 4 && bytes[0] == 0 && bytes[2] == 0 => {
            decode_utf16(bytes, u16::from_be_bytes).map(fix_xml_encoding_declaration)
        }
        Err(_) => Ok(String::from_utf8_lossy(bytes).into_owned()),
    }
}

fn decode_utf16(bytes: &[u8], unit: fn([u8; 2]) -> u16) -> Result<String> {
    let units = bytes.chunks_exact(2).map(|pair| unit([pair[0], pair[1]]));
    char::decode_utf16(units)
        .collect::<std::result::Result<String, _>>()
        .map_err(|e| Error::Io(io::Error::new(io::ErrorKind::InvalidData, e)))
}

/// Write `bytes` to `destination` without ever leaving a partial file there.
///
/// The data goes to a temporary file in the destination directory which is
/// then renamed over the destination.
pub fn write_atomic(destination: &Path, bytes: &[u8]) -> Result<()> {
    let dir = match destination.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    if !dir.is_dir() {
        return Err(Error::NotFound(dir));
    }

    let write_err = |source: io::Error| Error::Write {
        path: destination.to_path_buf(),
        source,
    };

    let mut tmp = tempfile::NamedTempFile::new_in(&dir).map_err(write_err)?;
    tmp.write_all(bytes).map_err(write_err)?;
    tmp.as_file().sync_all().map_err(write_err)?;
    tmp.persist(destination).map_err(|e| write_err(e.error))?;
    Ok(())
}

/// OOXML container abstraction over a ZIP archive.
pub struct OoxmlContainer {
    archive: RefCell<zip::ZipArchive<Cursor<Vec<u8>>>>,
    /// Parts rewritten or added since the archive was opened
    written: BTreeMap<String, Vec<u8>>,
}

impl OoxmlContainer {
    /// Open an OOXML container from a file path.
    ///
    /// Fails with [`Error::NotFound`] when the path is not a readable
    /// ZIP-structured file.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use docmerge::container::OoxmlContainer;
    ///
    /// let container = OoxmlContainer::open("template.docx")?;
    /// # Ok::<(), docmerge::Error>(())
    /// ```
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|_| Error::NotFound(path.to_path_buf()))?;
        if !file.metadata()?.is_file() {
            return Err(Error::NotFound(path.to_path_buf()));
        }
        match Self::from_reader(BufReader::new(file)) {
            Err(Error::ZipArchive(reason)) => {
                tracing::debug!(path = %path.display(), %reason, "not a ZIP package");
                Err(Error::NotFound(path.to_path_buf()))
            }
            other => other,
        }
    }

    /// Create an OOXML container from a byte vector.
    pub fn from_bytes(data: Vec<u8>) -> Result<Self> {
        let archive = zip::ZipArchive::new(Cursor::new(data))?;
        Ok(Self {
            archive: RefCell::new(archive),
            written: BTreeMap::new(),
        })
    }

    /// Create an OOXML container from a reader.
    pub fn from_reader<R: Read + Seek>(mut reader: R) -> Result<Self> {
        let mut data = Vec::new();
        reader.read_to_end(&mut data)?;
        Self::from_bytes(data)
    }

    /// Read an XML part as a string, seeing any pending rewrite.
    pub fn read_xml(&self, path: &str) -> Result<String> {
        let bytes = self.read_binary(path)?;
        decode_xml_bytes(&bytes)
    }

    /// Read a binary part, seeing any pending rewrite.
    pub fn read_binary(&self, path: &str) -> Result<Vec<u8>> {
        if let Some(data) = self.written.get(path) {
            return Ok(data.clone());
        }

        let mut archive = self.archive.borrow_mut();
        let mut file = archive
            .by_name(path)
            .map_err(|_| Error::MissingComponent(path.to_string()))?;
        let mut data = Vec::new();
        file.read_to_end(&mut data)?;
        Ok(data)
    }

    /// Check if a part exists in the archive or has been added.
    pub fn exists(&self, path: &str) -> bool {
        self.written.contains_key(path) || self.archive.borrow().file_names().any(|n| n == path)
    }

    /// List all parts, including added ones.
    pub fn list_files(&self) -> Vec<String> {
        let archive = self.archive.borrow();
        let mut files: Vec<String> = archive.file_names().map(String::from).collect();
        for name in self.written.keys() {
            if !files.contains(name) {
                files.push(name.clone());
            }
        }
        files
    }

    /// Read and parse the relationships of a part.
    ///
    /// A part without a relationships file has no relationships.
    pub fn read_relationships(&self, part_path: &str) -> Result<Relationships> {
        match self.read_xml(&rels_path_for(part_path)) {
            Ok(content) => parse_relationships_xml(&content),
            Err(Error::MissingComponent(_)) => Ok(Relationships::new()),
            Err(e) => Err(e),
        }
    }

    /// Replace (or add) a part.
    pub fn write_part(&mut self, path: impl Into<String>, data: Vec<u8>) {
        self.written.insert(path.into(), data);
    }

    /// Replace (or add) an XML part.
    pub fn write_xml(&mut self, path: impl Into<String>, xml: &str) {
        self.write_part(path, xml.as_bytes().to_vec());
    }

    /// Serialize the container into a new archive.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        let mut archive = self.archive.borrow_mut();
        let mut seen = HashSet::new();

        for i in 0..archive.len() {
            let file = archive.by_index_raw(i)?;
            let name = file.name().to_string();
            match self.written.get(&name) {
                Some(data) => {
                    drop(file);
                    writer.start_file(name.as_str(), Self::entry_options(&name))?;
                    writer.write_all(data)?;
                }
                None => writer.raw_copy_file(file)?,
            }
            seen.insert(name);
        }

        for (name, data) in &self.written {
            if seen.contains(name) {
                continue;
            }
            writer.start_file(name.as_str(), Self::entry_options(name))?;
            writer.write_all(data)?;
        }

        Ok(writer.finish()?.into_inner())
    }

    /// Serialize the container and write it atomically to `destination`.
    pub fn save(&self, destination: impl AsRef<Path>) -> Result<()> {
        let bytes = self.to_bytes()?;
        write_atomic(destination.as_ref(), &bytes)
    }

    /// Media is stored, markup is deflated.
    fn entry_options(name: &str) -> SimpleFileOptions {
        let method = if name.contains("/media/") {
            CompressionMethod::Stored
        } else {
            CompressionMethod::Deflated
        };
        SimpleFileOptions::default().compression_method(method)
    }

    /// Resolve a relative path from a base path.
    pub fn resolve_path(base: &str, relative: &str) -> String {
        if let Some(stripped) = relative.strip_prefix('/') {
            return stripped.to_string();
        }

        let mut parts: Vec<&str> = base.split('/').collect();
        parts.pop();
        for component in relative.split('/') {
            match component {
                ".." => {
                    parts.pop();
                }
                "." | "" => {}
                c => parts.push(c),
            }
        }
        parts.join("/")
    }

    /// Express `target` relative to the directory of `base`, the form
    /// relationship targets take. Targets outside that directory become
    /// package-absolute.
    pub fn relative_target(base: &str, target: &str) -> String {
        let dir = base.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("");
        if dir.is_empty() {
            return target.to_string();
        }
        match target.strip_prefix(dir).and_then(|rest| rest.strip_prefix('/')) {
            Some(rest) => rest.to_string(),
            None => format!("/{}", target),
        }
    }
}

impl std::fmt::Debug for OoxmlContainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OoxmlContainer")
            .field("files", &self.list_files().len())
            .field("written", &self.written.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_archive() -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default();
        writer.start_file("[Content_Types].xml", options).unwrap();
        writer.write_all(b"<Types/>").unwrap();
        writer.start_file("word/document.xml", options).unwrap();
        writer.write_all(b"<w:document>old</w:document>").unwrap();
        writer
            .start_file("word/_rels/document.xml.rels", options)
            .unwrap();
        writer
            .write_all(
                br#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles" Target="styles.xml"/><Relationship Id="rId3" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/header" Target="header1.xml"/></Relationships>"#,
            )
            .unwrap();
        writer.finish().unwrap().into_inner()
    }

    #[test]
    fn test_resolve_path() {
        assert_eq!(
            OoxmlContainer::resolve_path("word/document.xml", "../media/image1.png"),
            "media/image1.png"
        );
        assert_eq!(
            OoxmlContainer::resolve_path("word/document.xml", "header1.xml"),
            "word/header1.xml"
        );
        assert_eq!(
            OoxmlContainer::resolve_path("word/document.xml", "/word/media/image1.png"),
            "word/media/image1.png"
        );
    }

    #[test]
    fn test_relative_target() {
        assert_eq!(
            OoxmlContainer::relative_target("word/document.xml", "word/media/a.png"),
            "media/a.png"
        );
        assert_eq!(
            OoxmlContainer::relative_target("word/document.xml", "media/a.png"),
            "/media/a.png"
        );
    }

    #[test]
    fn test_rels_path_for() {
        assert_eq!(rels_path_for("word/document.xml"), "word/_rels/document.xml.rels");
        assert_eq!(rels_path_for(""), "_rels/.rels");
        assert_eq!(rels_path_for("doc.xml"), "_rels/doc.xml.rels");
    }

    #[test]
    fn test_relationships_next_id() {
        let container = OoxmlContainer::from_bytes(sample_archive()).unwrap();
        let rels = container.read_relationships("word/document.xml").unwrap();
        assert!(rels.get("rId1").is_some());
        assert_eq!(rels.next_id(), "rId4");
        assert_eq!(rels.get_by_type_suffix("/header").len(), 1);

        let none = container.read_relationships("word/header1.xml").unwrap();
        assert_eq!(none.next_id(), "rId1");
    }

    #[test]
    fn test_rewrite_round_trip() {
        let mut container = OoxmlContainer::from_bytes(sample_archive()).unwrap();
        container.write_xml("word/document.xml", "<w:document>new</w:document>");
        container.write_part("word/media/image1.png", vec![1, 2, 3]);

        assert_eq!(
            container.read_xml("word/document.xml").unwrap(),
            "<w:document>new</w:document>"
        );
        assert!(container.exists("word/media/image1.png"));

        let reopened = OoxmlContainer::from_bytes(container.to_bytes().unwrap()).unwrap();
        assert_eq!(
            reopened.read_xml("word/document.xml").unwrap(),
            "<w:document>new</w:document>"
        );
        assert_eq!(reopened.read_binary("word/media/image1.png").unwrap(), vec![1, 2, 3]);
        assert_eq!(reopened.read_xml("[Content_Types].xml").unwrap(), "<Types/>");
        assert_eq!(reopened.list_files()[0], "[Content_Types].xml");
    }

    #[test]
    fn test_open_missing_file() {
        let result = OoxmlContainer::open("does/not/exist.docx");
        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    #[test]
    fn test_open_non_zip_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.docx");
        std::fs::write(&path, b"not a zip").unwrap();

        let result = OoxmlContainer::open(&path);
        assert!(matches!(result, Err(Error::NotFound(p)) if p == path));

        let result = OoxmlContainer::open(dir.path());
        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    #[test]
    fn test_save_into_missing_directory() {
        let container = OoxmlContainer::from_bytes(sample_archive()).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let result = container.save(dir.path().join("missing").join("out.docx"));
        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    #[test]
    fn test_utf16_decoding() {
        let utf16_le = b"\xFF\xFE<\0?\0x\0m\0l\0>\0";
        assert_eq!(decode_xml_bytes(utf16_le).unwrap(), "<?xml>");

        let utf16_be = b"\xFE\xFF\0<\0?\0x\0m\0l\0>";
        assert_eq!(decode_xml_bytes(utf16_be).unwrap(), "<?xml>");

        let utf8_bom = b"\xEF\xBB\xBF<?xml>";
        assert_eq!(decode_xml_bytes(utf8_bom).unwrap(), "<?xml>");
    }

    #[test]
    fn test_utf16_declaration_rewritten() {
        let decl = "<?xml version=\"1.0\" encoding=\"UTF-16\"?><a/>";
        let mut bytes = vec![0xFF, 0xFE];
        for unit in decl.encode_utf16() {
            bytes.extend_from_slice(&unit.to_le_bytes());
        }
        assert_eq!(
            decode_xml_bytes(&bytes).unwrap(),
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?><a/>"
        );
    }
}
