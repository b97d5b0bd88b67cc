//! Synthetic template fixtures shared by the integration tests.

#![allow(dead_code)]

use docmerge::{locate_main_part, OoxmlContainer};
use quick_xml::events::Event;
use quick_xml::Reader;
use std::io::{Cursor, Write};
use std::path::Path;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

const W_NS: &str = "http://schemas.openxmlformats.org/wordprocessingml/2006/main";
const R_NS: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";
const HEADER_REL: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/header";

/// Builds a minimal DOCX template in memory.
#[derive(Default)]
pub struct TemplateBuilder {
    body: String,
    header: Option<String>,
}

impl TemplateBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// A paragraph with one run holding `text` (already XML-safe).
    pub fn paragraph(mut self, text: &str) -> Self {
        self.body.push_str(&format!(
            r#"<w:p><w:r><w:t xml:space="preserve">{}</w:t></w:r></w:p>"#,
            text
        ));
        self
    }

    /// Body markup inserted as is.
    pub fn raw(mut self, xml: &str) -> Self {
        self.body.push_str(xml);
        self
    }

    /// A table, one paragraph per cell.
    pub fn table(mut self, rows: &[&[&str]]) -> Self {
        self.body.push_str("<w:tbl><w:tblPr/>");
        for row in rows {
            self.body.push_str("<w:tr>");
            for cell in row.iter() {
                self.body.push_str(&format!(
                    r#"<w:tc><w:p><w:r><w:t xml:space="preserve">{}</w:t></w:r></w:p></w:tc>"#,
                    cell
                ));
            }
            self.body.push_str("</w:tr>");
        }
        self.body.push_str("</w:tbl>");
        self
    }

    /// A default header holding one paragraph of `text`.
    pub fn header(mut self, text: &str) -> Self {
        self.header = Some(text.to_string());
        self
    }

    pub fn build(self) -> Vec<u8> {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default();

        let header_override = if self.header.is_some() {
            r#"<Override PartName="/word/header1.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.header+xml"/>"#
        } else {
            ""
        };
        zip.start_file("[Content_Types].xml", options).unwrap();
        write!(
            zip,
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/>{}</Types>"#,
            header_override
        )
        .unwrap();

        zip.start_file("_rels/.rels", options).unwrap();
        zip.write_all(
            br#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="word/document.xml"/></Relationships>"#,
        )
        .unwrap();

        let mut rels = String::from(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles" Target="styles.xml"/>"#,
        );
        let mut sect = String::new();
        if self.header.is_some() {
            rels.push_str(&format!(
                r#"<Relationship Id="rId2" Type="{}" Target="header1.xml"/>"#,
                HEADER_REL
            ));
            sect = r#"<w:sectPr><w:headerReference w:type="default" r:id="rId2"/></w:sectPr>"#
                .to_string();
        }
        rels.push_str("</Relationships>");
        zip.start_file("word/_rels/document.xml.rels", options).unwrap();
        zip.write_all(rels.as_bytes()).unwrap();

        zip.start_file("word/styles.xml", options).unwrap();
        write!(zip, r#"<w:styles xmlns:w="{}"/>"#, W_NS).unwrap();

        zip.start_file("word/document.xml", options).unwrap();
        write!(
            zip,
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:document xmlns:w="{}" xmlns:r="{}"><w:body>{}{}</w:body></w:document>"#,
            W_NS, R_NS, self.body, sect
        )
        .unwrap();

        if let Some(text) = &self.header {
            zip.start_file("word/header1.xml", options).unwrap();
            write!(
                zip,
                r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:hdr xmlns:w="{}"><w:p><w:r><w:t xml:space="preserve">{}</w:t></w:r></w:p></w:hdr>"#,
                W_NS, text
            )
            .unwrap();
        }

        zip.finish().unwrap().into_inner()
    }

    pub fn write_to(self, path: &Path) {
        std::fs::write(path, self.build()).unwrap();
    }
}

/// A solid PNG of the given size.
pub fn png(width: u32, height: u32) -> Vec<u8> {
    let mut out = Cursor::new(Vec::new());
    image::RgbImage::from_pixel(width, height, image::Rgb([200, 30, 30]))
        .write_to(&mut out, image::ImageFormat::Png)
        .unwrap();
    out.into_inner()
}

/// Main document part XML of a generated package.
pub fn main_xml(package: &[u8]) -> String {
    let container = OoxmlContainer::from_bytes(package.to_vec()).unwrap();
    let main = locate_main_part(&container).unwrap();
    container.read_xml(&main.path).unwrap()
}

/// Any part of a generated package, as text.
pub fn part_xml(package: &[u8], path: &str) -> String {
    OoxmlContainer::from_bytes(package.to_vec())
        .unwrap()
        .read_xml(path)
        .unwrap()
}

/// Panic unless `xml` parses to the end with matching tags.
pub fn assert_well_formed(xml: &str) {
    let mut reader = Reader::from_str(xml);
    loop {
        match reader.read_event() {
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => panic!(
                "malformed XML at {}: {}\n{}",
                reader.buffer_position(),
                e,
                xml
            ),
        }
    }
}
