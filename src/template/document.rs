//! An open template: the package plus the editable XML of its story parts.

use super::fragment::{self, BlockKind};
use super::image::{AssetError, ImageAsset};
use super::markup::{inline_drawing, prepare_text};
use crate::container::{
    parse_relationships_xml, rels_path_for, OoxmlContainer, IMAGE_RELATIONSHIP_TYPE,
    RELATIONSHIPS_NAMESPACE,
};
use crate::detect::{is_zip_file, locate_main_part, DocumentKind, MainPart};
use crate::error::{Error, Result};
use crate::model::{normalize_token, ImageOptions, TextOptions};
use regex::Regex;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::LazyLock;

const CONTENT_TYPES_PATH: &str = "[Content_Types].xml";

static DOC_PR_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"<wp:docPr\b[^>]*?\bid="(\d+)""#).expect("invalid docPr pattern"));

/// Result of an image replacement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageOutcome {
    /// The image was embedded at this many occurrences (possibly zero)
    Embedded(usize),
    /// The image source was missing or unusable; the token was left as is
    Skipped(AssetError),
}

#[derive(Debug)]
struct StoryPart {
    path: String,
    xml: String,
    /// Differs from the packaged part
    dirty: bool,
}

impl StoryPart {
    fn load(path: String, raw: String) -> Self {
        let repaired = fragment::fix_broken_macros(&raw);
        let dirty = repaired != raw.as_str();
        let xml = repaired.into_owned();
        Self { path, xml, dirty }
    }
}

/// A template opened for editing.
///
/// Text replacement and image embedding apply to the main part and to the
/// header and footer parts it references, main part first. Row cloning and
/// block edits work on the main part only. Nothing is written back to the
/// package until [`into_bytes`](Self::into_bytes) or [`save`](Self::save).
#[derive(Debug)]
pub struct Document {
    container: OoxmlContainer,
    main: MainPart,
    /// Main part first, then headers, then footers
    parts: Vec<StoryPart>,
    /// Relationship parts edited so far, by part path
    rels: BTreeMap<String, String>,
    content_types: String,
    content_types_dirty: bool,
    next_drawing_id: u32,
    media_count: usize,
}

impl Document {
    /// Open a template file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_container(OoxmlContainer::open(path)?)
    }

    /// Open a template held in memory.
    pub fn from_bytes(data: Vec<u8>) -> Result<Self> {
        if !is_zip_file(&data) {
            return Err(Error::ZipArchive("template is not a ZIP package".to_string()));
        }
        Self::from_container(OoxmlContainer::from_bytes(data)?)
    }

    /// Prepare an opened package for editing.
    ///
    /// Markers split across runs are repaired in every story part.
    pub fn from_container(container: OoxmlContainer) -> Result<Self> {
        let main = locate_main_part(&container)?;
        let content_types = container.read_xml(CONTENT_TYPES_PATH)?;

        let mut parts = vec![StoryPart::load(
            main.path.clone(),
            container.read_xml(&main.path)?,
        )];

        let main_rels = container.read_relationships(&main.path)?;
        for suffix in ["/header", "/footer"] {
            for rel in main_rels.get_by_type_suffix(suffix) {
                if rel.external {
                    continue;
                }
                let path = OoxmlContainer::resolve_path(&main.path, &rel.target);
                if parts.iter().any(|p| p.path == path) {
                    continue;
                }
                match container.read_xml(&path) {
                    Ok(xml) => parts.push(StoryPart::load(path, xml)),
                    Err(Error::MissingComponent(_)) => {
                        tracing::warn!(part = %path, "referenced part is missing from the package")
                    }
                    Err(e) => return Err(e),
                }
            }
        }

        let next_drawing_id = parts
            .iter()
            .flat_map(|p| DOC_PR_ID.captures_iter(&p.xml))
            .filter_map(|caps| caps[1].parse::<u32>().ok())
            .max()
            .unwrap_or(0)
            + 1;

        tracing::debug!(
            main = %main.path,
            kind = %main.kind,
            parts = parts.len(),
            "template opened"
        );

        Ok(Self {
            container,
            main,
            parts,
            rels: BTreeMap::new(),
            content_types,
            content_types_dirty: false,
            next_drawing_id,
            media_count: 0,
        })
    }

    /// Kind of package this template is.
    pub fn kind(&self) -> DocumentKind {
        self.main.kind
    }

    /// Path of the main document part.
    pub fn main_part_path(&self) -> &str {
        &self.main.path
    }

    /// Current XML of the main document part.
    pub fn main_xml(&self) -> &str {
        &self.parts[0].xml
    }

    /// Current XML of a story part, if it is one this document edits.
    pub fn part_xml(&self, path: &str) -> Option<&str> {
        self.parts
            .iter()
            .find(|p| p.path == path)
            .map(|p| p.xml.as_str())
    }

    /// Paths of the story parts, main part first.
    pub fn part_paths(&self) -> impl Iterator<Item = &str> {
        self.parts.iter().map(|p| p.path.as_str())
    }

    /// Distinct token names still present, in document order.
    pub fn variables(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for part in &self.parts {
            for name in fragment::variables(&part.xml) {
                if !names.iter().any(|n| n == name) {
                    names.push(name.to_string());
                }
            }
        }
        names
    }

    /// Replace `${token}` with text. Returns the number of occurrences
    /// replaced across all story parts.
    pub fn set_text(&mut self, token: &str, value: &str, options: &TextOptions) -> usize {
        let needle = fragment::macro_for(&normalize_token(token));
        let markup = prepare_text(value, options);
        let mut remaining = options.limit;
        let mut total = 0;

        for part in &mut self.parts {
            if remaining == Some(0) {
                break;
            }
            let count = fragment::replace_limited(&mut part.xml, &needle, &markup, remaining);
            part.dirty |= count > 0;
            remaining = remaining.map(|r| r - count);
            total += count;
        }
        total
    }

    /// Replace `${token}` with an image loaded from `path`.
    ///
    /// A missing or unreadable source is not an error: the token stays in
    /// place and the outcome says why.
    pub fn set_image(
        &mut self,
        token: &str,
        path: &Path,
        options: &ImageOptions,
    ) -> Result<ImageOutcome> {
        match ImageAsset::open(path) {
            Ok(asset) => self.set_image_asset(token, &asset, options),
            Err(reason) => Ok(ImageOutcome::Skipped(reason)),
        }
    }

    /// Replace `${token}` with an already loaded image.
    ///
    /// The media part is only added when the token occurs in a text node and
    /// the limit allows at least one occurrence.
    pub fn set_image_asset(
        &mut self,
        token: &str,
        asset: &ImageAsset,
        options: &ImageOptions,
    ) -> Result<ImageOutcome> {
        let needle = fragment::macro_for(&normalize_token(token));
        let occurring: Vec<usize> = (0..self.parts.len())
            .filter(|&i| fragment::text_node_occurrences(&self.parts[i].xml, &needle) > 0)
            .collect();
        if occurring.is_empty() || options.limit == Some(0) {
            return Ok(ImageOutcome::Embedded(0));
        }

        let media_path = self.store_media(asset)?;
        let (cx, cy) = asset.extent(options.size());
        let mut remaining = options.limit;
        let mut total = 0;

        for index in occurring {
            if remaining == Some(0) {
                break;
            }
            let part_path = self.parts[index].path.clone();
            let rel_id = self.add_relationship(&part_path, IMAGE_RELATIONSHIP_TYPE, &media_path)?;

            let next_id = &mut self.next_drawing_id;
            let part = &mut self.parts[index];
            let count = fragment::embed_in_text_nodes(
                &mut part.xml,
                &needle,
                remaining,
                || {
                    let id = *next_id;
                    *next_id += 1;
                    inline_drawing(&rel_id, cx, cy, id, asset.name())
                },
            );
            part.dirty |= count > 0;
            remaining = remaining.map(|r| r - count);
            total += count;
        }

        tracing::debug!(token, media = %media_path, occurrences = total, "image embedded");
        Ok(ImageOutcome::Embedded(total))
    }

    /// Store an image as a media part referenced from the main part.
    ///
    /// Returns the relationship id to use in an `r:embed` attribute.
    pub fn add_image_part(&mut self, asset: &ImageAsset) -> Result<String> {
        let media_path = self.store_media(asset)?;
        let main_path = self.main.path.clone();
        self.add_relationship(&main_path, IMAGE_RELATIONSHIP_TYPE, &media_path)
    }

    /// Duplicate the row (or, outside a table, the paragraph) holding
    /// `${anchor}` once per copy, suffixing every token in copy `i` with `#i`.
    ///
    /// A row that starts a vertical merge is cloned together with its
    /// continuation rows. Drawings in each copy get fresh ids. Zero copies
    /// leaves the document untouched.
    pub fn clone_row(&mut self, anchor: &str, copies: usize) -> Result<()> {
        if copies == 0 {
            return Ok(());
        }

        let needle = fragment::macro_for(&normalize_token(anchor));
        let next_id = &mut self.next_drawing_id;
        let main = &mut self.parts[0];
        let xml = &mut main.xml;
        let offset = xml.find(&needle).ok_or_else(|| {
            Error::TemplateStructure(format!("clone anchor {} not found", needle))
        })?;
        let block = fragment::locate_enclosing_block(xml, offset).ok_or_else(|| {
            Error::TemplateStructure(format!("no table row or paragraph encloses {}", needle))
        })?;

        let range = match block.kind {
            BlockKind::Row => fragment::extend_merged_rows(xml, block.range),
            BlockKind::Paragraph => block.range,
        };

        let template = &xml[range.clone()];
        let mut copies_xml = String::with_capacity(template.len() * copies);
        for index in 1..=copies {
            let copy = fragment::suffix_tokens(template, index);
            copies_xml.push_str(&fragment::renumber_drawings(&copy, next_id));
        }
        xml.replace_range(range, &copies_xml);
        main.dirty = true;

        tracing::debug!(anchor, copies, kind = ?block.kind, "block cloned");
        Ok(())
    }

    /// Replace everything from the paragraph holding `${name}` through the
    /// paragraph holding `${/name}` with raw XML. Returns false when the
    /// markers are not found.
    pub fn replace_block(&mut self, name: &str, xml: &str) -> bool {
        let main = &mut self.parts[0];
        let replaced = fragment::replace_block(&mut main.xml, &normalize_token(name), xml);
        main.dirty |= replaced;
        replaced
    }

    /// Remove the `${name}` … `${/name}` block.
    pub fn delete_block(&mut self, name: &str) -> bool {
        self.replace_block(name, "")
    }

    /// Serialize the edited package.
    pub fn into_bytes(self) -> Result<Vec<u8>> {
        self.flush().to_bytes()
    }

    /// Serialize the edited package and write it atomically to `destination`.
    pub fn save(self, destination: impl AsRef<Path>) -> Result<()> {
        self.flush().save(destination)
    }

    fn flush(mut self) -> OoxmlContainer {
        for part in self.parts.iter().filter(|p| p.dirty) {
            self.container.write_xml(part.path.as_str(), &part.xml);
        }
        for (part, rels) in &self.rels {
            self.container.write_xml(rels_path_for(part), rels);
        }
        if self.content_types_dirty {
            self.container.write_xml(CONTENT_TYPES_PATH, &self.content_types);
        }
        self.container
    }

    /// Add the media part and register its extension.
    fn store_media(&mut self, asset: &ImageAsset) -> Result<String> {
        let dir = self
            .main
            .path
            .rsplit_once('/')
            .map(|(dir, _)| format!("{}/media", dir))
            .unwrap_or_else(|| "media".to_string());

        let path = loop {
            self.media_count += 1;
            let candidate = format!(
                "{}/docmerge_image{}.{}",
                dir,
                self.media_count,
                asset.extension()
            );
            if !self.container.exists(&candidate) {
                break candidate;
            }
        };

        self.container.write_part(path.as_str(), asset.bytes().to_vec());
        self.ensure_default_content_type(asset.extension(), asset.mime_type())?;
        Ok(path)
    }

    fn ensure_default_content_type(&mut self, extension: &str, mime: &str) -> Result<()> {
        let marker = format!("extension=\"{}\"", extension);
        if self.content_types.to_ascii_lowercase().contains(&marker) {
            return Ok(());
        }

        let close = self.content_types.rfind("</Types>").ok_or_else(|| {
            Error::InvalidData("content types part has no closing </Types>".to_string())
        })?;
        self.content_types.insert_str(
            close,
            &format!(r#"<Default Extension="{}" ContentType="{}"/>"#, extension, mime),
        );
        self.content_types_dirty = true;
        Ok(())
    }

    /// Add a relationship from `part` to the package part `target` and return
    /// its id.
    fn add_relationship(&mut self, part: &str, rel_type: &str, target: &str) -> Result<String> {
        let xml = match self.rels.remove(part) {
            Some(xml) => xml,
            None => match self.container.read_xml(&rels_path_for(part)) {
                Ok(xml) => xml,
                Err(Error::MissingComponent(_)) => String::new(),
                Err(e) => return Err(e),
            },
        };

        let id = parse_relationships_xml(&xml)?.next_id();
        let entry = format!(
            r#"<Relationship Id="{}" Type="{}" Target="{}"/>"#,
            id,
            rel_type,
            OoxmlContainer::relative_target(part, target)
        );

        let xml = match xml.rfind("</Relationships>") {
            Some(close) => {
                let mut xml = xml;
                xml.insert_str(close, &entry);
                xml
            }
            None => format!(
                "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\n<Relationships xmlns=\"{}\">{}</Relationships>",
                RELATIONSHIPS_NAMESPACE, entry
            ),
        };
        self.rels.insert(part.to_string(), xml);
        Ok(id)
    }
}
