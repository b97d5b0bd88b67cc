//! Raw-markup fragment editing.
//!
//! Everything here works on the serialized XML of a part as a string. The
//! assumptions are:
//!
//! - WordprocessingML elements use the conventional `w:` prefix;
//! - after [`fix_broken_macros`], a `${token}` marker sits inside one text node;
//! - rows and paragraphs are located with a real XML pass (quick-xml) but are
//!   then cut and spliced as byte ranges.

use quick_xml::events::Event;
use quick_xml::Reader;
use regex::{Captures, Regex};
use std::borrow::Cow;
use std::collections::HashMap;
use std::ops::Range;
use std::sync::LazyLock;

use super::markup::PRESERVED_TEXT_OPEN;

/// A `$` closed off by markup before its `{`, or a plain `${`, up to the `}`.
static BROKEN_MACRO: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$(?:\{|<[^{$]*?>\{)[^}$]*?\}").expect("invalid macro pattern")
});

static TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").expect("invalid tag pattern"));

static TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([^{}$<>]*)\}").expect("invalid token pattern"));

static VMERGE_RESTART: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<w:vMerge\s+w:val="restart"\s*/>"#).expect("invalid vMerge pattern")
});

static VMERGE_CONTINUE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<w:vMerge(?:\s+w:val="continue")?\s*/>"#).expect("invalid vMerge pattern")
});

static DRAWING_ID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(<(?:wp:docPr|pic:cNvPr)\b[^>]*?\bid=")(\d+)""#).expect("invalid drawing id pattern")
});

/// Marker text for a token.
pub(crate) fn macro_for(token: &str) -> String {
    format!("${{{}}}", token)
}

/// Collapse markers that the editor split across runs.
///
/// `<w:t>$</w:t></w:r><w:r><w:t>{name}</w:t>` becomes `<w:t>${name}</w:t>`.
pub(crate) fn fix_broken_macros(xml: &str) -> Cow<'_, str> {
    BROKEN_MACRO.replace_all(xml, |caps: &Captures| {
        TAG.replace_all(&caps[0], "").into_owned()
    })
}

/// Token names in document order, duplicates included.
pub(crate) fn variables(xml: &str) -> impl Iterator<Item = &str> {
    TOKEN
        .captures_iter(xml)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str())
}

/// Rename every `${name}` in a fragment to `${name#index}`.
pub(crate) fn suffix_tokens(fragment: &str, index: usize) -> String {
    TOKEN
        .replace_all(fragment, |caps: &Captures| {
            format!("${{{}#{}}}", &caps[1], index)
        })
        .into_owned()
}

/// Give every drawing in a copied fragment a fresh id, starting at `next_id`.
///
/// A `pic:cNvPr` that shared its id with a `wp:docPr` keeps sharing the new one.
pub(crate) fn renumber_drawings(fragment: &str, next_id: &mut u32) -> String {
    let mut assigned: HashMap<String, u32> = HashMap::new();
    DRAWING_ID
        .replace_all(fragment, |caps: &Captures| {
            let id = *assigned.entry(caps[2].to_string()).or_insert_with(|| {
                let id = *next_id;
                *next_id += 1;
                id
            });
            format!(r#"{}{}""#, &caps[1], id)
        })
        .into_owned()
}

/// Replace up to `limit` occurrences of `needle` and return how many were
/// replaced.
pub(crate) fn replace_limited(
    xml: &mut String,
    needle: &str,
    replacement: &str,
    limit: Option<usize>,
) -> usize {
    let found = xml.matches(needle).count();
    let count = limit.map_or(found, |limit| found.min(limit));
    if count > 0 {
        *xml = xml.replacen(needle, replacement, count);
    }
    count
}

/// Whether `pos` lies in the character data of a `<w:t>` element.
pub(crate) fn in_text_node(xml: &str, pos: usize) -> bool {
    let Some(tag_start) = xml[..pos].rfind('<') else {
        return false;
    };
    let tag = &xml[tag_start..pos];
    (tag.starts_with("<w:t>") || tag.starts_with("<w:t ")) && tag.contains('>')
}

/// Number of occurrences of `needle` that sit inside text nodes.
pub(crate) fn text_node_occurrences(xml: &str, needle: &str) -> usize {
    xml.match_indices(needle)
        .filter(|(pos, _)| in_text_node(xml, *pos))
        .count()
}

/// Split the text node around each occurrence of `needle` and put the markup
/// produced by `insert` between the two halves, which stay in the same run.
///
/// Occurrences outside a `<w:t>` element are left alone.
pub(crate) fn embed_in_text_nodes(
    xml: &mut String,
    needle: &str,
    limit: Option<usize>,
    mut insert: impl FnMut() -> String,
) -> usize {
    let mut count = 0;
    let mut search_from = 0;

    while limit.map_or(true, |limit| count < limit) {
        let Some(found) = xml[search_from..].find(needle) else {
            break;
        };
        let pos = search_from + found;
        let end = pos + needle.len();

        if !in_text_node(xml, pos) {
            search_from = end;
            continue;
        }

        let replacement = format!("</w:t>{}{}", insert(), PRESERVED_TEXT_OPEN);
        xml.replace_range(pos..end, &replacement);
        search_from = pos + replacement.len();
        count += 1;
    }

    count
}

/// Structural block kinds the cloning engine duplicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    /// Table row (`<w:tr>`)
    Row,
    /// Paragraph (`<w:p>`)
    Paragraph,
}

/// A located block: its kind and byte range in the part XML.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    /// Block kind
    pub kind: BlockKind,
    /// Byte range from `<` of the start tag to after `>` of the end tag
    pub range: Range<usize>,
}

fn block_kind(name: &[u8]) -> Option<BlockKind> {
    match name {
        b"w:tr" => Some(BlockKind::Row),
        b"w:p" => Some(BlockKind::Paragraph),
        _ => None,
    }
}

/// Innermost row and innermost paragraph containing `offset`.
fn enclosing_blocks(xml: &str, offset: usize) -> (Option<Range<usize>>, Option<Range<usize>>) {
    let mut reader = Reader::from_str(xml);
    let mut open: Vec<(BlockKind, usize)> = Vec::new();
    let mut row = None;
    let mut paragraph = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                if let Some(kind) = block_kind(e.name().as_ref()) {
                    let tag_end = reader.buffer_position() as usize;
                    // Start tags hold no '<', so the last one before the tag end opens it
                    let start = xml[..tag_end].rfind('<').unwrap_or(0);
                    open.push((kind, start));
                }
            }
            Ok(Event::End(e)) => {
                if block_kind(e.name().as_ref()).is_none() {
                    continue;
                }
                let Some((kind, start)) = open.pop() else {
                    break;
                };
                let end = reader.buffer_position() as usize;
                if start <= offset && offset < end {
                    match kind {
                        BlockKind::Row if row.is_none() => row = Some(start..end),
                        BlockKind::Paragraph if paragraph.is_none() => {
                            paragraph = Some(start..end)
                        }
                        _ => {}
                    }
                }
                if row.is_some() {
                    break;
                }
            }
            Ok(Event::Eof) | Err(_) => break,
            _ => {}
        }
    }

    (row, paragraph)
}

/// Smallest structural block around `offset`: the table row if there is one,
/// otherwise the paragraph.
pub(crate) fn locate_enclosing_block(xml: &str, offset: usize) -> Option<Block> {
    match enclosing_blocks(xml, offset) {
        (Some(range), _) => Some(Block {
            kind: BlockKind::Row,
            range,
        }),
        (None, Some(range)) => Some(Block {
            kind: BlockKind::Paragraph,
            range,
        }),
        (None, None) => None,
    }
}

/// Paragraph around `offset`.
pub(crate) fn enclosing_paragraph(xml: &str, offset: usize) -> Option<Range<usize>> {
    enclosing_blocks(xml, offset).1
}

/// End offset of the element whose start tag begins at `start`.
pub(crate) fn element_end(xml: &str, start: usize) -> Option<usize> {
    let mut reader = Reader::from_str(&xml[start..]);
    let mut depth = 0usize;

    loop {
        match reader.read_event() {
            Ok(Event::Start(_)) => depth += 1,
            Ok(Event::End(_)) => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(start + reader.buffer_position() as usize);
                }
            }
            Ok(Event::Empty(_)) if depth == 0 => {
                return Some(start + reader.buffer_position() as usize)
            }
            Ok(Event::Eof) | Err(_) => return None,
            _ => {}
        }
    }
}

/// The `<w:tr>` immediately following `from`, if the next element is one.
fn next_row(xml: &str, from: usize) -> Option<Range<usize>> {
    let rest = &xml[from..];
    let start = from + (rest.len() - rest.trim_start().len());
    let after = xml[start..].strip_prefix("<w:tr")?;
    if !after.starts_with(|c: char| c == '>' || c == '/' || c.is_whitespace()) {
        return None;
    }
    element_end(xml, start).map(|end| start..end)
}

/// Grow a row range over the continuation rows of a vertical merge that the
/// row starts.
pub(crate) fn extend_merged_rows(xml: &str, row: Range<usize>) -> Range<usize> {
    if !VMERGE_RESTART.is_match(&xml[row.clone()]) {
        return row;
    }

    let mut end = row.end;
    while let Some(next) = next_row(xml, end) {
        if !VMERGE_CONTINUE.is_match(&xml[next.clone()]) {
            break;
        }
        end = next.end;
    }
    row.start..end
}

/// Replace everything from the paragraph holding `${name}` through the
/// paragraph holding `${/name}`. Returns false when either marker is missing.
pub(crate) fn replace_block(xml: &mut String, name: &str, replacement: &str) -> bool {
    let open = macro_for(name);
    let close = macro_for(&format!("/{}", name));

    let Some(open_pos) = xml.find(&open) else {
        return false;
    };
    let Some(close_pos) = xml[open_pos..].find(&close).map(|p| open_pos + p) else {
        return false;
    };

    let start = enclosing_paragraph(xml, open_pos).map_or(open_pos, |p| p.start);
    let end = enclosing_paragraph(xml, close_pos).map_or(close_pos + close.len(), |p| p.end);
    xml.replace_range(start..end, replacement);
    true
}
