//! Markup synthesis for replacement values.

use crate::model::TextOptions;
use std::borrow::Cow;

/// Opening tag of a text node that keeps leading and trailing spaces.
pub(crate) const PRESERVED_TEXT_OPEN: &str = r#"<w:t xml:space="preserve">"#;

const BOLD_OPEN: &str = "&lt;B&gt;";
const BOLD_CLOSE: &str = "&lt;/B&gt;";
const BOLD_RUN: &str = r#"</w:t></w:r><w:r><w:rPr><w:b/></w:rPr><w:t xml:space="preserve">"#;
const PLAIN_RUN: &str = r#"</w:t></w:r><w:r><w:t xml:space="preserve">"#;
const LINE_BREAK: &str = r#"</w:t><w:br/><w:t xml:space="preserve">"#;

/// Longest HTML5 entity name, `CounterClockwiseContourIntegral`, plus slack.
const MAX_REFERENCE_LEN: usize = 32;

/// Decode HTML5 named entities and character references.
///
/// Unknown entities, malformed references and references to characters XML
/// does not allow are kept as written.
pub(crate) fn decode_entities(raw: &str) -> Cow<'_, str> {
    if !raw.contains('&') {
        return Cow::Borrowed(raw);
    }

    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let tail = &rest[amp + 1..];
        let reference = tail
            .find(';')
            .filter(|&semi| semi > 0 && semi <= MAX_REFERENCE_LEN)
            .map(|semi| &tail[..semi]);

        match reference.and_then(|name| resolve_reference(name, &mut out).then_some(name)) {
            Some(name) => rest = &tail[name.len() + 1..],
            None => {
                out.push('&');
                rest = tail;
            }
        }
    }
    out.push_str(rest);
    Cow::Owned(out)
}

/// Append the expansion of `&name;` to `out`, returning whether it resolved.
fn resolve_reference(name: &str, out: &mut String) -> bool {
    match name.strip_prefix('#') {
        Some(number) => match char_reference(number) {
            Some(c) => {
                out.push(c);
                true
            }
            None => false,
        },
        None => match quick_xml::escape::resolve_html5_entity(name) {
            Some(value) => {
                out.push_str(value);
                true
            }
            None => false,
        },
    }
}

fn char_reference(number: &str) -> Option<char> {
    let code = match number.strip_prefix(['x', 'X']) {
        Some(hex) if !hex.starts_with('+') => u32::from_str_radix(hex, 16).ok()?,
        Some(_) => return None,
        None if number.starts_with('+') => return None,
        None => number.parse().ok()?,
    };
    char::from_u32(code).filter(|&c| is_xml_char(c))
}

/// `Char` production of XML 1.0.
fn is_xml_char(c: char) -> bool {
    matches!(c,
        '\u{9}' | '\u{A}' | '\u{D}'
        | '\u{20}'..='\u{D7FF}'
        | '\u{E000}'..='\u{FFFD}'
        | '\u{10000}'..='\u{10FFFF}')
}

/// Decode, then escape, a raw value for use as character data.
pub(crate) fn escape_text(raw: &str) -> String {
    let decoded = decode_entities(raw);
    quick_xml::escape::escape(decoded.as_ref()).into_owned()
}

/// Turn escaped `<B>…</B>` markers into a bold run.
pub(crate) fn format_bold(escaped: &str) -> String {
    escaped.replace(BOLD_OPEN, BOLD_RUN).replace(BOLD_CLOSE, PLAIN_RUN)
}

/// Turn each line break into a `<w:br/>` between text nodes.
pub(crate) fn format_multiline(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\r' => {
                chars.next_if_eq(&'\n');
                out.push_str(LINE_BREAK);
            }
            '\n' | '\u{0B}' | '\u{0C}' | '\u{85}' | '\u{2028}' | '\u{2029}' => {
                out.push_str(LINE_BREAK)
            }
            c => out.push(c),
        }
    }
    out
}

/// Markup that a `${token}` inside a text node is replaced with.
///
/// ```
/// use docmerge::template::prepare_text;
/// use docmerge::TextOptions;
///
/// assert_eq!(prepare_text("A & B", &TextOptions::default()), "A &amp; B");
/// ```
pub fn prepare_text(value: &str, options: &TextOptions) -> String {
    let mut text = escape_text(value);
    if options.bold_markup {
        text = format_bold(&text);
    }
    if options.multiline {
        text = format_multiline(&text);
    }
    text
}

/// Inline DrawingML for a picture, sized in EMU.
///
/// Namespaces are declared on the fragment so it is valid in parts whose
/// root element does not declare them.
pub(crate) fn inline_drawing(rel_id: &str, cx: u64, cy: u64, id: u32, name: &str) -> String {
    let name = quick_xml::escape::escape(name);
    format!(
        concat!(
            r#"<w:drawing><wp:inline distT="0" distB="0" distL="0" distR="0" "#,
            r#"xmlns:wp="http://schemas.openxmlformats.org/drawingml/2006/wordprocessingDrawing">"#,
            r#"<wp:extent cx="{cx}" cy="{cy}"/><wp:effectExtent l="0" t="0" r="0" b="0"/>"#,
            r#"<wp:docPr id="{id}" name="Picture {id}" descr="{name}"/>"#,
            r#"<wp:cNvGraphicFramePr><a:graphicFrameLocks noChangeAspect="1" "#,
            r#"xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main"/></wp:cNvGraphicFramePr>"#,
            r#"<a:graphic xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main">"#,
            r#"<a:graphicData uri="http://schemas.openxmlformats.org/drawingml/2006/picture">"#,
            r#"<pic:pic xmlns:pic="http://schemas.openxmlformats.org/drawingml/2006/picture">"#,
            r#"<pic:nvPicPr><pic:cNvPr id="{id}" name="{name}"/><pic:cNvPicPr/></pic:nvPicPr>"#,
            r#"<pic:blipFill><a:blip r:embed="{rel_id}" "#,
            r#"xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"/>"#,
            r#"<a:stretch><a:fillRect/></a:stretch></pic:blipFill>"#,
            r#"<pic:spPr><a:xfrm><a:off x="0" y="0"/><a:ext cx="{cx}" cy="{cy}"/></a:xfrm>"#,
            r#"<a:prstGeom prst="rect"><a:avLst/></a:prstGeom></pic:spPr>"#,
            r#"</pic:pic></a:graphicData></a:graphic></wp:inline></w:drawing>"#
        ),
        cx = cx,
        cy = cy,
        id = id,
        name = name,
        rel_id = rel_id,
    )
}
