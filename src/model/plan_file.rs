//! JSON plan files.
//!
//! A plan file is a declarative form of the [`PlanBuilder`] calls:
//!
//! ```json
//! {
//!   "replacements": [
//!     {"token": "category", "value": "Elite men"},
//!     {"token": "logo", "type": "image", "value": "assets/logo.png", "width": "40mm"}
//!   ],
//!   "clones": [
//!     {"key": "rank", "rows": [[{"token": "rank", "value": 1}, {"token": "name", "value": "James"}]]}
//!   ],
//!   "blocks": [{"name": "legal", "xml": ""}]
//! }
//! ```

use super::dimension::Dimension;
use super::options::{ImageOptions, TextOptions};
use super::plan::{PlanBuilder, Replacement, ReplacementPlan};
use crate::error::{Error, Result};
use serde::{Deserialize, Deserializer};
use std::path::Path;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct PlanFile {
    #[serde(default)]
    replacements: Vec<EntrySpec>,
    #[serde(default)]
    clones: Vec<CloneSpec>,
    #[serde(default)]
    blocks: Vec<BlockSpec>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CloneSpec {
    key: String,
    #[serde(default)]
    rows: Vec<Vec<EntrySpec>>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct BlockSpec {
    name: String,
    #[serde(default)]
    xml: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
enum EntryKind {
    #[default]
    Text,
    Image,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct EntrySpec {
    token: String,
    #[serde(default, deserialize_with = "scalar_string")]
    value: String,
    #[serde(default, rename = "type")]
    kind: EntryKind,
    #[serde(default)]
    multiline: bool,
    #[serde(default, deserialize_with = "limit")]
    limit: Option<usize>,
    #[serde(default = "default_bold")]
    bold: bool,
    #[serde(default, deserialize_with = "dimension")]
    width: Option<Dimension>,
    #[serde(default, deserialize_with = "dimension")]
    height: Option<Dimension>,
}

fn default_bold() -> bool {
    true
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Scalar {
    Text(String),
    Number(serde_json::Number),
    Bool(bool),
}

impl Scalar {
    fn into_string(self) -> String {
        match self {
            Scalar::Text(s) => s,
            Scalar::Number(n) => n.to_string(),
            Scalar::Bool(b) => b.to_string(),
        }
    }
}

fn scalar_string<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<String, D::Error> {
    Ok(Option::<Scalar>::deserialize(d)?
        .map(Scalar::into_string)
        .unwrap_or_default())
}

/// Negative limits mean unbounded.
fn limit<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<Option<usize>, D::Error> {
    let raw = Option::<i64>::deserialize(d)?;
    Ok(raw.and_then(|n| usize::try_from(n).ok()))
}

fn dimension<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<Option<Dimension>, D::Error> {
    match Option::<Scalar>::deserialize(d)? {
        None => Ok(None),
        Some(raw) => {
            Dimension::parse_optional(&raw.into_string()).map_err(serde::de::Error::custom)
        }
    }
}

impl EntrySpec {
    fn into_replacement(self) -> (String, Replacement) {
        let replacement = match self.kind {
            EntryKind::Text => Replacement::Text {
                value: self.value,
                options: TextOptions {
                    multiline: self.multiline,
                    limit: self.limit,
                    bold_markup: self.bold,
                },
            },
            EntryKind::Image => Replacement::Image {
                path: self.value.into(),
                options: ImageOptions {
                    width: self.width,
                    height: self.height,
                    limit: self.limit,
                },
            },
        };
        (self.token, replacement)
    }
}

impl ReplacementPlan {
    /// Parse a plan from its JSON form.
    pub fn from_json(json: &str) -> Result<Self> {
        let file: PlanFile = serde_json::from_str(json)?;
        let mut builder = PlanBuilder::new();

        for block in file.blocks {
            builder = builder.replace_block(&block.name, block.xml);
        }

        for clone in file.clones {
            for row in clone.rows {
                builder = builder.create_clone(&clone.key);
                for entry in row {
                    let (token, replacement) = entry.into_replacement();
                    builder = builder.add_entry_to_clone(&clone.key, &token, replacement);
                }
            }
        }

        for entry in file.replacements {
            builder = match entry.into_replacement() {
                (token, Replacement::Text { value, options }) => {
                    builder.replace_with_options(&token, value, options)
                }
                (token, Replacement::Image { path, options }) => {
                    builder.replace_with_image(&token, path, options)
                }
            };
        }

        Ok(builder.build())
    }

    /// Read and parse a JSON plan file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => Error::NotFound(path.to_path_buf()),
            _ => Error::Io(e),
        })?;
        Self::from_json(&json)
    }
}
