//! Replacement plans and the builder that assembles them.

use super::options::{ImageOptions, TextOptions};
use std::path::PathBuf;

/// A pending substitution for one token.
#[derive(Debug, Clone, PartialEq)]
pub enum Replacement {
    /// Replace the token with text
    Text {
        /// Raw value; escaped at generation time
        value: String,
        /// Text options
        options: TextOptions,
    },
    /// Replace the token with an image
    Image {
        /// Image source, resolved against the generation base directory
        path: PathBuf,
        /// Image options
        options: ImageOptions,
    },
}

impl Replacement {
    /// A text replacement with default options.
    pub fn text(value: impl Into<String>) -> Self {
        Replacement::Text {
            value: value.into(),
            options: TextOptions::default(),
        }
    }

    /// An image replacement with default options.
    pub fn image(path: impl Into<PathBuf>) -> Self {
        Replacement::Image {
            path: path.into(),
            options: ImageOptions::default(),
        }
    }

    /// Occurrence cap of this replacement.
    pub fn limit(&self) -> Option<usize> {
        match self {
            Replacement::Text { options, .. } => options.limit,
            Replacement::Image { options, .. } => options.limit,
        }
    }
}

/// Strip a `${…}` wrapper so tokens can be given either way.
pub(crate) fn normalize_token(token: &str) -> String {
    token
        .strip_prefix("${")
        .and_then(|t| t.strip_suffix('}'))
        .unwrap_or(token)
        .to_string()
}

/// Insert or overwrite an entry, keeping first-insertion order.
fn upsert(entries: &mut Vec<(String, Replacement)>, token: String, replacement: Replacement) {
    match entries.iter_mut().find(|(existing, _)| *existing == token) {
        Some(entry) => entry.1 = replacement,
        None => entries.push((token, replacement)),
    }
}

/// One data record of a clone group: local token name to replacement.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CloneRow {
    entries: Vec<(String, Replacement)>,
}

impl CloneRow {
    /// Look up the replacement for a local token name.
    pub fn get(&self, token: &str) -> Option<&Replacement> {
        self.entries
            .iter()
            .find(|(name, _)| name == token)
            .map(|(_, r)| r)
    }

    /// Iterate entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Replacement)> {
        self.entries.iter().map(|(name, r)| (name.as_str(), r))
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the row has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Rows to be rendered by cloning the template row anchored at `${key}`.
#[derive(Debug, Clone, PartialEq)]
pub struct CloneGroup {
    key: String,
    rows: Vec<CloneRow>,
}

impl CloneGroup {
    /// Clone key, which is also the anchor token.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Rows in append order; row `i` renders tokens suffixed `#{i + 1}`.
    pub fn rows(&self) -> &[CloneRow] {
        &self.rows
    }
}

/// Everything a generation pass applies, in one immutable value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReplacementPlan {
    replacements: Vec<(String, Replacement)>,
    clones: Vec<CloneGroup>,
    blocks: Vec<(String, String)>,
}

impl ReplacementPlan {
    /// Start building a plan.
    pub fn builder() -> PlanBuilder {
        PlanBuilder::new()
    }

    /// Top-level replacements, one per token.
    pub fn replacements(&self) -> impl Iterator<Item = (&str, &Replacement)> {
        self.replacements.iter().map(|(t, r)| (t.as_str(), r))
    }

    /// Look up the top-level replacement for a token.
    pub fn replacement(&self, token: &str) -> Option<&Replacement> {
        self.replacements
            .iter()
            .find(|(t, _)| t == token)
            .map(|(_, r)| r)
    }

    /// Clone groups in creation order.
    pub fn clone_groups(&self) -> &[CloneGroup] {
        &self.clones
    }

    /// Look up a clone group by key.
    pub fn clone_group(&self, key: &str) -> Option<&CloneGroup> {
        self.clones.iter().find(|g| g.key == key)
    }

    /// Block replacements: block name to replacement XML.
    pub fn blocks(&self) -> impl Iterator<Item = (&str, &str)> {
        self.blocks.iter().map(|(n, x)| (n.as_str(), x.as_str()))
    }

    /// Whether the plan would change nothing.
    pub fn is_empty(&self) -> bool {
        self.replacements.is_empty()
            && self.blocks.is_empty()
            && self.clones.iter().all(|g| g.rows.is_empty())
    }
}

/// Accumulates replacements before a single generation pass.
///
/// Setting the same top-level token twice keeps the last value. Clone rows
/// are opened with [`create_clone`](Self::create_clone) and filled with
/// [`add_to_clone`](Self::add_to_clone), which always targets the newest row.
///
/// # Example
///
/// ```
/// use docmerge::{PlanBuilder, TextOptions};
///
/// let plan = PlanBuilder::new()
///     .replace("category", "Elite men")
///     .replace_with_options("notes", "line 1\nline 2", TextOptions::new().with_multiline(true))
///     .create_clone("rank")
///     .add_to_clone("rank", "rank", "1", TextOptions::default())
///     .add_to_clone("rank", "name", "James", TextOptions::default())
///     .build();
///
/// assert_eq!(plan.clone_group("rank").unwrap().rows().len(), 1);
/// ```
#[derive(Debug, Clone, Default)]
pub struct PlanBuilder {
    plan: ReplacementPlan,
}

impl PlanBuilder {
    /// Create an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace a token with text using default options.
    pub fn replace(self, token: &str, value: impl Into<String>) -> Self {
        self.replace_with_options(token, value, TextOptions::default())
    }

    /// Replace a token with text.
    pub fn replace_with_options(
        mut self,
        token: &str,
        value: impl Into<String>,
        options: TextOptions,
    ) -> Self {
        let replacement = Replacement::Text {
            value: value.into(),
            options,
        };
        upsert(
            &mut self.plan.replacements,
            normalize_token(token),
            replacement,
        );
        self
    }

    /// Replace a token with an image.
    pub fn replace_with_image(
        mut self,
        token: &str,
        path: impl Into<PathBuf>,
        options: ImageOptions,
    ) -> Self {
        let replacement = Replacement::Image {
            path: path.into(),
            options,
        };
        upsert(
            &mut self.plan.replacements,
            normalize_token(token),
            replacement,
        );
        self
    }

    /// Start a new row in the clone group `key`, creating the group if needed.
    pub fn create_clone(mut self, key: &str) -> Self {
        let key = normalize_token(key);
        match self.plan.clones.iter_mut().find(|g| g.key == key) {
            Some(group) => group.rows.push(CloneRow::default()),
            None => self.plan.clones.push(CloneGroup {
                key,
                rows: vec![CloneRow::default()],
            }),
        }
        self
    }

    /// Set a text entry in the newest row of clone group `key`.
    pub fn add_to_clone(
        self,
        key: &str,
        token: &str,
        value: impl Into<String>,
        options: TextOptions,
    ) -> Self {
        let replacement = Replacement::Text {
            value: value.into(),
            options,
        };
        self.add_entry_to_clone(key, token, replacement)
    }

    /// Set an image entry in the newest row of clone group `key`.
    pub fn add_image_to_clone(
        self,
        key: &str,
        token: &str,
        path: impl Into<PathBuf>,
        options: ImageOptions,
    ) -> Self {
        let replacement = Replacement::Image {
            path: path.into(),
            options,
        };
        self.add_entry_to_clone(key, token, replacement)
    }

    /// Set an entry in the newest row of clone group `key`.
    ///
    /// Entries for a group without an open row are dropped.
    pub fn add_entry_to_clone(mut self, key: &str, token: &str, replacement: Replacement) -> Self {
        let key = normalize_token(key);
        let row = self
            .plan
            .clones
            .iter_mut()
            .find(|g| g.key == key)
            .and_then(|g| g.rows.last_mut());

        match row {
            Some(row) => upsert(&mut row.entries, normalize_token(token), replacement),
            None => tracing::warn!(
                clone_key = %key,
                token,
                "clone entry dropped: no row started with create_clone"
            ),
        }
        self
    }

    /// Replace the block between `${name}` and `${/name}` with raw XML.
    pub fn replace_block(mut self, name: &str, xml: impl Into<String>) -> Self {
        let name = normalize_token(name);
        let xml = xml.into();
        match self.plan.blocks.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = xml,
            None => self.plan.blocks.push((name, xml)),
        }
        self
    }

    /// Remove the block between `${name}` and `${/name}`.
    pub fn delete_block(self, name: &str) -> Self {
        self.replace_block(name, String::new())
    }

    /// Finish the plan.
    pub fn build(self) -> ReplacementPlan {
        self.plan
    }
}

/// Continue building on top of an existing plan, e.g. one read from JSON.
impl From<ReplacementPlan> for PlanBuilder {
    fn from(plan: ReplacementPlan) -> Self {
        Self { plan }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Dimension;

    #[test]
    fn test_last_write_wins() {
        let plan = PlanBuilder::new()
            .replace("name", "first")
            .replace("other", "x")
            .replace("name", "second")
            .build();

        assert_eq!(plan.replacement("name"), Some(&Replacement::text("second")));
        let tokens: Vec<&str> = plan.replacements().map(|(t, _)| t).collect();
        assert_eq!(tokens, vec!["name", "other"]);
    }

    #[test]
    fn test_wrapped_tokens_are_normalized() {
        let plan = PlanBuilder::new().replace("${name}", "x").build();
        assert!(plan.replacement("name").is_some());
    }

    #[test]
    fn test_clone_rows_in_order() {
        let plan = PlanBuilder::new()
            .create_clone("rank")
            .add_to_clone("rank", "rank", "1", TextOptions::default())
            .add_to_clone("rank", "name", "James", TextOptions::default())
            .create_clone("rank")
            .add_to_clone("rank", "rank", "2", TextOptions::default())
            .add_image_to_clone(
                "rank",
                "avatar",
                "avatar.png",
                ImageOptions::new().with_height(Dimension::mm(30.0)),
            )
            .build();

        let group = plan.clone_group("rank").unwrap();
        assert_eq!(group.rows().len(), 2);
        assert_eq!(group.rows()[0].get("rank"), Some(&Replacement::text("1")));
        assert_eq!(group.rows()[1].get("rank"), Some(&Replacement::text("2")));
        assert!(matches!(
            group.rows()[1].get("avatar"),
            Some(Replacement::Image { .. })
        ));
        assert!(group.rows()[1].get("name").is_none());
    }

    #[test]
    fn test_add_without_row_is_dropped() {
        let plan = PlanBuilder::new()
            .add_to_clone("rank", "rank", "1", TextOptions::default())
            .build();
        assert!(plan.clone_group("rank").is_none());
        assert!(plan.is_empty());
    }

    #[test]
    fn test_extend_existing_plan() {
        let base = PlanBuilder::new().replace("a", "1").replace("b", "2").build();
        let plan = PlanBuilder::from(base).replace("a", "3").build();
        assert_eq!(plan.replacement("a"), Some(&Replacement::text("3")));
        assert_eq!(plan.replacement("b"), Some(&Replacement::text("2")));
    }

    #[test]
    fn test_blocks() {
        let plan = PlanBuilder::new()
            .replace_block("legal", "<w:p/>")
            .delete_block("legal")
            .build();
        let blocks: Vec<(&str, &str)> = plan.blocks().collect();
        assert_eq!(blocks, vec![("legal", "")]);
    }
}
