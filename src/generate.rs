//! Generation driver.
//!
//! Applies a [`ReplacementPlan`] to a template in one pass: blocks first, then
//! clone groups (clone the anchor row, fill each copy's `name#i` tokens), then
//! the top-level replacements.

use crate::error::{Error, Result};
use crate::model::{Replacement, ReplacementPlan};
use crate::template::{AssetError, Document, ImageOutcome};
use std::fmt;
use std::path::{Path, PathBuf};

/// Options for a generation pass.
#[derive(Debug, Clone, Default)]
pub struct GenerateOptions {
    /// Directory that relative template, destination and image paths are
    /// resolved against (the current directory when unset)
    pub base_dir: Option<PathBuf>,

    /// Regenerate even when the destination already exists
    pub uncached: bool,
}

impl GenerateOptions {
    /// Create default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the base directory for relative paths.
    pub fn with_base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base_dir = Some(dir.into());
        self
    }

    /// Always regenerate, ignoring an existing destination.
    pub fn with_uncached(mut self, uncached: bool) -> Self {
        self.uncached = uncached;
        self
    }

    /// Resolve a path against the base directory.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        match &self.base_dir {
            Some(base) if path.is_relative() => base.join(path),
            _ => path.to_path_buf(),
        }
    }
}

/// A non-fatal problem met while applying a plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Warning {
    /// An image source does not exist; its placeholder was left in place.
    MissingAsset {
        /// Token the image was meant for
        token: String,
        /// Resolved source path
        path: PathBuf,
    },
    /// An image source could not be decoded; its placeholder was left in place.
    UnreadableImage {
        /// Token the image was meant for
        token: String,
        /// Resolved source path
        path: PathBuf,
        /// Decoder message
        reason: String,
    },
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Warning::MissingAsset { token, path } => {
                write!(f, "image for ${{{}}} not found: {}", token, path.display())
            }
            Warning::UnreadableImage {
                token,
                path,
                reason,
            } => write!(
                f,
                "image for ${{{}}} unreadable ({}): {}",
                token,
                reason,
                path.display()
            ),
        }
    }
}

/// What a generation pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GenerationReport {
    /// Text occurrences replaced
    pub text_replacements: usize,
    /// Image occurrences embedded
    pub image_replacements: usize,
    /// Row copies produced by clone groups
    pub cloned_rows: usize,
    /// Blocks replaced or deleted
    pub blocks_replaced: usize,
    /// Non-fatal problems, in the order they occurred
    pub warnings: Vec<Warning>,
}

impl GenerationReport {
    /// Whether any warning was raised.
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}

/// A generated document held in memory.
#[derive(Debug)]
pub struct Generated {
    /// The finished package
    pub bytes: Vec<u8>,
    /// What the pass did
    pub report: GenerationReport,
}

/// Result of [`generate_file`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The destination was (re)written
    Generated(GenerationReport),
    /// The destination already existed and was reused untouched
    Cached,
}

/// Apply a plan to an open document.
///
/// Fails on the first fatal problem (a clone anchor that cannot be located);
/// the document should then be discarded.
pub fn apply_plan(
    document: &mut Document,
    plan: &ReplacementPlan,
    options: &GenerateOptions,
) -> Result<GenerationReport> {
    let mut report = GenerationReport::default();

    for (name, xml) in plan.blocks() {
        if document.replace_block(name, xml) {
            report.blocks_replaced += 1;
        } else {
            tracing::debug!(block = name, "block markers not found");
        }
    }

    for group in plan.clone_groups() {
        let rows = group.rows();
        if rows.is_empty() {
            continue;
        }
        document.clone_row(group.key(), rows.len())?;
        report.cloned_rows += rows.len();

        for (i, row) in rows.iter().enumerate() {
            for (token, replacement) in row.iter() {
                let indexed = format!("{}#{}", token, i + 1);
                apply_replacement(document, &indexed, replacement, options, &mut report)?;
            }
        }
    }

    for (token, replacement) in plan.replacements() {
        apply_replacement(document, token, replacement, options, &mut report)?;
    }

    Ok(report)
}

fn apply_replacement(
    document: &mut Document,
    token: &str,
    replacement: &Replacement,
    options: &GenerateOptions,
    report: &mut GenerationReport,
) -> Result<()> {
    match replacement {
        Replacement::Text {
            value,
            options: text,
        } => {
            let count = document.set_text(token, value, text);
            tracing::debug!(token, occurrences = count, "text replaced");
            report.text_replacements += count;
        }
        Replacement::Image {
            path,
            options: image,
        } => {
            let path = options.resolve(path);
            match document.set_image(token, &path, image)? {
                ImageOutcome::Embedded(count) => report.image_replacements += count,
                ImageOutcome::Skipped(AssetError::Missing) => {
                    tracing::warn!(token, path = %path.display(), "image source not found, placeholder kept");
                    report.warnings.push(Warning::MissingAsset {
                        token: token.to_string(),
                        path,
                    });
                }
                ImageOutcome::Skipped(AssetError::Unreadable(reason)) => {
                    tracing::warn!(token, path = %path.display(), %reason, "image source unreadable, placeholder kept");
                    report.warnings.push(Warning::UnreadableImage {
                        token: token.to_string(),
                        path,
                        reason,
                    });
                }
            }
        }
    }
    Ok(())
}

/// Apply a plan and serialize the result.
pub fn generate(
    mut document: Document,
    plan: &ReplacementPlan,
    options: &GenerateOptions,
) -> Result<Generated> {
    let report = apply_plan(&mut document, plan, options)?;
    let bytes = document.into_bytes()?;
    Ok(Generated { bytes, report })
}

/// Generate from a template held in memory.
pub fn generate_bytes(
    template: Vec<u8>,
    plan: &ReplacementPlan,
    options: &GenerateOptions,
) -> Result<Generated> {
    generate(Document::from_bytes(template)?, plan, options)
}

/// Generate `destination` from the template at `template`.
///
/// When the destination already exists and `options.uncached` is false the
/// existing file is reused as is and [`Outcome::Cached`] is returned. The
/// cache is keyed by destination path only: a changed plan needs a new
/// destination or `uncached`.
///
/// # Example
///
/// ```no_run
/// use docmerge::{generate_file, GenerateOptions, PlanBuilder};
///
/// let plan = PlanBuilder::new().replace("name", "Jane").build();
/// generate_file("template.docx", "out/letter.docx", &plan, &GenerateOptions::new())?;
/// # Ok::<(), docmerge::Error>(())
/// ```
pub fn generate_file(
    template: impl AsRef<Path>,
    destination: impl AsRef<Path>,
    plan: &ReplacementPlan,
    options: &GenerateOptions,
) -> Result<Outcome> {
    let template = options.resolve(template.as_ref());
    let destination = options.resolve(destination.as_ref());

    if !template.is_file() {
        return Err(Error::NotFound(template));
    }
    if !options.uncached && destination.is_file() {
        tracing::info!(destination = %destination.display(), "reusing existing document");
        return Ok(Outcome::Cached);
    }
    if let Some(dir) = destination.parent() {
        if !dir.as_os_str().is_empty() && !dir.is_dir() {
            return Err(Error::NotFound(dir.to_path_buf()));
        }
    }

    let mut document = Document::open(&template)?;
    let report = apply_plan(&mut document, plan, options)?;
    document.save(&destination)?;

    tracing::info!(
        template = %template.display(),
        destination = %destination.display(),
        text = report.text_replacements,
        images = report.image_replacements,
        rows = report.cloned_rows,
        warnings = report.warnings.len(),
        "document generated"
    );
    Ok(Outcome::Generated(report))
}
