//! # docmerge
//!
//! Placeholder merge engine for Microsoft Word (DOCX) templates.
//!
//! A template is an ordinary Word document containing `${token}` markers.
//! A [`ReplacementPlan`] says what each marker becomes: text (optionally
//! multi-line or with `<B>` bold markup), an image, or a set of table rows
//! cloned from a template row. One generation pass applies the whole plan
//! and writes a valid package.
//!
//! ## Quick Start
//!
//! ```no_run
//! use docmerge::{generate_file, GenerateOptions, ImageOptions, PlanBuilder, TextOptions};
//! use docmerge::Dimension;
//!
//! let plan = PlanBuilder::new()
//!     .replace("category", "Elite men")
//!     .replace_with_image("logo", "logo.png", ImageOptions::new().with_width(Dimension::mm(40.0)))
//!     .create_clone("rank")
//!     .add_to_clone("rank", "rank", "1", TextOptions::default())
//!     .add_to_clone("rank", "name", "James", TextOptions::default())
//!     .build();
//!
//! generate_file("results.docx", "out/results-elite.docx", &plan, &GenerateOptions::new())?;
//! # Ok::<(), docmerge::Error>(())
//! ```
//!
//! ## Lower-level editing
//!
//! ```no_run
//! use docmerge::{Document, TextOptions};
//!
//! let mut doc = Document::open("letter.docx")?;
//! println!("tokens: {:?}", doc.variables());
//! doc.set_text("name", "Jane", &TextOptions::default());
//! doc.save("letter-jane.docx")?;
//! # Ok::<(), docmerge::Error>(())
//! ```
//!
//! ## Concurrency and caching
//!
//! A [`Document`] is a single mutable buffer owned by one generation pass;
//! distinct generations share nothing and can run on separate threads.
//! [`generate_file`] skips generation when the destination already exists
//! unless [`GenerateOptions::uncached`] is set. Two concurrent generations
//! targeting the same destination both write it (the last rename wins);
//! serialize them if that matters.

pub mod container;
pub mod detect;
pub mod error;
pub mod generate;
pub mod model;
pub mod template;

// Re-exports
pub use container::{OoxmlContainer, Relationship, Relationships};
pub use detect::{locate_main_part, DocumentKind, MainPart};
pub use error::{Error, Result};
pub use generate::{
    apply_plan, generate, generate_bytes, generate_file, GenerateOptions, Generated,
    GenerationReport, Outcome, Warning,
};
pub use model::{
    CloneGroup, CloneRow, Dimension, ImageOptions, ImageSize, PlanBuilder, Replacement,
    ReplacementPlan, TextOptions, Unit,
};
pub use template::{Document, ImageAsset, ImageOutcome};

use std::path::Path;

/// List the distinct `${token}` names of a template, in document order.
///
/// # Example
///
/// ```no_run
/// let tokens = docmerge::variables("invoice.docx")?;
/// for token in tokens {
///     println!("{}", token);
/// }
/// # Ok::<(), docmerge::Error>(())
/// ```
pub fn variables(path: impl AsRef<Path>) -> Result<Vec<String>> {
    Ok(Document::open(path)?.variables())
}

/// Library version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!version().is_empty());
    }

    #[test]
    fn test_variables_missing_file() {
        assert!(matches!(
            variables("no/such/template.docx"),
            Err(Error::NotFound(_))
        ));
    }
}
