//! Template editing.
//!
//! [`Document`] holds the XML of the main part and its headers and footers
//! while placeholders are replaced, rows are cloned and images embedded.

mod document;
mod fragment;
mod image;
mod markup;

pub use document::{Document, ImageOutcome};
pub use fragment::BlockKind;
pub use image::{AssetError, ImageAsset};
pub use markup::prepare_text;
