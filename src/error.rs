//! Error types for the docmerge library.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for docmerge operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while merging a template.
///
/// Every variant is fatal for the generation that raised it. Non-fatal
/// conditions (a missing image source, for example) are reported as
/// [`Warning`](crate::generate::Warning)s instead.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error during file operations.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The template is missing or not a ZIP file, or the destination
    /// directory does not exist.
    #[error("Not found: {}", .0.display())]
    NotFound(PathBuf),

    /// The package is a ZIP archive but not a word-processing document.
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// Error reading or writing the ZIP archive.
    #[error("ZIP archive error: {0}")]
    ZipArchive(String),

    /// Error parsing XML content.
    #[error("XML parse error: {0}")]
    XmlParse(String),

    /// Invalid or malformed data in the document.
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// A required package part is missing.
    #[error("Missing component: {0}")]
    MissingComponent(String),

    /// A clone anchor could not be located in any row or paragraph.
    #[error("Template structure error: {0}")]
    TemplateStructure(String),

    /// The finished archive could not be written to its destination.
    #[error("Failed to write {}: {source}", path.display())]
    Write {
        /// Destination that was being written.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: io::Error,
    },

    /// A replacement plan or one of its values could not be parsed.
    #[error("Invalid plan: {0}")]
    InvalidPlan(String),
}

impl From<zip::result::ZipError> for Error {
    fn from(err: zip::result::ZipError) -> Self {
        Error::ZipArchive(err.to_string())
    }
}

impl From<quick_xml::Error> for Error {
    fn from(err: quick_xml::Error) -> Self {
        Error::XmlParse(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::InvalidPlan(err.to_string())
    }
}
