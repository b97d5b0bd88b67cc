//! Image sources for picture replacements.

use crate::model::{ImageSize, Unit};
use image::{ImageFormat, ImageReader};
use std::fmt;
use std::io::Cursor;
use std::path::Path;

/// Why an image source could not be used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssetError {
    /// The source file does not exist
    Missing,
    /// The source exists but is not a supported image
    Unreadable(String),
}

impl fmt::Display for AssetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssetError::Missing => write!(f, "image source not found"),
            AssetError::Unreadable(reason) => write!(f, "unreadable image: {}", reason),
        }
    }
}

/// An image ready to be stored as a media part.
#[derive(Clone)]
pub struct ImageAsset {
    bytes: Vec<u8>,
    format: ImageFormat,
    width_px: u32,
    height_px: u32,
    name: String,
}

impl ImageAsset {
    /// Load an image from disk.
    pub fn open(path: &Path) -> Result<Self, AssetError> {
        if !path.is_file() {
            return Err(AssetError::Missing);
        }
        let bytes = std::fs::read(path).map_err(|e| AssetError::Unreadable(e.to_string()))?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self::from_bytes(bytes, name)
    }

    /// Sniff the format and intrinsic size of in-memory image data.
    pub fn from_bytes(bytes: Vec<u8>, name: impl Into<String>) -> Result<Self, AssetError> {
        let format =
            image::guess_format(&bytes).map_err(|e| AssetError::Unreadable(e.to_string()))?;
        if !matches!(
            format,
            ImageFormat::Png | ImageFormat::Jpeg | ImageFormat::Gif | ImageFormat::Bmp
        ) {
            return Err(AssetError::Unreadable(format!(
                "unsupported image format {:?}",
                format
            )));
        }

        let (width_px, height_px) = ImageReader::with_format(Cursor::new(&bytes), format)
            .into_dimensions()
            .map_err(|e| AssetError::Unreadable(e.to_string()))?;

        Ok(Self {
            bytes,
            format,
            width_px,
            height_px,
            name: name.into(),
        })
    }

    /// Raw image data.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Original file name, used as the picture description.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Intrinsic size in pixels.
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width_px, self.height_px)
    }

    /// Extension of the stored media part.
    pub fn extension(&self) -> &'static str {
        match self.format {
            ImageFormat::Jpeg => "jpeg",
            ImageFormat::Gif => "gif",
            ImageFormat::Bmp => "bmp",
            _ => "png",
        }
    }

    /// MIME type registered in the content types part.
    pub fn mime_type(&self) -> &'static str {
        self.format.to_mime_type()
    }

    /// Displayed extent in EMU.
    ///
    /// A fixed width or height keeps the aspect ratio; otherwise the image is
    /// shown at its pixel size.
    pub fn extent(&self, size: ImageSize) -> (u64, u64) {
        let w = f64::from(self.width_px.max(1));
        let h = f64::from(self.height_px.max(1));
        match size {
            ImageSize::Native => {
                let emu = Unit::Px.emu_per_unit();
                ((w * emu).round() as u64, (h * emu).round() as u64)
            }
            ImageSize::Width(width) => {
                let cx = width.to_emu();
                (cx, (cx as f64 * h / w).round() as u64)
            }
            ImageSize::Height(height) => {
                let cy = height.to_emu();
                ((cy as f64 * w / h).round() as u64, cy)
            }
        }
    }
}

impl fmt::Debug for ImageAsset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageAsset")
            .field("name", &self.name)
            .field("format", &self.format)
            .field("width_px", &self.width_px)
            .field("height_px", &self.height_px)
            .field("len", &self.bytes.len())
            .finish()
    }
}
