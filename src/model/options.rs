//! Per-replacement options.

use super::dimension::Dimension;

/// Options for a text replacement.
#[derive(Debug, Clone, PartialEq)]
pub struct TextOptions {
    /// Turn line breaks in the value into `<w:br/>` elements
    pub multiline: bool,

    /// Maximum number of occurrences to replace (None = unbounded)
    pub limit: Option<usize>,

    /// Render text between `<B>` and `</B>` in a bold run
    pub bold_markup: bool,
}

impl Default for TextOptions {
    fn default() -> Self {
        Self {
            multiline: false,
            limit: None,
            bold_markup: true,
        }
    }
}

impl TextOptions {
    /// Create default text options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Translate line breaks into break elements.
    pub fn with_multiline(mut self, multiline: bool) -> Self {
        self.multiline = multiline;
        self
    }

    /// Cap the number of replaced occurrences.
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Enable or disable `<B>`/`</B>` translation.
    pub fn with_bold_markup(mut self, bold_markup: bool) -> Self {
        self.bold_markup = bold_markup;
        self
    }
}

/// How an inserted image is sized.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ImageSize {
    /// Intrinsic pixel size
    Native,
    /// Fixed width, height follows the aspect ratio
    Width(Dimension),
    /// Fixed height, width follows the aspect ratio
    Height(Dimension),
}

/// Options for an image replacement.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImageOptions {
    /// Requested width; takes precedence over `height`
    pub width: Option<Dimension>,

    /// Requested height, honored only without a width
    pub height: Option<Dimension>,

    /// Maximum number of occurrences to replace (None = unbounded)
    pub limit: Option<usize>,
}

impl ImageOptions {
    /// Create default image options (native size, unbounded).
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the width.
    pub fn with_width(mut self, width: Dimension) -> Self {
        self.width = Some(width);
        self
    }

    /// Set the height.
    pub fn with_height(mut self, height: Dimension) -> Self {
        self.height = Some(height);
        self
    }

    /// Cap the number of replaced occurrences.
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// The sizing rule in effect: width wins, then height, else native.
    pub fn size(&self) -> ImageSize {
        match (self.width, self.height) {
            (Some(width), _) => ImageSize::Width(width),
            (None, Some(height)) => ImageSize::Height(height),
            (None, None) => ImageSize::Native,
        }
    }
}
