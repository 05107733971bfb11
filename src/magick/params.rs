//! Parameter types for resize operations.
//!
//! These structs describe *what* to do, not *how* to do it. The
//! [`resize`](super::resize) module turns them into engine arguments.
//!
//! ## Types
//!
//! - [`Quality`]: lossy encoding quality (1-100, default 100), clamped on construction.
//! - [`ScaleOptions`]: target geometry (bounding box or percentage) plus scaling-mode flags.

/// Quality setting for lossy image encoding (1-100).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quality(pub u32);

impl Quality {
    pub fn new(value: u32) -> Self {
        Self(value.clamp(1, 100))
    }

    pub fn value(self) -> u32 {
        self.0
    }
}

impl Default for Quality {
    fn default() -> Self {
        Self(100)
    }
}

/// Options for [`Magick::resize`](super::Magick::resize) and friends.
///
/// Either `width` and `height` together, or `percent`, must be set. When
/// both are present the bounding box wins.
///
/// ```
/// # use magick_wrap::magick::ScaleOptions;
/// let thumb = ScaleOptions::fit(100, 100).shrink_only();
/// let half = ScaleOptions::percent(50).with_quality(85);
/// # let _ = (thumb, half);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScaleOptions {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub percent: Option<u32>,
    pub quality: Option<Quality>,
    /// Only ever make the image smaller (`>`).
    pub shrink_only: bool,
    /// Only ever make the image larger (`<`).
    pub expand_only: bool,
    /// Use the exact dimensions, ignoring aspect ratio (`!`).
    pub absolute_aspect: bool,
}

impl ScaleOptions {
    /// Fit within a `width` x `height` bounding box, preserving aspect ratio.
    pub fn fit(width: u32, height: u32) -> Self {
        Self {
            width: Some(width),
            height: Some(height),
            ..Self::default()
        }
    }

    /// Scale both dimensions by `percent`.
    pub fn percent(percent: u32) -> Self {
        Self {
            percent: Some(percent),
            ..Self::default()
        }
    }

    pub fn with_quality(mut self, quality: u32) -> Self {
        self.quality = Some(Quality::new(quality));
        self
    }

    pub fn shrink_only(mut self) -> Self {
        self.shrink_only = true;
        self
    }

    pub fn expand_only(mut self) -> Self {
        self.expand_only = true;
        self
    }

    pub fn absolute_aspect(mut self) -> Self {
        self.absolute_aspect = true;
        self
    }
}
