//! Error types for glyphmatch.

use thiserror::Error;

/// Result alias for glyphmatch operations.
pub type GlyphResult<T> = std::result::Result<T, GlyphError>;

/// Errors that can occur when preparing templates, matching or exporting.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum GlyphError {
    /// Width or height is zero, or their product overflows.
    #[error("invalid dimensions: {width}x{height}")]
    InvalidDimensions { width: usize, height: usize },
    /// The backing buffer is shorter than the declared geometry.
    #[error("buffer too small: needed {needed}, got {got}")]
    BufferTooSmall { needed: usize, got: usize },
    /// Row stride is smaller than the row width.
    #[error("invalid stride {stride} for width {width}")]
    InvalidStride { width: usize, stride: usize },
    /// A requested window does not fit inside the image.
    #[error(
        "roi out of bounds: ({x}, {y}, {width}x{height}) in {img_width}x{img_height} image"
    )]
    RoiOutOfBounds {
        x: usize,
        y: usize,
        width: usize,
        height: usize,
        img_width: usize,
        img_height: usize,
    },
    /// The template cannot be correlated (e.g. constant intensity).
    #[error("degenerate template: {reason}")]
    DegenerateTemplate { reason: &'static str },
    /// An encoded image buffer could not be decoded.
    #[error("failed to decode image: {reason}")]
    ImageDecode { reason: String },
    /// The requested annotation export format is unknown.
    #[error("unsupported export format: {format}")]
    UnsupportedFormat { format: String },
    /// The input data or parameters are invalid.
    #[error("invalid input: {0}")]
    InvalidInput(&'static str),
}
