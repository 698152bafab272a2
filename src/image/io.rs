//! Decoding of in-memory encoded images.
//!
//! Available when the `image-io` feature is enabled. The library never
//! touches the filesystem; callers hand over bytes they already read.

use crate::util::{GlyphError, GlyphResult};
use image::DynamicImage;

/// Decodes a PNG or JPEG buffer.
pub fn decode_image(bytes: &[u8]) -> GlyphResult<DynamicImage> {
    if bytes.is_empty() {
        return Err(GlyphError::ImageDecode {
            reason: "empty buffer".to_string(),
        });
    }
    image::load_from_memory(bytes).map_err(|err| GlyphError::ImageDecode {
        reason: err.to_string(),
    })
}
