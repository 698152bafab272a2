//! Right-angle rotations for template variants.
//!
//! Symbols are expected upright, sideways or upside down, so only exact
//! quarter turns are generated; no interpolation is involved.

use crate::geometry::BBox;
use image::imageops;
use image::GrayImage;

/// Clockwise rotation applied to a template variant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum QuarterTurn {
    Deg0,
    Deg90,
    Deg180,
}

impl QuarterTurn {
    /// Rotations generated for line-art variants (270 degrees is not used).
    pub const VARIANTS: [QuarterTurn; 3] = [QuarterTurn::Deg0, QuarterTurn::Deg90, QuarterTurn::Deg180];

    pub fn degrees(self) -> u32 {
        match self {
            QuarterTurn::Deg0 => 0,
            QuarterTurn::Deg90 => 90,
            QuarterTurn::Deg180 => 180,
        }
    }

    /// Rotates `img`; a 90 degree turn swaps width and height.
    pub fn apply(self, img: &GrayImage) -> GrayImage {
        match self {
            QuarterTurn::Deg0 => img.clone(),
            QuarterTurn::Deg90 => imageops::rotate90(img),
            QuarterTurn::Deg180 => imageops::rotate180(img),
        }
    }

    /// Maps a box inside a `frame_w x frame_h` canvas to the rotated canvas.
    pub fn rotate_box(self, b: BBox, frame_w: i32, frame_h: i32) -> BBox {
        match self {
            QuarterTurn::Deg0 => b,
            QuarterTurn::Deg90 => BBox::new(frame_h - b.y - b.h, b.x, b.h, b.w),
            QuarterTurn::Deg180 => BBox::new(frame_w - b.x - b.w, frame_h - b.y - b.h, b.w, b.h),
        }
    }
}
