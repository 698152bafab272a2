//! Axis-aligned boxes, regions of interest and overlap measures.

use crate::util::math::round_i32;
use serde::{Deserialize, Serialize};

/// Axis-aligned box in absolute pixel coordinates (top-left + size).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BBox {
    pub x: i32,
    pub y: i32,
    pub w: i32,
    pub h: i32,
}

impl BBox {
    pub const fn new(x: i32, y: i32, w: i32, h: i32) -> Self {
        Self { x, y, w, h }
    }

    pub fn area(&self) -> i64 {
        i64::from(self.w.max(0)) * i64::from(self.h.max(0))
    }

    pub fn center(&self) -> (f32, f32) {
        (
            self.x as f32 + self.w as f32 / 2.0,
            self.y as f32 + self.h as f32 / 2.0,
        )
    }

    /// Exclusive right edge, saturating at `i32::MAX`.
    pub fn right(&self) -> i32 {
        self.x.saturating_add(self.w)
    }

    /// Exclusive bottom edge, saturating at `i32::MAX`.
    pub fn bottom(&self) -> i32 {
        self.y.saturating_add(self.h)
    }

    /// Same size, shifted by `(dx, dy)`.
    pub fn translated(&self, dx: i32, dy: i32) -> Self {
        Self::new(
            self.x.saturating_add(dx),
            self.y.saturating_add(dy),
            self.w,
            self.h,
        )
    }

    /// Area of the intersection with `other` (0 when disjoint).
    pub fn intersection_area(&self, other: &BBox) -> i64 {
        let span = |lo: i32, hi: i32| (i64::from(hi) - i64::from(lo)).max(0);
        span(self.x.max(other.x), self.right().min(other.right()))
            * span(self.y.max(other.y), self.bottom().min(other.bottom()))
    }

    /// True when the interiors overlap at all.
    pub fn intersects(&self, other: &BBox) -> bool {
        self.x < other.right()
            && self.right() > other.x
            && self.y < other.bottom()
            && self.bottom() > other.y
    }

    /// True when `(px, py)` lies inside the box, borders included.
    pub fn contains_point(&self, px: f32, py: f32) -> bool {
        self.x as f32 <= px
            && px <= self.right() as f32
            && self.y as f32 <= py
            && py <= self.bottom() as f32
    }

    /// Intersection over union, in `[0, 1]`; 0 for disjoint or empty boxes.
    pub fn iou(&self, other: &BBox) -> f32 {
        let inter = self.intersection_area(other);
        if inter <= 0 {
            return 0.0;
        }
        let union = self.area() + other.area() - inter;
        if union <= 0 {
            return 0.0;
        }
        (inter as f64 / union as f64) as f32
    }
}

/// Free-function form of [`BBox::iou`].
pub fn iou(a: &BBox, b: &BBox) -> f32 {
    a.iou(b)
}

/// Half-open region `[x0, x1) x [y0, y1)` inside an image.
///
/// Always non-empty and within the image it was clipped against.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Roi {
    pub x0: usize,
    pub y0: usize,
    pub x1: usize,
    pub y1: usize,
}

impl Roi {
    pub fn width(&self) -> usize {
        self.x1 - self.x0
    }

    pub fn height(&self) -> usize {
        self.y1 - self.y0
    }

    /// The full extent of a `width x height` image.
    pub fn full(width: usize, height: usize) -> Option<Self> {
        (width > 0 && height > 0).then_some(Self {
            x0: 0,
            y0: 0,
            x1: width,
            y1: height,
        })
    }
}

/// Square window of side `size` centred on `(x, y)`, clamped to a
/// `width x height` image.
///
/// The window never collapses: a click at or beyond an image corner still
/// yields a 1x1 region on the nearest pixel. Returns `None` only for an
/// empty image.
pub fn clip_roi(x: f32, y: f32, size: usize, width: usize, height: usize) -> Option<Roi> {
    if width == 0 || height == 0 {
        return None;
    }
    let half = size as f32 / 2.0;
    let (x0, x1) = clip_axis(x, half, width);
    let (y0, y1) = clip_axis(y, half, height);
    Some(Roi { x0, y0, x1, y1 })
}

fn clip_axis(center: f32, half: f32, len: usize) -> (usize, usize) {
    let len_i = len as i64;
    let lo = i64::from(round_i32(center - half)).clamp(0, len_i - 1);
    let mut hi = i64::from(round_i32(center + half)).min(len_i);
    if hi <= lo {
        hi = (lo + 1).min(len_i);
    }
    (lo as usize, hi as usize)
}
