//! Post-match bbox adjustments: contour-based tightening and vertical
//! padding.

use crate::geometry::BBox;
use crate::image::ops;
use crate::search::MatchResult;
use crate::util::math::round_i32;
use image::GrayImage;
use imageproc::contours::find_contours;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Context added around a match before looking for its contour.
pub const REFINE_PAD: i32 = 12;

const MIN_CONTOUR_AREA: i64 = 30;
const MIN_CONTOUR_AREA_FRACTION: f64 = 0.005;
const MAX_CONTOUR_ASPECT: f32 = 30.0;

/// Bounding rectangle of a point set, inclusive of its extreme pixels.
fn bounding_rect(points: &[imageproc::point::Point<i32>]) -> Option<BBox> {
    let first = points.first()?;
    let (mut x0, mut y0, mut x1, mut y1) = (first.x, first.y, first.x, first.y);
    for p in points {
        x0 = x0.min(p.x);
        y0 = y0.min(p.y);
        x1 = x1.max(p.x);
        y1 = y1.max(p.y);
    }
    Some(BBox::new(x0, y0, x1 - x0 + 1, y1 - y0 + 1))
}

/// How well a contour box fits the reference point: boxes containing the
/// point beat the rest; among containing boxes larger wins, otherwise the
/// nearer centre wins.
#[derive(Clone, Copy)]
struct Fit {
    bbox: BBox,
    contains: bool,
    metric: f32,
}

impl Fit {
    fn new(bbox: BBox, px: f32, py: f32) -> Self {
        let contains = bbox.contains_point(px, py);
        let metric = if contains {
            -(bbox.area() as f32)
        } else {
            let (cx, cy) = bbox.center();
            ((cx - px).powi(2) + (cy - py).powi(2)).sqrt()
        };
        Self {
            bbox,
            contains,
            metric,
        }
    }

    fn beats(&self, other: &Fit) -> bool {
        match (self.contains, other.contains) {
            (true, false) => true,
            (false, true) => false,
            _ => self.metric < other.metric,
        }
    }
}

fn refine_one(gray: &GrayImage, m: &MatchResult, click: Option<(f32, f32)>, pad: i32) -> Option<BBox> {
    let (w, h) = (gray.width() as i32, gray.height() as i32);
    let b = m.bbox;
    let x0 = (b.x - pad).max(0);
    let y0 = (b.y - pad).max(0);
    let x1 = (b.right() + pad).min(w);
    let y1 = (b.bottom() + pad).min(h);
    if x1 <= x0 || y1 <= y0 {
        return None;
    }
    let region = ops::crop(gray, x0 as u32, y0 as u32, (x1 - x0) as u32, (y1 - y0) as u32)?;
    let region_area = i64::from(region.width()) * i64::from(region.height());
    let min_area = MIN_CONTOUR_AREA.max((region_area as f64 * MIN_CONTOUR_AREA_FRACTION) as i64);

    let (px, py) = click.unwrap_or_else(|| b.center());
    let (px, py) = (px - x0 as f32, py - y0 as f32);

    let mut best: Option<Fit> = None;
    for contour in find_contours::<i32>(&ops::binary_inv(&region)) {
        if contour.parent.is_some() {
            continue;
        }
        let Some(rect) = bounding_rect(&contour.points) else {
            continue;
        };
        if rect.w <= 1 || rect.h <= 1 || rect.area() < min_area {
            continue;
        }
        let (cw, ch) = (rect.w as f32, rect.h as f32);
        if (cw / ch).max(ch / cw) > MAX_CONTOUR_ASPECT {
            continue;
        }
        let fit = Fit::new(rect, px, py);
        if best.map_or(true, |current| fit.beats(&current)) {
            best = Some(fit);
        }
    }
    best.map(|fit| fit.bbox.translated(x0, y0))
}

/// Tightens each match to the external contour nearest the reference point
/// (`click`, or the match centre when absent).
///
/// The search region is the match bbox grown by `pad`. Slivers, specks and
/// extreme aspect ratios are ignored; a match without a usable contour is
/// returned unchanged. Score, scale, mode and outer bbox are kept.
pub fn refine_match_bboxes(
    gray: &GrayImage,
    matches: &[MatchResult],
    click: Option<(f32, f32)>,
    pad: i32,
) -> Vec<MatchResult> {
    matches
        .iter()
        .map(|m| match refine_one(gray, m, click, pad) {
            Some(bbox) => m.with_bbox(bbox),
            None => m.clone(),
        })
        .collect()
}

/// Per-class padding override; unset sides use the defaults.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassPadding {
    #[serde(default)]
    pub top: Option<i32>,
    #[serde(default)]
    pub bottom: Option<i32>,
}

/// Vertical padding in template pixels, scaled with each match.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PaddingConfig {
    pub top: i32,
    pub bottom: i32,
    pub per_class: BTreeMap<String, ClassPadding>,
}

impl Default for PaddingConfig {
    fn default() -> Self {
        Self {
            top: 2,
            bottom: 3,
            per_class: BTreeMap::new(),
        }
    }
}

impl PaddingConfig {
    /// `(top, bottom)` padding for `class_name` before scaling.
    pub fn for_class(&self, class_name: &str) -> (i32, i32) {
        let over = self.per_class.get(class_name).copied().unwrap_or_default();
        (over.top.unwrap_or(self.top), over.bottom.unwrap_or(self.bottom))
    }
}

/// Grows each bbox by the scaled top/bottom padding of its class, clamped to
/// `[0, image_height]`, keeping a height of at least one pixel.
pub fn apply_vertical_padding(
    matches: &[MatchResult],
    image_height: i32,
    cfg: &PaddingConfig,
) -> Vec<MatchResult> {
    if image_height <= 0 {
        return matches.to_vec();
    }
    matches
        .iter()
        .map(|m| {
            let (top, bottom) = cfg.for_class(&m.class_name);
            let pad_top = round_i32(top as f32 * m.scale);
            let pad_bottom = round_i32(bottom as f32 * m.scale);
            let b = m.bbox;
            let y0 = (b.y - pad_top).max(0);
            let y1 = (b.bottom() + pad_bottom).min(image_height);
            m.with_bbox(BBox::new(b.x, y0, b.w, (y1 - y0).max(1)))
        })
        .collect()
}
