//! Filters that drop candidates duplicating confirmed annotations or
//! failing size/score sanity checks.
//!
//! Anything exposing a box and a score can be filtered through
//! [`ToBoxWithScore`]; the filters themselves only look at [`BoxWithScore`].

use crate::geometry::BBox;
use serde::{Deserialize, Serialize};

/// Canonical box-plus-score value used by suppression and filtering.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoxWithScore {
    pub bbox: BBox,
    pub score: f32,
}

impl BoxWithScore {
    pub fn new(bbox: BBox, score: f32) -> Self {
        Self { bbox, score }
    }
}

/// Adapter from caller-side records to [`BoxWithScore`].
pub trait ToBoxWithScore {
    fn box_with_score(&self) -> BoxWithScore;

    /// Class used by same-class exclusion; `None` compares against every
    /// confirmed box.
    fn class_name(&self) -> Option<&str> {
        None
    }
}

impl ToBoxWithScore for BoxWithScore {
    fn box_with_score(&self) -> BoxWithScore {
        *self
    }
}

impl ToBoxWithScore for (BBox, f32) {
    fn box_with_score(&self) -> BoxWithScore {
        BoxWithScore::new(self.0, self.1)
    }
}

/// An annotation the user already accepted.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConfirmedBox {
    pub bbox: BBox,
    #[serde(default)]
    pub class_name: Option<String>,
}

impl ConfirmedBox {
    pub fn new(bbox: BBox, class_name: Option<&str>) -> Self {
        Self {
            bbox,
            class_name: class_name.map(str::to_owned),
        }
    }
}

/// Which confirmed boxes a candidate is compared against.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExcludeMode {
    /// Only confirmed boxes of the candidate's class (unknown classes match).
    #[default]
    SameClass,
    AnyClass,
}

/// Duplicate rules for [`exclude_confirmed`].
#[derive(Clone, Copy, Debug)]
pub struct ExclusionConfig {
    pub mode: ExcludeMode,
    /// Drop a candidate whose centre lies inside a confirmed box.
    pub center_check: bool,
    /// Drop a candidate intersecting a confirmed box at all.
    pub any_overlap: bool,
    /// Drop a candidate with IoU at or above this value; 0 disables the rule.
    pub iou_threshold: f32,
}

impl Default for ExclusionConfig {
    fn default() -> Self {
        Self {
            mode: ExcludeMode::SameClass,
            center_check: true,
            any_overlap: false,
            iou_threshold: 0.6,
        }
    }
}

fn known(class: Option<&str>) -> Option<&str> {
    class.filter(|name| !name.is_empty())
}

fn is_duplicate(
    bbox: &BBox,
    class: Option<&str>,
    confirmed: &[ConfirmedBox],
    cfg: &ExclusionConfig,
    use_iou: bool,
) -> bool {
    let (cx, cy) = bbox.center();
    confirmed.iter().any(|c| {
        if cfg.mode == ExcludeMode::SameClass {
            if let (Some(a), Some(b)) = (known(class), known(c.class_name.as_deref())) {
                if a != b {
                    return false;
                }
            }
        }
        (cfg.any_overlap && bbox.intersects(&c.bbox))
            || (cfg.center_check && c.bbox.contains_point(cx, cy))
            || (use_iou && cfg.iou_threshold > 0.0 && bbox.iou(&c.bbox) >= cfg.iou_threshold)
    })
}

/// Removes candidates that duplicate a confirmed annotation.
///
/// When the full rule set would remove every candidate, the IoU rule is
/// dropped and the filter is retried with the overlap/centre rules only.
pub fn exclude_confirmed<T: ToBoxWithScore + Clone>(
    candidates: &[T],
    confirmed: &[ConfirmedBox],
    cfg: &ExclusionConfig,
) -> Vec<T> {
    if candidates.is_empty() || confirmed.is_empty() {
        return candidates.to_vec();
    }
    let keep = |use_iou: bool| -> Vec<T> {
        candidates
            .iter()
            .filter(|c| {
                !is_duplicate(&c.box_with_score().bbox, c.class_name(), confirmed, cfg, use_iou)
            })
            .cloned()
            .collect()
    };
    let strict = keep(true);
    if !strict.is_empty() {
        return strict;
    }
    keep(false)
}

/// Fraction of the ROI size below which a box side is too small.
const MIN_SIDE_FRACTION: f32 = 0.05;
/// Fraction of the ROI area above which a box is too large.
const MAX_AREA_FRACTION: f32 = 0.8;

/// Drops boxes with a side under 5% of `roi_size`, an area over 80% of the
/// ROI area, or a score below `score_threshold`.
pub fn filter_by_size<T: ToBoxWithScore + Clone>(
    items: &[T],
    roi_size: usize,
    score_threshold: f32,
) -> Vec<T> {
    let roi = roi_size as f32;
    let min_side = roi * MIN_SIDE_FRACTION;
    let max_area = roi * roi * MAX_AREA_FRACTION;
    items
        .iter()
        .filter(|item| {
            let b = item.box_with_score();
            let (w, h) = (b.bbox.w as f32, b.bbox.h as f32);
            w >= min_side && h >= min_side && w * h <= max_area && b.score >= score_threshold
        })
        .cloned()
        .collect()
}
