//! Multi-factor candidate quality scoring.
//!
//! Each candidate gets an edge score (its correlation), a contour score from
//! the pixels it covers, and class-level layout and shape scores computed
//! over all candidates sharing its class. The fused final score ranks
//! candidates for thresholding and export.

use crate::candidate::exclude::{BoxWithScore, ToBoxWithScore};
use crate::geometry::BBox;
use crate::image::ops;
use crate::search::MatchResult;
use crate::trace::{trace_event, trace_span};
use crate::util::math::{median, regularity};
use image::GrayImage;
use imageproc::contours::{find_contours, Contour};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Layout score of a class with a single candidate.
pub const SINGLE_MEMBER_LAYOUT: f32 = 0.2;

/// Weights of the fused final score.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScoringWeights {
    pub edge: f32,
    pub contour: f32,
    pub layout: f32,
    pub shape: f32,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            edge: 0.35,
            contour: 0.25,
            layout: 0.30,
            shape: 0.10,
        }
    }
}

impl ScoringWeights {
    pub fn fuse(&self, edge: f32, contour: f32, layout: f32, shape: f32) -> f32 {
        self.edge * edge + self.contour * contour + self.layout * layout + self.shape * shape
    }
}

/// Decomposed quality scores of a candidate.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct QualityScores {
    pub edge_score: f32,
    pub contour_score: f32,
    pub layout_score: f32,
    pub shape_score: f32,
    pub final_score: f32,
}

/// A proposed box with its quality scores.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub class_name: String,
    pub template_name: String,
    pub bbox: BBox,
    #[serde(flatten)]
    pub scores: QualityScores,
}

impl Candidate {
    /// Candidate ranked by a raw score only; sub-scores other than the edge
    /// score stay zero.
    pub fn with_raw_score(
        class_name: impl Into<String>,
        template_name: impl Into<String>,
        bbox: BBox,
        edge_score: f32,
        final_score: f32,
    ) -> Self {
        Self {
            class_name: class_name.into(),
            template_name: template_name.into(),
            bbox,
            scores: QualityScores {
                edge_score,
                final_score,
                ..QualityScores::default()
            },
        }
    }

    pub fn final_score(&self) -> f32 {
        self.scores.final_score
    }
}

impl ToBoxWithScore for Candidate {
    fn box_with_score(&self) -> BoxWithScore {
        BoxWithScore::new(self.bbox, self.scores.final_score)
    }

    fn class_name(&self) -> Option<&str> {
        Some(&self.class_name)
    }
}

/// Polygon area by the shoelace formula.
fn contour_area(contour: &Contour<i32>) -> f64 {
    let pts = &contour.points;
    if pts.len() < 3 {
        return 0.0;
    }
    let mut twice = 0i64;
    for (i, p) in pts.iter().enumerate() {
        let q = &pts[(i + 1) % pts.len()];
        twice += i64::from(p.x) * i64::from(q.y) - i64::from(q.x) * i64::from(p.y);
    }
    twice.unsigned_abs() as f64 / 2.0
}

/// Contour regularity of the image region under `bbox`, in `[0, 1]`.
///
/// The region is Otsu-thresholded with bright pixels as foreground and the
/// external contours are combined as `0.5 * area coverage + 0.3 * squareness
/// + 0.2 * closeness of the contour count to one`. Zero when the region is
/// empty or has no contours.
pub fn contour_score(gray: &GrayImage, bbox: &BBox) -> f32 {
    if bbox.w <= 0 || bbox.h <= 0 {
        return 0.0;
    }
    let x0 = bbox.x.max(0) as u32;
    let y0 = bbox.y.max(0) as u32;
    let x1 = (bbox.right().max(0) as u32).min(gray.width());
    let y1 = (bbox.bottom().max(0) as u32).min(gray.height());
    if x1 <= x0 || y1 <= y0 {
        return 0.0;
    }
    let Some(region) = ops::crop(gray, x0, y0, x1 - x0, y1 - y0) else {
        return 0.0;
    };
    let binary = ops::binary(&region);
    let external: Vec<Contour<i32>> = find_contours::<i32>(&binary)
        .into_iter()
        .filter(|c| c.parent.is_none())
        .collect();
    if external.is_empty() {
        return 0.0;
    }

    let area_sum: f64 = external.iter().map(contour_area).sum();
    let area_ratio = (area_sum / bbox.area() as f64).min(1.0) as f32;
    let aspect = bbox.w as f32 / bbox.h as f32;
    let aspect_score = 1.0 - (aspect - 1.0).abs().min(1.0);
    let count_score = 1.0 / (1.0 + (external.len() as f32 - 1.0).abs());
    0.5 * area_ratio + 0.3 * aspect_score + 0.2 * count_score
}

/// Layout consistency of a class group, in `(0, 1]`.
pub fn layout_score(boxes: &[BBox]) -> f32 {
    if boxes.len() <= 1 {
        return SINGLE_MEMBER_LAYOUT;
    }
    let mut xs: Vec<f32> = boxes.iter().map(|b| b.center().0).collect();
    xs.sort_by(f32::total_cmp);
    let spacing: Vec<f32> = xs.windows(2).map(|w| w[1] - w[0]).collect();
    let ys: Vec<f32> = boxes.iter().map(|b| b.center().1).collect();
    let widths: Vec<f32> = boxes.iter().map(|b| b.w as f32).collect();
    let heights: Vec<f32> = boxes.iter().map(|b| b.h as f32).collect();

    0.4 * regularity(&spacing)
        + 0.3 * regularity(&ys)
        + 0.15 * regularity(&widths)
        + 0.15 * regularity(&heights)
}

/// Per-member area consistency against the group's median area.
pub fn shape_scores(boxes: &[BBox]) -> Vec<f32> {
    let areas: Vec<f32> = boxes.iter().map(|b| b.area() as f32).collect();
    let med = median(&areas);
    if med <= 0.0 {
        return vec![0.0; areas.len()];
    }
    areas
        .iter()
        .map(|a| (-(a - med).abs() / med).exp())
        .collect()
}

/// Scores `matches` against `gray`, returning one candidate per match in
/// input order.
pub fn score_candidates(
    gray: &GrayImage,
    matches: &[MatchResult],
    weights: &ScoringWeights,
) -> Vec<Candidate> {
    let _span = trace_span!("score_candidates", candidates = matches.len()).entered();
    if matches.is_empty() {
        return Vec::new();
    }

    let mut groups: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
    for (idx, m) in matches.iter().enumerate() {
        groups.entry(m.class_name.as_str()).or_default().push(idx);
    }

    let mut class_scores = vec![(0.0f32, 0.0f32); matches.len()];
    for members in groups.values() {
        let boxes: Vec<BBox> = members.iter().map(|&i| matches[i].bbox).collect();
        let layout = layout_score(&boxes);
        for (&idx, shape) in members.iter().zip(shape_scores(&boxes)) {
            class_scores[idx] = (layout, shape);
        }
    }

    let out: Vec<Candidate> = matches
        .iter()
        .zip(class_scores)
        .map(|(m, (layout, shape))| {
            let contour = contour_score(gray, &m.bbox);
            Candidate {
                class_name: m.class_name.clone(),
                template_name: m.template_name.clone(),
                bbox: m.bbox,
                scores: QualityScores {
                    edge_score: m.score,
                    contour_score: contour,
                    layout_score: layout,
                    shape_score: shape,
                    final_score: weights.fuse(m.score, contour, layout, shape),
                },
            }
        })
        .collect();
    trace_event!("candidates_scored", count = out.len(), classes = groups.len());
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    #[test]
    fn single_member_group() {
        let boxes = [BBox::new(3, 4, 10, 12)];
        assert_eq!(layout_score(&boxes), SINGLE_MEMBER_LAYOUT);
        assert_eq!(shape_scores(&boxes), vec![1.0]);
    }

    #[test]
    fn evenly_spaced_row_scores_one() {
        let boxes: Vec<BBox> = (0..4).map(|i| BBox::new(i * 20, 10, 8, 8)).collect();
        assert!((layout_score(&boxes) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn zero_area_group_has_zero_shape() {
        let boxes = [BBox::new(0, 0, 0, 5), BBox::new(5, 0, 0, 5)];
        assert_eq!(shape_scores(&boxes), vec![0.0, 0.0]);
    }

    #[test]
    fn bright_square_on_dark_has_one_contour() {
        let gray = GrayImage::from_fn(20, 20, |x, y| {
            let on = (5..15).contains(&x) && (5..15).contains(&y);
            Luma([if on { 255 } else { 0 }])
        });
        let score = contour_score(&gray, &BBox::new(0, 0, 20, 20));
        // Square region and a single contour; coverage adds a little on top.
        assert!(score > 0.5 && score < 0.75);
        assert_eq!(contour_score(&gray, &BBox::new(40, 40, 5, 5)), 0.0);
    }

    #[test]
    fn dark_region_scores_zero() {
        let gray = GrayImage::new(10, 10);
        assert_eq!(contour_score(&gray, &BBox::new(0, 0, 10, 10)), 0.0);
    }
}
