//! Point-query matching around a clicked location.
//!
//! A [`Matcher`] owns the query configuration and a lazily built
//! [`PreparedTemplates`] cache, so successive clicks on the same template set
//! reuse the scaled template maps. The engine, the line-art reranker and
//! the bbox refinement helpers are also exposed as free functions.

mod engine;
mod line_art;
mod refine;

pub use engine::{attempt_mode, match_roi, RoiMaps};
pub use line_art::{line_art_roi, tie_break, LineArtConfig, RankedMatch};
pub use refine::{
    apply_vertical_padding, refine_match_bboxes, ClassPadding, PaddingConfig, REFINE_PAD,
};

use crate::bank::PreparedTemplates;
use crate::candidate::exclude::{
    exclude_confirmed, BoxWithScore, ConfirmedBox, ExclusionConfig, ToBoxWithScore,
};
use crate::candidate::nms::{nms, DEFAULT_NMS_IOU};
use crate::geometry::{clip_roi, BBox};
use crate::template::{flatten_classes, TemplateImage, TemplateSet};
use crate::trace::{trace_event, trace_span};
use crate::util::{GlyphError, GlyphResult};
use image::GrayImage;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// Map a match was found on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchMode {
    Edge,
    Binary,
}

/// One scored hypothesis.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    pub class_name: String,
    pub template_name: String,
    pub score: f32,
    pub scale: f32,
    /// Tight bbox in image coordinates.
    pub bbox: BBox,
    /// Full template canvas projected into the image.
    pub outer_bbox: BBox,
    pub mode: MatchMode,
    /// Fraction of template foreground also foreground in the matched patch.
    pub shape_ratio: f32,
    /// Clockwise rotation of the matched template variant.
    #[serde(default)]
    pub rotation_deg: u32,
}

impl MatchResult {
    /// Copy with a replaced tight bbox; score, scale and mode are kept.
    pub fn with_bbox(&self, bbox: BBox) -> Self {
        Self {
            bbox,
            ..self.clone()
        }
    }
}

impl ToBoxWithScore for MatchResult {
    fn box_with_score(&self) -> BoxWithScore {
        BoxWithScore::new(self.bbox, self.score)
    }

    fn class_name(&self) -> Option<&str> {
        Some(&self.class_name)
    }
}

/// Sorts by descending score; equal scores keep their order.
pub(crate) fn sort_by_score_desc(results: &mut [MatchResult]) {
    results.sort_by(|a, b| b.score.total_cmp(&a.score));
}

/// Configuration for ROI matching.
#[derive(Clone, Copy, Debug)]
pub struct MatchConfig {
    /// Side of the square search window around the query point.
    pub roi_size: usize,
    pub scale_min: f32,
    pub scale_max: f32,
    /// Number of scales in the sweep; `<= 1` runs a single unscaled pass.
    pub scale_steps: usize,
    /// Evaluate (template, scale) jobs on the rayon pool when the `rayon`
    /// feature is enabled.
    pub parallel: bool,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            roi_size: 200,
            scale_min: 0.5,
            scale_max: 1.5,
            scale_steps: 12,
            parallel: false,
        }
    }
}

/// Parameters of one point query.
#[derive(Clone, Copy, Debug)]
pub struct PointQuery {
    pub x: f32,
    pub y: f32,
    /// Matches scoring below this value are dropped.
    pub score_threshold: f32,
    /// IoU used by suppression.
    pub iou_threshold: f32,
    /// Maximum number of results.
    pub top_k: usize,
    /// Use the two-stage line-art matcher instead of the plain one.
    pub line_art: bool,
}

impl Default for PointQuery {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            score_threshold: 0.0,
            iou_threshold: DEFAULT_NMS_IOU,
            top_k: 3,
            line_art: false,
        }
    }
}

impl PointQuery {
    /// Default query clicked at `(x, y)`.
    pub fn at(x: f32, y: f32) -> Self {
        Self {
            x,
            y,
            ..Self::default()
        }
    }
}

/// ROI matcher over a fixed list of templates.
pub struct Matcher<'a> {
    templates: Vec<&'a TemplateImage>,
    cfg: MatchConfig,
    line_art: LineArtConfig,
    exclusion: ExclusionConfig,
    prepared: OnceLock<PreparedTemplates<'a>>,
}

impl<'a> Matcher<'a> {
    pub fn new(templates: impl IntoIterator<Item = &'a TemplateImage>) -> Self {
        Self {
            templates: templates.into_iter().collect(),
            cfg: MatchConfig::default(),
            line_art: LineArtConfig::default(),
            exclusion: ExclusionConfig::default(),
            prepared: OnceLock::new(),
        }
    }

    /// Matcher over every class of `project`.
    pub fn for_project(set: &'a TemplateSet, project: &str) -> GlyphResult<Self> {
        let classes = set
            .project(project)
            .ok_or(GlyphError::InvalidInput("unknown project"))?;
        Ok(Self::new(flatten_classes(classes)))
    }

    pub fn with_config(mut self, cfg: MatchConfig) -> Self {
        self.cfg = cfg;
        self.prepared = OnceLock::new();
        self
    }

    pub fn with_line_art(mut self, cfg: LineArtConfig) -> Self {
        self.line_art = cfg;
        self
    }

    pub fn with_exclusion(mut self, cfg: ExclusionConfig) -> Self {
        self.exclusion = cfg;
        self
    }

    pub fn config(&self) -> &MatchConfig {
        &self.cfg
    }

    /// Scaled template cache, built on first use.
    pub fn prepared(&self) -> &PreparedTemplates<'a> {
        self.prepared.get_or_init(|| {
            PreparedTemplates::new(
                self.templates.iter().copied(),
                self.cfg.scale_min,
                self.cfg.scale_max,
                self.cfg.scale_steps,
            )
        })
    }

    fn roi_maps(&self, gray: &GrayImage, x: f32, y: f32) -> Option<RoiMaps> {
        let roi = clip_roi(
            x,
            y,
            self.cfg.roi_size,
            gray.width() as usize,
            gray.height() as usize,
        )?;
        RoiMaps::extract(gray, roi)
    }

    /// Multi-scale edge matching around `(x, y)`, falling back to binary
    /// maps when edges yield nothing. Sorted by descending score.
    pub fn match_point(&self, gray: &GrayImage, x: f32, y: f32) -> Vec<MatchResult> {
        let _span = trace_span!("match_point", x = x, y = y).entered();
        let Some(maps) = self.roi_maps(gray, x, y) else {
            return Vec::new();
        };
        match_roi(&maps, self.prepared(), self.cfg.parallel)
    }

    /// Two-stage line-art matching around `(x, y)`.
    pub fn match_point_line_art(&self, gray: &GrayImage, x: f32, y: f32) -> Vec<MatchResult> {
        let _span = trace_span!("match_point", x = x, y = y, line_art = true).entered();
        let Some(maps) = self.roi_maps(gray, x, y) else {
            return Vec::new();
        };
        line_art_roi(&maps, self.prepared(), &self.line_art, self.cfg.parallel)
    }

    /// Full point-query pipeline: match, threshold, suppress, drop
    /// duplicates of `confirmed`, keep the best `top_k`.
    pub fn detect_point(
        &self,
        gray: &GrayImage,
        query: &PointQuery,
        confirmed: &[ConfirmedBox],
    ) -> Vec<MatchResult> {
        let matches = if query.line_art {
            self.match_point_line_art(gray, query.x, query.y)
        } else {
            self.match_point(gray, query.x, query.y)
        };
        let total = matches.len();
        let above: Vec<MatchResult> = matches
            .into_iter()
            .filter(|m| m.score >= query.score_threshold)
            .collect();
        let mut kept = nms(&above, query.iou_threshold);
        if !confirmed.is_empty() {
            kept = exclude_confirmed(&kept, confirmed, &self.exclusion);
        }
        kept.truncate(query.top_k);
        trace_event!("point_detected", matches = total, kept = kept.len());
        kept
    }
}

/// One-shot matching without keeping a template cache.
pub fn match_templates<'a>(
    gray: &GrayImage,
    x: f32,
    y: f32,
    templates: impl IntoIterator<Item = &'a TemplateImage>,
    cfg: &MatchConfig,
) -> Vec<MatchResult> {
    Matcher::new(templates).with_config(*cfg).match_point(gray, x, y)
}
