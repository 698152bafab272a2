//! Whole-image detection.
//!
//! Two strategies are kept side by side. The tiled strategy runs the point
//! matcher at the centre of overlapping tiles and ranks hits with the
//! candidate scorer. The exhaustive strategy correlates binary templates over
//! the whole image and ranks by `correlation + overlap ratio`, bypassing the
//! scorer. Their scores live on different scales and are not comparable.

use crate::candidate::nms::{nms, DEFAULT_NMS_IOU};
use crate::candidate::topk::Peak;
use crate::candidate::score::{score_candidates, Candidate, ScoringWeights};
use crate::export::{export_annotations, ExportFormat, ExportPayload};
use crate::geometry::BBox;
use crate::image::{ops, ImageView};
use crate::kernel::scalar::CcorrScalar;
use crate::kernel::{Kernel, ScanParams};
use crate::search::{MatchResult, Matcher};
use crate::template::{CcorrPlan, TemplateImage};
use crate::trace::{trace_debug, trace_event, trace_span};
use crate::util::math::linspace;
use crate::util::par::run_jobs;
use crate::util::GlyphResult;
use image::GrayImage;
use serde::{Deserialize, Serialize};

/// Smallest tile side.
pub const MIN_TILE_SIZE: usize = 64;

/// Tiled detection parameters.
#[derive(Clone, Copy, Debug)]
pub struct TiledConfig {
    /// Tile side; raised to [`MIN_TILE_SIZE`].
    pub tile_size: usize,
    /// Tile step; `None` uses a quarter of the tile side.
    pub stride: Option<usize>,
    /// Matches kept per tile; 0 keeps all.
    pub max_per_tile: usize,
    /// Minimum fused final score.
    pub score_threshold: f32,
    pub weights: ScoringWeights,
    /// Process tiles on the rayon pool when the `rayon` feature is enabled.
    pub parallel: bool,
}

impl Default for TiledConfig {
    fn default() -> Self {
        Self {
            tile_size: 200,
            stride: None,
            max_per_tile: 50,
            score_threshold: 0.5,
            weights: ScoringWeights::default(),
            parallel: false,
        }
    }
}

impl TiledConfig {
    pub fn effective_tile_size(&self) -> usize {
        self.tile_size.max(MIN_TILE_SIZE)
    }

    pub fn effective_stride(&self) -> usize {
        let tile = self.effective_tile_size();
        self.stride.unwrap_or(tile / 4).max(1)
    }
}

/// Exhaustive binary detection parameters.
#[derive(Clone, Copy, Debug)]
pub struct ExhaustiveConfig {
    /// Minimum normalized correlation of a placement.
    pub match_threshold: f32,
    pub scale_min: f32,
    pub scale_max: f32,
    /// Number of scales; `<= 1` uses `scale_min` alone.
    pub scale_steps: usize,
    /// Minimum fraction of template ink also inked in the image.
    pub overlap_min: f32,
    pub nms_iou: f32,
    /// Scan (template, scale) jobs on the rayon pool when the `rayon`
    /// feature is enabled.
    pub parallel: bool,
}

impl Default for ExhaustiveConfig {
    fn default() -> Self {
        Self {
            match_threshold: 0.5,
            scale_min: 0.5,
            scale_max: 1.5,
            scale_steps: 12,
            overlap_min: 0.6,
            nms_iou: DEFAULT_NMS_IOU,
            parallel: false,
        }
    }
}

/// Candidates surviving a detection pass.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Detection {
    /// Candidates produced before thresholding or suppression.
    pub total_candidates: usize,
    pub confirmed: Vec<Candidate>,
}

/// Top-left corners of tiles covering a `width x height` image.
pub fn tile_origins(width: usize, height: usize, stride: usize) -> Vec<(usize, usize)> {
    let stride = stride.max(1);
    (0..height)
        .step_by(stride)
        .flat_map(|y| (0..width).step_by(stride).map(move |x| (x, y)))
        .collect()
}

/// Runs the point matcher at the centre of every tile, scores all hits
/// against the full image and keeps those at or above the threshold.
pub fn detect_tiled(gray: &GrayImage, matcher: &Matcher<'_>, cfg: &TiledConfig) -> Detection {
    let (width, height) = (gray.width() as usize, gray.height() as usize);
    let tile = cfg.effective_tile_size();
    let origins = tile_origins(width, height, cfg.effective_stride());
    let _span = trace_span!("detect_tiled", tiles = origins.len(), tile = tile).entered();

    // Build the template cache once, outside the workers.
    matcher.prepared();
    let per_tile: Vec<Vec<MatchResult>> = run_jobs(&origins, cfg.parallel, |&(x0, y0)| {
        let w = tile.min(width - x0);
        let h = tile.min(height - y0);
        let crop = ops::crop(gray, x0 as u32, y0 as u32, w as u32, h as u32)?;
        let mut matches = matcher.match_point(&crop, (w / 2) as f32, (h / 2) as f32);
        if cfg.max_per_tile > 0 {
            matches.truncate(cfg.max_per_tile);
        }
        let (dx, dy) = (x0 as i32, y0 as i32);
        Some(
            matches
                .into_iter()
                .map(|m| MatchResult {
                    bbox: m.bbox.translated(dx, dy),
                    outer_bbox: m.outer_bbox.translated(dx, dy),
                    ..m
                })
                .collect(),
        )
    });
    let matches: Vec<MatchResult> = per_tile.into_iter().flatten().collect();

    let scored = score_candidates(gray, &matches, &cfg.weights);
    let total_candidates = scored.len();
    let confirmed: Vec<Candidate> = scored
        .into_iter()
        .filter(|c| c.final_score() >= cfg.score_threshold)
        .collect();
    trace_event!("tiled_detected", candidates = total_candidates, confirmed = confirmed.len());
    Detection {
        total_candidates,
        confirmed,
    }
}

/// Scales visited by the exhaustive scan.
fn exhaustive_scales(cfg: &ExhaustiveConfig) -> Vec<f32> {
    linspace(cfg.scale_min, cfg.scale_max, cfg.scale_steps.max(1))
        .into_iter()
        .filter(|&s| s > 0.0)
        .collect()
}

#[cfg(feature = "rayon")]
fn scan_ink(
    image: ImageView<'_, u8>,
    plan: &CcorrPlan,
    params: ScanParams,
    parallel: bool,
) -> GlyphResult<Vec<Peak>> {
    if parallel {
        crate::kernel::rayon::scan_above_par::<CcorrScalar>(image, plan, params)
    } else {
        CcorrScalar::scan_above(image, plan, params)
    }
}

#[cfg(not(feature = "rayon"))]
fn scan_ink(
    image: ImageView<'_, u8>,
    plan: &CcorrPlan,
    params: ScanParams,
    _parallel: bool,
) -> GlyphResult<Vec<Peak>> {
    CcorrScalar::scan_above(image, plan, params)
}

fn scan_template(
    image_bin: &GrayImage,
    template: &TemplateImage,
    scale: f32,
    cfg: &ExhaustiveConfig,
) -> Vec<Candidate> {
    let tpl_bin = ops::resize_nearest_trunc(&ops::ink_map(template.gray()), scale);
    let (rw, rh) = (tpl_bin.width() as usize, tpl_bin.height() as usize);
    if rw <= 1 || rh <= 1 || rw > image_bin.width() as usize || rh > image_bin.height() as usize {
        return Vec::new();
    }
    let (Ok(image_view), Ok(tpl_view)) =
        (ImageView::from_gray(image_bin), ImageView::from_gray(&tpl_bin))
    else {
        return Vec::new();
    };
    let Ok(plan) = CcorrPlan::from_view(tpl_view) else {
        return Vec::new();
    };
    let params = ScanParams {
        min_score: cfg.match_threshold,
        ..ScanParams::default()
    };
    let Ok(peaks) = scan_ink(image_view, &plan, params, cfg.parallel) else {
        return Vec::new();
    };
    trace_debug!("template_scanned", scale = scale, placements = peaks.len());

    peaks
        .into_iter()
        .filter_map(|peak| {
            let patch = image_view.roi(peak.x, peak.y, rw, rh).ok()?;
            let overlap = ops::shape_ratio(tpl_view, patch);
            if overlap < cfg.overlap_min {
                return None;
            }
            Some(Candidate::with_raw_score(
                template.class_name(),
                template.name(),
                BBox::new(peak.x as i32, peak.y as i32, rw as i32, rh as i32),
                peak.score,
                peak.score + overlap,
            ))
        })
        .collect()
}

/// Correlates every template's binary map over the whole ink map of
/// `gray` at every scale, then applies greedy suppression on the raw
/// `correlation + overlap` score.
pub fn detect_exhaustive<'a>(
    gray: &GrayImage,
    templates: impl IntoIterator<Item = &'a TemplateImage>,
    cfg: &ExhaustiveConfig,
) -> Detection {
    let templates: Vec<&TemplateImage> = templates.into_iter().collect();
    let scales = exhaustive_scales(cfg);
    let _span = trace_span!(
        "detect_exhaustive",
        templates = templates.len(),
        scales = scales.len()
    )
    .entered();

    let image_bin = ops::ink_map(gray);
    let jobs: Vec<(usize, f32)> = (0..templates.len())
        .flat_map(|t| scales.iter().map(move |&s| (t, s)))
        .collect();
    let candidates: Vec<Candidate> = run_jobs(&jobs, cfg.parallel, |&(t, scale)| {
        Some(scan_template(&image_bin, templates[t], scale, cfg))
    })
    .into_iter()
    .flatten()
    .collect();

    let confirmed = nms(&candidates, cfg.nms_iou);
    trace_event!(
        "exhaustive_detected",
        candidates = candidates.len(),
        confirmed = confirmed.len()
    );
    Detection {
        total_candidates: candidates.len(),
        confirmed,
    }
}

/// Serializable summary of a whole-image detection.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DetectionReport {
    pub image: String,
    pub threshold: f32,
    pub total_candidates: usize,
    pub confirmed: Vec<Candidate>,
    pub export: ExportPayload,
}

impl DetectionReport {
    /// Exports `detection` for an image of `size` and wraps the result.
    pub fn new(
        image: &str,
        size: (u32, u32),
        threshold: f32,
        detection: Detection,
        format: ExportFormat,
    ) -> GlyphResult<Self> {
        let export = export_annotations(image, size, &detection.confirmed, format)?;
        Ok(Self {
            image: image.to_owned(),
            threshold,
            total_candidates: detection.total_candidates,
            confirmed: detection.confirmed,
            export,
        })
    }
}
