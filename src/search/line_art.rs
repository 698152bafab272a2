//! Two-stage matching for thin-line templates.
//!
//! Stage one correlates every rotation variant at every scale against the
//! ROI edge map. Stage two rescores the best candidates with a chamfer term
//! and an orientation-histogram similarity, then nudges near-ties towards
//! the orientation-consistent candidate.

use crate::bank::{PreparedTemplate, PreparedTemplates, ScaledMap};
use crate::candidate::topk::Peak;
use crate::geometry::BBox;
use crate::image::ops::{self, Gradients};
use crate::image::ImageView;
use crate::search::engine::{best_peak, placement_shape_ratio, RoiMaps};
use crate::search::{MatchMode, MatchResult};
use crate::template::project_outer;
use crate::trace::{trace_event, trace_span};
use crate::util::math::cosine_similarity;
use crate::util::par::run_jobs;

const RERANK_CORR_WEIGHT: f32 = 0.60;
const RERANK_CHAMFER_WEIGHT: f32 = 0.32;
const RERANK_SHAPE_WEIGHT: f32 = 0.08;
const TAIL_CORR_WEIGHT: f32 = 0.95;
const TAIL_SHAPE_WEIGHT: f32 = 0.05;
const NO_HISTOGRAM: &[f32] = &[];

/// Reranking parameters.
#[derive(Clone, Copy, Debug)]
pub struct LineArtConfig {
    /// Stage-one candidates rescored in stage two.
    pub rerank_top_k: usize,
    /// Maximum final-score gap of a near-tie.
    pub tie_score_eps: f32,
    /// Minimum IoU of a near-tie.
    pub tie_iou: f32,
}

impl Default for LineArtConfig {
    fn default() -> Self {
        Self {
            rerank_top_k: 24,
            tie_score_eps: 0.01,
            tie_iou: 0.30,
        }
    }
}

/// A line-art match with the histogram similarity used by the tie-break.
#[derive(Clone, Debug, PartialEq)]
pub struct RankedMatch {
    pub result: MatchResult,
    pub hist_similarity: f32,
}

/// Bubble pass over adjacent pairs: a near-tie of overlapping boxes is
/// swapped when the later item has the strictly higher histogram
/// similarity. Repeats until a full pass makes no swap.
///
/// Each swap removes exactly one out-of-order pair by histogram similarity,
/// so the loop ends after at most `n * (n - 1) / 2` swaps.
pub fn tie_break(items: &mut [RankedMatch], score_eps: f32, min_iou: f32) {
    if items.len() < 2 {
        return;
    }
    loop {
        let mut swapped = false;
        for i in 0..items.len() - 1 {
            let (a, b) = (&items[i], &items[i + 1]);
            let near = (a.result.score - b.result.score).abs() <= score_eps;
            if near
                && a.result.bbox.iou(&b.result.bbox) >= min_iou
                && b.hist_similarity > a.hist_similarity
            {
                items.swap(i, i + 1);
                swapped = true;
            }
        }
        if !swapped {
            break;
        }
    }
}

/// Stage-one hit: placement plus what stage two needs to rescore it.
struct Coarse<'p> {
    result: MatchResult,
    map: &'p ScaledMap,
    histogram: &'p [f32],
    peak: Peak,
}

/// Scaled edge map of variant `variant_idx`, with the tight/outer boxes it
/// projects through and its histogram. Templates without variants match
/// with their base edge map and an empty histogram.
fn variant_map<'p>(
    entry: &'p PreparedTemplate<'_>,
    scale_idx: usize,
    variant_idx: usize,
) -> Option<(&'p ScaledMap, BBox, BBox, &'p [f32], u32)> {
    let template = entry.template();
    match template.variants().get(variant_idx) {
        Some(variant) => Some((
            entry.variant(scale_idx, variant_idx)?,
            variant.tight_bbox,
            variant.outer_bbox,
            variant.histogram.as_slice(),
            variant.rotation.degrees(),
        )),
        None if variant_idx == 0 => Some((
            entry.edge(scale_idx)?,
            template.tight_bbox(),
            template.outer_bbox(),
            NO_HISTOGRAM,
            0,
        )),
        None => None,
    }
}

/// Mean distance-field value under the template foreground, mapped to
/// `1 / (1 + mean)`. Zero for an empty template.
fn chamfer_score(field: &[f32], field_width: usize, tpl: &ScaledMap, peak: &Peak) -> f32 {
    let mut sum = 0.0f64;
    let mut count = 0usize;
    for (tx, ty, px) in tpl.map().enumerate_pixels() {
        if px[0] == 0 {
            continue;
        }
        let idx = (peak.y + ty as usize) * field_width + peak.x + tx as usize;
        if let Some(&d) = field.get(idx) {
            sum += f64::from(d);
            count += 1;
        }
    }
    if count == 0 {
        return 0.0;
    }
    (1.0 / (1.0 + sum / count as f64)) as f32
}

/// Line-art matching in one ROI. Empty when the ROI has no edge pixels.
pub fn line_art_roi(
    maps: &RoiMaps,
    prepared: &PreparedTemplates<'_>,
    cfg: &LineArtConfig,
    parallel: bool,
) -> Vec<MatchResult> {
    let _span = trace_span!("line_art_match", templates = prepared.len()).entered();
    if ops::count_nonzero(maps.edge()) == 0 {
        trace_event!("line_art_no_edges", templates = prepared.len());
        return Vec::new();
    }
    let Ok(target) = ImageView::from_gray(maps.edge()) else {
        return Vec::new();
    };
    let roi = maps.roi();

    let mut jobs = Vec::new();
    for (t, entry) in prepared.entries().iter().enumerate() {
        let variants = entry.template().variants().len().max(1);
        for s in 0..entry.num_scales() {
            jobs.extend((0..variants).map(|v| (t, s, v)));
        }
    }

    let mut coarse: Vec<Coarse<'_>> = run_jobs(&jobs, parallel, |&(t, s, v)| {
        let entry = &prepared.entries()[t];
        let (map, tight, outer, histogram, rotation_deg) = variant_map(entry, s, v)?;
        let peak = best_peak(target, map)?;
        let x = (roi.x0 + peak.x) as i32;
        let y = (roi.y0 + peak.y) as i32;
        let template = entry.template();
        let result = MatchResult {
            class_name: template.class_name().to_owned(),
            template_name: template.name().to_owned(),
            score: peak.score,
            scale: map.scale(),
            bbox: BBox::new(x, y, map.width() as i32, map.height() as i32),
            outer_bbox: project_outer(tight, outer, x, y, map.scale()),
            mode: MatchMode::Edge,
            shape_ratio: placement_shape_ratio(target, map, &peak),
            rotation_deg,
        };
        Some(Coarse {
            result,
            map,
            histogram,
            peak,
        })
    });
    coarse.sort_by(|a, b| b.result.score.total_cmp(&a.result.score));

    let rerank = cfg.rerank_top_k.min(coarse.len());
    let field = ops::distance_field(maps.edge());
    let gradients = Gradients::sobel(maps.gray());
    let width = maps.edge().width() as usize;

    let mut ranked: Vec<RankedMatch> = coarse
        .into_iter()
        .enumerate()
        .map(|(rank, hit)| {
            let Coarse {
                mut result,
                map,
                histogram,
                peak,
            } = hit;
            let stage1 = result.score;
            if rank >= rerank {
                result.score = TAIL_CORR_WEIGHT * stage1 + TAIL_SHAPE_WEIGHT * result.shape_ratio;
                return RankedMatch {
                    result,
                    hist_similarity: 0.0,
                };
            }
            let chamfer = chamfer_score(&field, width, map, &peak);
            let window = (peak.x, peak.y, map.width(), map.height());
            let roi_hist = gradients.orientation_histogram(maps.edge(), window);
            let hist_similarity = cosine_similarity(&roi_hist, histogram);
            result.score = RERANK_CORR_WEIGHT * stage1
                + RERANK_CHAMFER_WEIGHT * chamfer
                + RERANK_SHAPE_WEIGHT * result.shape_ratio;
            RankedMatch {
                result,
                hist_similarity,
            }
        })
        .collect();

    ranked.sort_by(|a, b| b.result.score.total_cmp(&a.result.score));
    tie_break(&mut ranked, cfg.tie_score_eps, cfg.tie_iou);
    trace_event!("line_art_ranked", jobs = jobs.len(), reranked = rerank, matches = ranked.len());
    ranked.into_iter().map(|r| r.result).collect()
}
