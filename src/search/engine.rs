//! Multi-scale, dual-mode correlation search inside one ROI.

use crate::bank::{PreparedTemplate, PreparedTemplates, ScaledMap};
use crate::candidate::topk::Peak;
use crate::geometry::{BBox, Roi};
use crate::image::{ops, ImageView};
use crate::kernel::scalar::ZnccScalar;
use crate::kernel::{Kernel, ScanParams};
use crate::search::{sort_by_score_desc, MatchMode, MatchResult};
use crate::trace::{trace_event, trace_span};
use crate::util::par::run_jobs;
use crate::util::{GlyphError, GlyphResult};
use image::GrayImage;

/// Grayscale, edge and binary maps of a query ROI, plus where it sits in the
/// full image.
#[derive(Clone, Debug)]
pub struct RoiMaps {
    roi: Roi,
    gray: GrayImage,
    edge: GrayImage,
    binary: GrayImage,
}

impl RoiMaps {
    /// Crops `roi` out of `gray` and derives its maps the same way templates
    /// derive theirs. `None` when the crop is empty.
    pub fn extract(gray: &GrayImage, roi: Roi) -> Option<Self> {
        let crop = ops::crop(
            gray,
            roi.x0 as u32,
            roi.y0 as u32,
            roi.width() as u32,
            roi.height() as u32,
        )?;
        let roi = Roi {
            x1: roi.x0 + crop.width() as usize,
            y1: roi.y0 + crop.height() as usize,
            ..roi
        };
        Some(Self {
            roi,
            edge: ops::edge_map(&crop, None),
            binary: ops::binary_map(&crop, None),
            gray: crop,
        })
    }

    /// Uses precomputed maps; every map must have the ROI's shape.
    pub fn from_maps(
        roi: Roi,
        gray: GrayImage,
        edge: GrayImage,
        binary: GrayImage,
    ) -> GlyphResult<Self> {
        let dims = (roi.width() as u32, roi.height() as u32);
        if gray.dimensions() != dims || edge.dimensions() != dims || binary.dimensions() != dims {
            return Err(GlyphError::InvalidInput("roi maps differ from roi shape"));
        }
        Ok(Self {
            roi,
            gray,
            edge,
            binary,
        })
    }

    pub fn roi(&self) -> Roi {
        self.roi
    }

    pub fn gray(&self) -> &GrayImage {
        &self.gray
    }

    pub fn edge(&self) -> &GrayImage {
        &self.edge
    }

    pub fn binary(&self) -> &GrayImage {
        &self.binary
    }

    pub fn map(&self, mode: MatchMode) -> &GrayImage {
        match mode {
            MatchMode::Edge => &self.edge,
            MatchMode::Binary => &self.binary,
        }
    }
}

/// Best ZNCC placement of `tpl` inside `target`; `None` when the template
/// does not fit or no window has enough variance.
pub(crate) fn best_peak(target: ImageView<'_, u8>, tpl: &ScaledMap) -> Option<Peak> {
    if !tpl.fits(target.width(), target.height()) {
        return None;
    }
    ZnccScalar::scan_full(target, tpl.plan(), ScanParams::default())
        .ok()?
        .into_iter()
        .next()
}

/// Fraction of `tpl` foreground also set in `target` under the placement
/// at `peak`.
pub(crate) fn placement_shape_ratio(target: ImageView<'_, u8>, tpl: &ScaledMap, peak: &Peak) -> f32 {
    let (Some(tpl_view), Ok(patch)) = (
        tpl.view(),
        target.roi(peak.x, peak.y, tpl.width(), tpl.height()),
    ) else {
        return 0.0;
    };
    ops::shape_ratio(tpl_view, patch)
}

fn scaled_map<'p>(
    entry: &'p PreparedTemplate<'_>,
    scale_idx: usize,
    mode: MatchMode,
) -> Option<&'p ScaledMap> {
    match mode {
        MatchMode::Edge => entry.edge(scale_idx),
        MatchMode::Binary => entry.binary(scale_idx),
    }
}

/// Runs one mode over every (template, scale) pair. Results are sorted by
/// descending score; ties keep job order.
pub fn attempt_mode(
    maps: &RoiMaps,
    prepared: &PreparedTemplates<'_>,
    mode: MatchMode,
    parallel: bool,
) -> Vec<MatchResult> {
    let _span = trace_span!("attempt_mode", mode = ?mode).entered();
    let Ok(target) = ImageView::from_gray(maps.map(mode)) else {
        return Vec::new();
    };
    let roi = maps.roi();
    let jobs = prepared.jobs();
    let mut results = run_jobs(&jobs, parallel, |&(t, s)| {
        let entry = &prepared.entries()[t];
        let tpl = scaled_map(entry, s, mode)?;
        let peak = best_peak(target, tpl)?;
        let template = entry.template();
        let x = (roi.x0 + peak.x) as i32;
        let y = (roi.y0 + peak.y) as i32;
        Some(MatchResult {
            class_name: template.class_name().to_owned(),
            template_name: template.name().to_owned(),
            score: peak.score,
            scale: tpl.scale(),
            bbox: BBox::new(x, y, tpl.width() as i32, tpl.height() as i32),
            outer_bbox: template.project_outer(x, y, tpl.scale()),
            mode,
            shape_ratio: placement_shape_ratio(target, tpl, &peak),
            rotation_deg: 0,
        })
    });
    sort_by_score_desc(&mut results);
    trace_event!("mode_attempted", jobs = jobs.len(), matches = results.len());
    results
}

/// Edge-mode search with a binary-mode fallback when edges find nothing.
pub fn match_roi(
    maps: &RoiMaps,
    prepared: &PreparedTemplates<'_>,
    parallel: bool,
) -> Vec<MatchResult> {
    let edge = attempt_mode(maps, prepared, MatchMode::Edge, parallel);
    if !edge.is_empty() {
        return edge;
    }
    trace_event!("binary_fallback", templates = prepared.len());
    attempt_mode(maps, prepared, MatchMode::Binary, parallel)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn cross(size: u32) -> GrayImage {
        GrayImage::from_fn(size, size, |x, y| {
            let on = x == size / 2 || y == size / 2 || x == y;
            Luma([if on { 255 } else { 0 }])
        })
    }

    #[test]
    fn best_peak_finds_embedded_pattern() {
        let tpl = cross(12);
        let mask = GrayImage::from_pixel(12, 12, Luma([255]));
        let scaled = ScaledMap::build(&tpl, &mask, 1.0).unwrap();
        let mut target = GrayImage::new(40, 30);
        image::imageops::replace(&mut target, &tpl, 17, 9);
        let view = ImageView::from_gray(&target).unwrap();
        let peak = best_peak(view, &scaled).unwrap();
        assert_eq!((peak.x, peak.y), (17, 9));
        assert!((peak.score - 1.0).abs() < 1e-4);
        assert!((placement_shape_ratio(view, &scaled, &peak) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn template_larger_than_target_is_skipped() {
        let tpl = cross(12);
        let mask = GrayImage::from_pixel(12, 12, Luma([255]));
        let scaled = ScaledMap::build(&tpl, &mask, 1.0).unwrap();
        let target = GrayImage::new(11, 40);
        let view = ImageView::from_gray(&target).unwrap();
        assert!(best_peak(view, &scaled).is_none());
    }

    #[test]
    fn roi_maps_reject_mismatched_shapes() {
        let roi = Roi {
            x0: 0,
            y0: 0,
            x1: 8,
            y1: 8,
        };
        let ok = GrayImage::new(8, 8);
        let bad = GrayImage::new(7, 8);
        assert!(RoiMaps::from_maps(roi, ok.clone(), ok.clone(), ok.clone()).is_ok());
        assert!(RoiMaps::from_maps(roi, ok.clone(), bad, ok).is_err());
    }
}
