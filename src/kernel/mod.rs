//! Correlation kernel implementations.
//!
//! Each kernel scores one template placement at a time; scans are built on
//! top of `score_at` so every kernel gets Top-K and threshold scans for free.

use crate::candidate::topk::{Peak, TopK};
use crate::util::{GlyphError, GlyphResult};
use crate::ImageView;

/// Scan configuration for kernel evaluations.
#[derive(Clone, Copy, Debug)]
pub struct ScanParams {
    /// Maximum number of peaks to retain.
    pub topk: usize,
    /// Minimum image-window energy; flatter windows are skipped.
    pub min_var_i: f32,
    /// Minimum score threshold (discard below this value).
    pub min_score: f32,
}

impl Default for ScanParams {
    fn default() -> Self {
        Self {
            topk: 1,
            min_var_i: 1e-8,
            min_score: f32::NEG_INFINITY,
        }
    }
}

/// Kernel trait for scoring and scan operations.
pub trait Kernel {
    type Plan: Sync;

    /// Template `(width, height)`.
    fn plan_size(plan: &Self::Plan) -> (usize, usize);

    /// Score at a single placement (top-left coordinates); `NEG_INFINITY`
    /// when the placement is invalid or the window is too flat.
    fn score_at(
        image: ImageView<'_, u8>,
        plan: &Self::Plan,
        x: usize,
        y: usize,
        min_var_i: f32,
    ) -> f32;

    /// Scans every valid placement and returns the top-K peaks.
    fn scan_full(
        image: ImageView<'_, u8>,
        plan: &Self::Plan,
        params: ScanParams,
    ) -> GlyphResult<Vec<Peak>> {
        let (max_x, max_y) = placement_range(image, Self::plan_size(plan))?;
        if params.topk == 0 {
            return Ok(Vec::new());
        }
        let mut topk = TopK::new(params.topk);
        for y in 0..=max_y {
            for x in 0..=max_x {
                let score = Self::score_at(image, plan, x, y, params.min_var_i);
                if score.is_finite() && score >= params.min_score {
                    topk.push(Peak { x, y, score });
                }
            }
        }
        Ok(topk.into_sorted_desc())
    }

    /// Every placement scoring at least `params.min_score`, in raster order.
    fn scan_above(
        image: ImageView<'_, u8>,
        plan: &Self::Plan,
        params: ScanParams,
    ) -> GlyphResult<Vec<Peak>> {
        let (max_x, max_y) = placement_range(image, Self::plan_size(plan))?;
        let mut out = Vec::new();
        for y in 0..=max_y {
            for x in 0..=max_x {
                let score = Self::score_at(image, plan, x, y, params.min_var_i);
                if score.is_finite() && score >= params.min_score {
                    out.push(Peak { x, y, score });
                }
            }
        }
        Ok(out)
    }
}

/// Largest valid top-left placement for a template of `size`.
pub(crate) fn placement_range(
    image: ImageView<'_, u8>,
    (tpl_width, tpl_height): (usize, usize),
) -> GlyphResult<(usize, usize)> {
    let img_width = image.width();
    let img_height = image.height();
    if img_width < tpl_width || img_height < tpl_height {
        return Err(GlyphError::RoiOutOfBounds {
            x: 0,
            y: 0,
            width: tpl_width,
            height: tpl_height,
            img_width,
            img_height,
        });
    }
    Ok((img_width - tpl_width, img_height - tpl_height))
}

pub mod scalar;

#[cfg(feature = "rayon")]
pub mod rayon;
