//! Rayon-parallel scans (feature-gated).
//!
//! Rows of placements are scored in parallel; per-row results are merged in
//! row order, so the output equals the sequential threshold scan exactly.

use crate::candidate::topk::Peak;
use crate::kernel::{placement_range, Kernel, ScanParams};
use crate::util::GlyphResult;
use crate::ImageView;
use rayon::prelude::*;

fn scan_rows<K: Kernel>(
    image: ImageView<'_, u8>,
    plan: &K::Plan,
    params: ScanParams,
) -> GlyphResult<Vec<Vec<Peak>>> {
    let (max_x, max_y) = placement_range(image, K::plan_size(plan))?;
    Ok((0..=max_y)
        .into_par_iter()
        .map(|y| {
            let mut row_peaks = Vec::new();
            for x in 0..=max_x {
                let score = K::score_at(image, plan, x, y, params.min_var_i);
                if score.is_finite() && score >= params.min_score {
                    row_peaks.push(Peak { x, y, score });
                }
            }
            row_peaks
        })
        .collect())
}

/// Row-parallel counterpart of [`Kernel::scan_above`].
pub fn scan_above_par<K: Kernel>(
    image: ImageView<'_, u8>,
    plan: &K::Plan,
    params: ScanParams,
) -> GlyphResult<Vec<Peak>> {
    Ok(scan_rows::<K>(image, plan, params)?
        .into_iter()
        .flatten()
        .collect())
}
