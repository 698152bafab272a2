//! Scalar reference kernels for score evaluation.

use crate::kernel::Kernel;
use crate::template::{CcorrPlan, MaskedTemplatePlan, TemplatePlan, ZnccPlan};
use crate::ImageView;

/// Masked ZNCC: statistics over template mask pixels only.
pub struct ZnccMaskedScalar;

/// Unmasked ZNCC over the whole template window.
pub struct ZnccUnmaskedScalar;

/// Dispatches to the masked or unmasked kernel depending on the plan.
pub struct ZnccScalar;

/// Normalized cross-correlation without mean removal.
pub struct CcorrScalar;

fn placement_fits(image: ImageView<'_, u8>, size: (usize, usize), x: usize, y: usize) -> bool {
    let (w, h) = size;
    image.width() >= w && image.height() >= h && x <= image.width() - w && y <= image.height() - h
}

fn finite_or_neg_inf(score: f32) -> f32 {
    if score.is_finite() {
        score
    } else {
        f32::NEG_INFINITY
    }
}

impl Kernel for ZnccMaskedScalar {
    type Plan = MaskedTemplatePlan;

    fn plan_size(plan: &Self::Plan) -> (usize, usize) {
        (plan.width(), plan.height())
    }

    fn score_at(
        image: ImageView<'_, u8>,
        tpl: &Self::Plan,
        x: usize,
        y: usize,
        min_var_i: f32,
    ) -> f32 {
        let tpl_width = tpl.width();
        if !placement_fits(image, (tpl_width, tpl.height()), x, y) {
            return f32::NEG_INFINITY;
        }
        let t_prime = tpl.t_prime();
        let mask = tpl.mask();

        let mut dot = 0.0f32;
        let mut sum_i = 0.0f32;
        let mut sum_i2 = 0.0f32;
        for ty in 0..tpl.height() {
            let Some(img_row) = image.row(y + ty) else {
                return f32::NEG_INFINITY;
            };
            let base = ty * tpl_width;
            for tx in 0..tpl_width {
                let idx = base + tx;
                if mask[idx] == 0 {
                    continue;
                }
                let value = f32::from(img_row[x + tx]);
                dot += t_prime[idx] * value;
                sum_i += value;
                sum_i2 += value * value;
            }
        }

        let var_i = sum_i2 - (sum_i * sum_i) / tpl.sum_w();
        if var_i <= min_var_i {
            return f32::NEG_INFINITY;
        }
        finite_or_neg_inf(dot / (tpl.var_t() * var_i).sqrt())
    }
}

impl Kernel for ZnccUnmaskedScalar {
    type Plan = TemplatePlan;

    fn plan_size(plan: &Self::Plan) -> (usize, usize) {
        (plan.width(), plan.height())
    }

    fn score_at(
        image: ImageView<'_, u8>,
        tpl: &Self::Plan,
        x: usize,
        y: usize,
        min_var_i: f32,
    ) -> f32 {
        let tpl_width = tpl.width();
        if !placement_fits(image, (tpl_width, tpl.height()), x, y) {
            return f32::NEG_INFINITY;
        }
        let t_prime = tpl.t_prime();
        let n = (tpl_width * tpl.height()) as f32;

        let mut dot = 0.0f32;
        let mut sum_i = 0.0f32;
        let mut sum_i2 = 0.0f32;
        for ty in 0..tpl.height() {
            let Some(img_row) = image.row(y + ty) else {
                return f32::NEG_INFINITY;
            };
            let base = ty * tpl_width;
            for (tx, &t) in t_prime[base..base + tpl_width].iter().enumerate() {
                let value = f32::from(img_row[x + tx]);
                dot += t * value;
                sum_i += value;
                sum_i2 += value * value;
            }
        }

        let var_i = sum_i2 - (sum_i * sum_i) / n;
        if var_i <= min_var_i {
            return f32::NEG_INFINITY;
        }
        finite_or_neg_inf(dot / (tpl.var_t() * var_i).sqrt())
    }
}

impl Kernel for ZnccScalar {
    type Plan = ZnccPlan;

    fn plan_size(plan: &Self::Plan) -> (usize, usize) {
        (plan.width(), plan.height())
    }

    fn score_at(
        image: ImageView<'_, u8>,
        plan: &Self::Plan,
        x: usize,
        y: usize,
        min_var_i: f32,
    ) -> f32 {
        match plan {
            ZnccPlan::Masked(p) => ZnccMaskedScalar::score_at(image, p, x, y, min_var_i),
            ZnccPlan::Unmasked(p) => ZnccUnmaskedScalar::score_at(image, p, x, y, min_var_i),
        }
    }
}

impl Kernel for CcorrScalar {
    type Plan = CcorrPlan;

    fn plan_size(plan: &Self::Plan) -> (usize, usize) {
        (plan.width(), plan.height())
    }

    fn score_at(
        image: ImageView<'_, u8>,
        tpl: &Self::Plan,
        x: usize,
        y: usize,
        min_var_i: f32,
    ) -> f32 {
        let tpl_width = tpl.width();
        if !placement_fits(image, (tpl_width, tpl.height()), x, y) {
            return f32::NEG_INFINITY;
        }
        let data = tpl.data();

        let mut dot = 0.0f32;
        let mut sum_i2 = 0.0f32;
        for ty in 0..tpl.height() {
            let Some(img_row) = image.row(y + ty) else {
                return f32::NEG_INFINITY;
            };
            let base = ty * tpl_width;
            for (tx, &t) in data[base..base + tpl_width].iter().enumerate() {
                let value = f32::from(img_row[x + tx]);
                dot += t * value;
                sum_i2 += value * value;
            }
        }

        if sum_i2 <= min_var_i {
            return f32::NEG_INFINITY;
        }
        finite_or_neg_inf(dot / (tpl.sum_t2() * sum_i2).sqrt())
    }
}

#[cfg(test)]
mod tests {
    use super::{CcorrScalar, Kernel, ZnccUnmaskedScalar};
    use crate::kernel::ScanParams;
    use crate::template::{CcorrPlan, TemplatePlan};
    use crate::ImageView;

    #[test]
    fn unmasked_zncc_scan_matches_bruteforce() {
        let img_width = 6;
        let img_height = 5;
        let mut image = Vec::with_capacity(img_width * img_height);
        for y in 0..img_height {
            for x in 0..img_width {
                image.push(((x * 17 + y * 9 + x * y) & 0xFF) as u8);
            }
        }
        let tpl_width = 3;
        let tpl_height = 2;
        let mut tpl = Vec::with_capacity(tpl_width * tpl_height);
        for y in 0..tpl_height {
            for x in 0..tpl_width {
                tpl.push(((x * 5 + y * 11 + x * y) & 0xFF) as u8);
            }
        }

        let image_view = ImageView::from_slice(&image, img_width, img_height).unwrap();
        let tpl_view = ImageView::from_slice(&tpl, tpl_width, tpl_height).unwrap();
        let plan = TemplatePlan::from_view(tpl_view).unwrap();

        let best = ZnccUnmaskedScalar::scan_full(image_view, &plan, ScanParams::default())
            .unwrap()
            .pop()
            .unwrap();

        let t_prime = plan.t_prime();
        let var_t = plan.var_t() as f64;
        let n = (tpl_width * tpl_height) as f64;
        let mut best_score = f64::NEG_INFINITY;
        let mut best_x = 0;
        let mut best_y = 0;
        for y in 0..=(img_height - tpl_height) {
            for x in 0..=(img_width - tpl_width) {
                let mut dot = 0.0f64;
                let mut sum_i = 0.0f64;
                let mut sum_i2 = 0.0f64;
                for ty in 0..tpl_height {
                    let row = image_view.row(y + ty).unwrap();
                    for tx in 0..tpl_width {
                        let value = row[x + tx] as f64;
                        dot += t_prime[ty * tpl_width + tx] as f64 * value;
                        sum_i += value;
                        sum_i2 += value * value;
                    }
                }
                let var_i = sum_i2 - (sum_i * sum_i) / n;
                if var_i <= 1e-8 {
                    continue;
                }
                let score = dot / (var_t * var_i).sqrt();
                if score > best_score {
                    best_score = score;
                    best_x = x;
                    best_y = y;
                }
            }
        }

        assert_eq!(best.x, best_x);
        assert_eq!(best.y, best_y);
        assert!((best.score - best_score as f32).abs() < 1e-4);
    }

    #[test]
    fn ccorr_scores_exact_binary_copy_as_one() {
        let tpl = [255u8, 0, 255, 255];
        let mut image = vec![0u8; 16];
        image[5] = 255;
        image[9] = 255;
        image[10] = 255;
        let tpl_view = ImageView::from_slice(&tpl, 2, 2).unwrap();
        let img_view = ImageView::from_slice(&image, 4, 4).unwrap();
        let plan = CcorrPlan::from_view(tpl_view).unwrap();
        let score = CcorrScalar::score_at(img_view, &plan, 1, 1, 1e-8);
        assert!((score - 1.0).abs() < 1e-6);
        assert_eq!(
            CcorrScalar::score_at(img_view, &plan, 3, 3, 1e-8),
            f32::NEG_INFINITY
        );
    }
}
