//! Template plan precomputation for normalized correlation.

use crate::image::ImageView;
use crate::util::{GlyphError, GlyphResult};

const MIN_VARIANCE: f32 = 1e-8;

/// Zero-mean template buffer for unmasked ZNCC.
pub struct TemplatePlan {
    width: usize,
    height: usize,
    t_prime: Vec<f32>,
    var_t: f32,
}

impl TemplatePlan {
    pub fn from_view(tpl: ImageView<'_, u8>) -> GlyphResult<Self> {
        let values = collect_f32(tpl)?;
        let n = values.len() as f32;
        let mean = values.iter().sum::<f32>() / n;
        let t_prime: Vec<f32> = values.iter().map(|v| v - mean).collect();
        let var_t: f32 = t_prime.iter().map(|v| v * v).sum();
        if var_t <= MIN_VARIANCE {
            return Err(GlyphError::DegenerateTemplate {
                reason: "zero variance",
            });
        }
        Ok(Self {
            width: tpl.width(),
            height: tpl.height(),
            t_prime,
            var_t,
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Zero-mean template values in row-major order.
    pub fn t_prime(&self) -> &[f32] {
        &self.t_prime
    }

    /// Sum of squared deviations of the template.
    pub fn var_t(&self) -> f32 {
        self.var_t
    }
}

/// Masked ZNCC plan: statistics are taken over mask pixels only.
pub struct MaskedTemplatePlan {
    width: usize,
    height: usize,
    mask: Vec<u8>,
    t_prime: Vec<f32>,
    sum_w: f32,
    var_t: f32,
}

impl MaskedTemplatePlan {
    /// Builds a plan; `mask` must share the template shape.
    pub fn from_view(tpl: ImageView<'_, u8>, mask: ImageView<'_, u8>) -> GlyphResult<Self> {
        if tpl.width() != mask.width() || tpl.height() != mask.height() {
            return Err(GlyphError::InvalidInput("mask shape differs from template"));
        }
        let values = collect_f32(tpl)?;
        let mask: Vec<u8> = collect_f32(mask)?
            .into_iter()
            .map(|v| u8::from(v != 0.0))
            .collect();
        let sum_w = mask.iter().map(|&m| f32::from(m)).sum::<f32>();
        if sum_w < 2.0 {
            return Err(GlyphError::DegenerateTemplate {
                reason: "mask too small",
            });
        }
        let mean = values
            .iter()
            .zip(&mask)
            .filter(|(_, &m)| m != 0)
            .map(|(v, _)| v)
            .sum::<f32>()
            / sum_w;
        let t_prime: Vec<f32> = values
            .iter()
            .zip(&mask)
            .map(|(v, &m)| if m != 0 { v - mean } else { 0.0 })
            .collect();
        let var_t: f32 = t_prime.iter().map(|v| v * v).sum();
        if var_t <= MIN_VARIANCE {
            return Err(GlyphError::DegenerateTemplate {
                reason: "zero variance under mask",
            });
        }
        Ok(Self {
            width: tpl.width(),
            height: tpl.height(),
            mask,
            t_prime,
            sum_w,
            var_t,
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Binary mask (0 or 1) in row-major order.
    pub fn mask(&self) -> &[u8] {
        &self.mask
    }

    /// Zero-mean template values, zeroed outside the mask.
    pub fn t_prime(&self) -> &[f32] {
        &self.t_prime
    }

    /// Number of mask pixels.
    pub fn sum_w(&self) -> f32 {
        self.sum_w
    }

    pub fn var_t(&self) -> f32 {
        self.var_t
    }
}

/// Plan for normalized cross-correlation without mean removal
/// (`sum(I*T) / sqrt(sum(I^2) * sum(T^2))`), used on binary maps.
pub struct CcorrPlan {
    width: usize,
    height: usize,
    data: Vec<f32>,
    sum_t2: f32,
}

impl CcorrPlan {
    pub fn from_view(tpl: ImageView<'_, u8>) -> GlyphResult<Self> {
        let data = collect_f32(tpl)?;
        let sum_t2: f32 = data.iter().map(|v| v * v).sum();
        if sum_t2 <= MIN_VARIANCE {
            return Err(GlyphError::DegenerateTemplate {
                reason: "empty template",
            });
        }
        Ok(Self {
            width: tpl.width(),
            height: tpl.height(),
            data,
            sum_t2,
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn sum_t2(&self) -> f32 {
        self.sum_t2
    }
}

/// ZNCC plan chosen per template instance: mask-aware when the mask is
/// usable, plain ZNCC otherwise.
pub enum ZnccPlan {
    Masked(MaskedTemplatePlan),
    Unmasked(TemplatePlan),
}

impl ZnccPlan {
    /// Returns `None` when neither variant can be built (constant template).
    pub fn build(tpl: ImageView<'_, u8>, mask: Option<ImageView<'_, u8>>) -> Option<Self> {
        if let Some(mask) = mask {
            if let Ok(plan) = MaskedTemplatePlan::from_view(tpl, mask) {
                return Some(Self::Masked(plan));
            }
        }
        TemplatePlan::from_view(tpl).ok().map(Self::Unmasked)
    }

    pub fn width(&self) -> usize {
        match self {
            Self::Masked(plan) => plan.width(),
            Self::Unmasked(plan) => plan.width(),
        }
    }

    pub fn height(&self) -> usize {
        match self {
            Self::Masked(plan) => plan.height(),
            Self::Unmasked(plan) => plan.height(),
        }
    }

    pub fn is_masked(&self) -> bool {
        matches!(self, Self::Masked(_))
    }
}

fn collect_f32(view: ImageView<'_, u8>) -> GlyphResult<Vec<f32>> {
    let mut out = Vec::with_capacity(view.width() * view.height());
    for y in 0..view.height() {
        let row = view.row(y).ok_or(GlyphError::BufferTooSmall {
            needed: (y + 1) * view.stride(),
            got: view.as_slice().len(),
        })?;
        out.extend(row.iter().map(|&v| f32::from(v)));
    }
    Ok(out)
}
