//! Per-scale template cache shared across queries.
//!
//! Preparing templates once amortizes resizing and plan construction across
//! successive queries on the same template set. Edge maps are scaled eagerly;
//! binary maps and rotated variants are only needed on the fallback and
//! line-art paths, so each slot is populated at most once and stored in a
//! `OnceLock` for thread-safe reuse.

use crate::image::ops;
use crate::image::ImageView;
use crate::template::{TemplateImage, ZnccPlan};
use crate::trace::{trace_event, trace_span};
use crate::util::math::scale_sweep;
use image::GrayImage;
use std::sync::OnceLock;

/// Absolute floor on foreground pixels of a scaled template.
const MIN_FOREGROUND: usize = 10;
/// Relative floor on foreground pixels, as a fraction of the pixel area.
const MIN_FOREGROUND_FRACTION: f64 = 0.002;

/// True when a scaled map has too little foreground to correlate reliably.
pub fn is_sparse(map: &GrayImage) -> bool {
    let area = map.width() as usize * map.height() as usize;
    let floor = MIN_FOREGROUND.max((area as f64 * MIN_FOREGROUND_FRACTION) as usize);
    ops::count_nonzero(map) < floor
}

/// One map resized to a scale, with its correlation plan.
pub struct ScaledMap {
    scale: f32,
    map: GrayImage,
    plan: ZnccPlan,
}

impl ScaledMap {
    /// Resizes `map` and `mask` by `scale` and builds a plan; `None` when the
    /// scaled map is too sparse or constant.
    pub fn build(map: &GrayImage, mask: &GrayImage, scale: f32) -> Option<Self> {
        let scaled = ops::resize_scaled(map, scale);
        if is_sparse(&scaled) {
            return None;
        }
        let scaled_mask = ops::resize_mask(mask, scale);
        let tpl_view = ImageView::from_gray(&scaled).ok()?;
        let mask_view = if ops::same_shape(&scaled, &scaled_mask) {
            ImageView::from_gray(&scaled_mask).ok()
        } else {
            None
        };
        let plan = ZnccPlan::build(tpl_view, mask_view)?;
        Some(Self {
            scale,
            map: scaled,
            plan,
        })
    }

    pub fn scale(&self) -> f32 {
        self.scale
    }

    pub fn map(&self) -> &GrayImage {
        &self.map
    }

    pub fn view(&self) -> Option<ImageView<'_, u8>> {
        ImageView::from_gray(&self.map).ok()
    }

    pub fn plan(&self) -> &ZnccPlan {
        &self.plan
    }

    pub fn width(&self) -> usize {
        self.map.width() as usize
    }

    pub fn height(&self) -> usize {
        self.map.height() as usize
    }

    /// True when the map fits inside a `width x height` region.
    pub fn fits(&self, width: usize, height: usize) -> bool {
        self.width() <= width && self.height() <= height
    }
}

struct ScaleSlot {
    scale: f32,
    edge: Option<ScaledMap>,
    binary: OnceLock<Option<ScaledMap>>,
    variants: OnceLock<Vec<Option<ScaledMap>>>,
}

/// A template with its per-scale maps.
pub struct PreparedTemplate<'a> {
    template: &'a TemplateImage,
    slots: Vec<ScaleSlot>,
}

impl<'a> PreparedTemplate<'a> {
    fn new(template: &'a TemplateImage, scales: &[f32]) -> Self {
        let slots = scales
            .iter()
            .map(|&scale| ScaleSlot {
                scale,
                edge: ScaledMap::build(template.edge(), template.mask(), scale),
                binary: OnceLock::new(),
                variants: OnceLock::new(),
            })
            .collect();
        Self { template, slots }
    }

    pub fn template(&self) -> &'a TemplateImage {
        self.template
    }

    pub fn num_scales(&self) -> usize {
        self.slots.len()
    }

    pub fn scale(&self, scale_idx: usize) -> Option<f32> {
        self.slots.get(scale_idx).map(|slot| slot.scale)
    }

    /// Scaled edge map, or `None` when it was filtered out.
    pub fn edge(&self, scale_idx: usize) -> Option<&ScaledMap> {
        self.slots.get(scale_idx)?.edge.as_ref()
    }

    /// Scaled binary map, built on first use.
    pub fn binary(&self, scale_idx: usize) -> Option<&ScaledMap> {
        let slot = self.slots.get(scale_idx)?;
        slot.binary
            .get_or_init(|| ScaledMap::build(self.template.binary(), self.template.mask(), slot.scale))
            .as_ref()
    }

    /// Scaled edge map of rotation variant `variant_idx`, built on first use.
    pub fn variant(&self, scale_idx: usize, variant_idx: usize) -> Option<&ScaledMap> {
        let slot = self.slots.get(scale_idx)?;
        slot.variants
            .get_or_init(|| {
                self.template
                    .variants()
                    .iter()
                    .map(|variant| ScaledMap::build(&variant.edge, &variant.mask, slot.scale))
                    .collect()
            })
            .get(variant_idx)?
            .as_ref()
    }
}

/// Read-only cache of prepared templates; build once per template set and
/// share it across queries.
pub struct PreparedTemplates<'a> {
    scales: Vec<f32>,
    entries: Vec<PreparedTemplate<'a>>,
}

impl<'a> PreparedTemplates<'a> {
    /// Prepares `templates` for the linear sweep of `scale_steps` factors
    /// between `scale_min` and `scale_max` (unscaled when `scale_steps <= 1`).
    pub fn new(
        templates: impl IntoIterator<Item = &'a TemplateImage>,
        scale_min: f32,
        scale_max: f32,
        scale_steps: usize,
    ) -> Self {
        Self::with_scales(templates, scale_sweep(scale_min, scale_max, scale_steps))
    }

    /// Prepares `templates` for an explicit list of scale factors.
    pub fn with_scales(
        templates: impl IntoIterator<Item = &'a TemplateImage>,
        scales: Vec<f32>,
    ) -> Self {
        let _span = trace_span!("prepare_scales", scales = scales.len()).entered();
        let entries: Vec<_> = templates
            .into_iter()
            .map(|template| PreparedTemplate::new(template, &scales))
            .collect();
        trace_event!("templates_prepared", templates = entries.len());
        Self { scales, entries }
    }

    pub fn scales(&self) -> &[f32] {
        &self.scales
    }

    pub fn entries(&self) -> &[PreparedTemplate<'a>] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// `(template, scale)` index pairs in template-major order.
    pub(crate) fn jobs(&self) -> Vec<(usize, usize)> {
        (0..self.entries.len())
            .flat_map(|t| (0..self.scales.len()).map(move |s| (t, s)))
            .collect()
    }
}
