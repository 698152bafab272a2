//! Prepared templates and the template set they belong to.
//!
//! A [`TemplateImage`] is built once from a decoded image and never changes
//! afterwards. Templates are grouped project -> class -> templates in a
//! [`TemplateSet`] that callers own and share read-only across queries.

use crate::geometry::BBox;
use crate::util::math::round_i32;
use crate::util::{GlyphError, GlyphResult};
use image::GrayImage;
use std::collections::BTreeMap;

mod plan;
mod prepare;
pub mod rotate;

pub use plan::{CcorrPlan, MaskedTemplatePlan, TemplatePlan, ZnccPlan};
pub use prepare::{prepare_template, PrepareConfig, TemplateSetBuilder};
pub use rotate::QuarterTurn;

/// Identity of a template within a template set.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TemplateId {
    pub project: String,
    pub class_name: String,
    pub name: String,
}

impl TemplateId {
    pub fn new(
        project: impl Into<String>,
        class_name: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            project: project.into(),
            class_name: class_name.into(),
            name: name.into(),
        }
    }
}

/// Derived pixel maps of a template, all cropped to its tight bbox.
#[derive(Clone, Debug)]
pub struct TemplateMaps {
    pub gray: GrayImage,
    pub mask: GrayImage,
    pub edge: GrayImage,
    pub binary: GrayImage,
}

/// Rotated copy of a template used by line-art matching.
#[derive(Clone, Debug)]
pub struct TemplateVariant {
    pub rotation: QuarterTurn,
    pub gray: GrayImage,
    pub edge: GrayImage,
    pub mask: GrayImage,
    /// L2-normalized orientation histogram (or all zeros).
    pub histogram: Vec<f32>,
    /// Tight bbox in the rotated canvas.
    pub tight_bbox: BBox,
    /// Rotated canvas, anchored at the origin.
    pub outer_bbox: BBox,
}

impl TemplateVariant {
    /// Outer bbox placed in image space for a tight match at `(x, y)`.
    pub fn project_outer(&self, x: i32, y: i32, scale: f32) -> BBox {
        project_outer(self.tight_bbox, self.outer_bbox, x, y, scale)
    }
}

/// Places the outer canvas relative to a tight match at `(x, y)`, scaling
/// the tight-to-outer offset and the canvas size by `scale`.
pub fn project_outer(tight: BBox, outer: BBox, x: i32, y: i32, scale: f32) -> BBox {
    let dx = (tight.x - outer.x) as f32 * scale;
    let dy = (tight.y - outer.y) as f32 * scale;
    BBox::new(
        round_i32(x as f32 - dx),
        round_i32(y as f32 - dy),
        round_i32(outer.w as f32 * scale),
        round_i32(outer.h as f32 * scale),
    )
}

/// One prepared template.
#[derive(Clone, Debug)]
pub struct TemplateImage {
    id: TemplateId,
    maps: TemplateMaps,
    tight_bbox: BBox,
    outer_bbox: BBox,
    variants: Vec<TemplateVariant>,
}

impl TemplateImage {
    /// Assembles a template from already derived maps.
    ///
    /// All maps must share one shape, the tight bbox must have that shape and
    /// lie inside the outer bbox.
    pub fn from_maps(
        id: TemplateId,
        maps: TemplateMaps,
        tight_bbox: BBox,
        outer_bbox: BBox,
        variants: Vec<TemplateVariant>,
    ) -> GlyphResult<Self> {
        let dims = maps.gray.dimensions();
        if dims.0 == 0 || dims.1 == 0 {
            return Err(GlyphError::InvalidDimensions {
                width: dims.0 as usize,
                height: dims.1 as usize,
            });
        }
        if maps.mask.dimensions() != dims
            || maps.edge.dimensions() != dims
            || maps.binary.dimensions() != dims
        {
            return Err(GlyphError::InvalidInput("template maps differ in shape"));
        }
        if (tight_bbox.w, tight_bbox.h) != (dims.0 as i32, dims.1 as i32) {
            return Err(GlyphError::InvalidInput("tight bbox does not match map shape"));
        }
        let inside = tight_bbox.x >= outer_bbox.x
            && tight_bbox.y >= outer_bbox.y
            && tight_bbox.right() <= outer_bbox.right()
            && tight_bbox.bottom() <= outer_bbox.bottom();
        if !inside {
            return Err(GlyphError::InvalidInput("tight bbox outside outer bbox"));
        }
        Ok(Self {
            id,
            maps,
            tight_bbox,
            outer_bbox,
            variants,
        })
    }

    pub fn id(&self) -> &TemplateId {
        &self.id
    }

    pub fn class_name(&self) -> &str {
        &self.id.class_name
    }

    pub fn name(&self) -> &str {
        &self.id.name
    }

    pub fn gray(&self) -> &GrayImage {
        &self.maps.gray
    }

    pub fn mask(&self) -> &GrayImage {
        &self.maps.mask
    }

    pub fn edge(&self) -> &GrayImage {
        &self.maps.edge
    }

    pub fn binary(&self) -> &GrayImage {
        &self.maps.binary
    }

    /// Ink extent inside the original canvas.
    pub fn tight_bbox(&self) -> BBox {
        self.tight_bbox
    }

    /// Full original canvas.
    pub fn outer_bbox(&self) -> BBox {
        self.outer_bbox
    }

    pub fn variants(&self) -> &[TemplateVariant] {
        &self.variants
    }

    /// Outer bbox placed in image space for a tight match at `(x, y)`.
    pub fn project_outer(&self, x: i32, y: i32, scale: f32) -> BBox {
        project_outer(self.tight_bbox, self.outer_bbox, x, y, scale)
    }

    /// Tight bbox size at `scale`, at least 1x1.
    pub fn scaled_tight_size(&self, scale: f32) -> (i32, i32) {
        (
            round_i32(self.tight_bbox.w as f32 * scale).max(1),
            round_i32(self.tight_bbox.h as f32 * scale).max(1),
        )
    }
}

/// Templates of one project, keyed by class name.
pub type ClassTemplates = BTreeMap<String, Vec<TemplateImage>>;

/// Immutable project -> class -> templates collection.
#[derive(Clone, Debug, Default)]
pub struct TemplateSet {
    projects: BTreeMap<String, ClassTemplates>,
}

impl TemplateSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert(&mut self, template: TemplateImage) {
        self.projects
            .entry(template.id.project.clone())
            .or_default()
            .entry(template.id.class_name.clone())
            .or_default()
            .push(template);
    }

    /// Builds a single-project set from prepared templates.
    pub fn from_templates(templates: impl IntoIterator<Item = TemplateImage>) -> Self {
        let mut set = Self::new();
        for template in templates {
            set.insert(template);
        }
        set
    }

    /// Project names in sorted order.
    pub fn projects(&self) -> impl Iterator<Item = &str> {
        self.projects.keys().map(String::as_str)
    }

    pub fn project(&self, name: &str) -> Option<&ClassTemplates> {
        self.projects.get(name)
    }

    /// `(class, template count)` pairs of a project, sorted by class name.
    pub fn class_counts(&self, project: &str) -> Vec<(String, usize)> {
        self.projects
            .get(project)
            .map(|classes| {
                classes
                    .iter()
                    .map(|(name, tpls)| (name.clone(), tpls.len()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// All templates across projects and classes.
    pub fn iter(&self) -> impl Iterator<Item = &TemplateImage> {
        self.projects
            .values()
            .flat_map(|classes| classes.values())
            .flatten()
    }

    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.projects.values().all(|classes| classes.values().all(Vec::is_empty))
    }
}

/// Flattens the templates of one project in class order.
pub(crate) fn flatten_classes(classes: &ClassTemplates) -> Vec<&TemplateImage> {
    classes.values().flatten().collect()
}
