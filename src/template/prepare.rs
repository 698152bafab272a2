//! Template preprocessing: decoded image in, canonical [`TemplateImage`] out.

use crate::geometry::BBox;
use crate::image::ops::{self, Gradients, INK_THRESHOLD};
use crate::template::{
    QuarterTurn, TemplateId, TemplateImage, TemplateMaps, TemplateSet, TemplateVariant,
};
use crate::trace::{trace_debug, trace_event, trace_span};
use crate::util::{GlyphError, GlyphResult};
use image::{DynamicImage, GrayImage, Luma};

/// Preprocessing options.
#[derive(Clone, Copy, Debug)]
pub struct PrepareConfig {
    /// Build 0/90/180 degree variants with orientation histograms
    /// (needed by line-art matching).
    pub with_variants: bool,
}

impl Default for PrepareConfig {
    fn default() -> Self {
        Self {
            with_variants: true,
        }
    }
}

/// Grayscale signal plus the mask carried by the alpha channel, if any.
struct Source {
    gray: GrayImage,
    alpha_mask: Option<GrayImage>,
}

fn read_source(image: &DynamicImage) -> GlyphResult<Source> {
    if image.width() == 0 || image.height() == 0 {
        return Err(GlyphError::InvalidDimensions {
            width: image.width() as usize,
            height: image.height() as usize,
        });
    }
    if !image.color().has_alpha() {
        return Ok(Source {
            gray: ops::to_gray(image),
            alpha_mask: None,
        });
    }

    let rgba = image.to_rgba8();
    let alpha = GrayImage::from_fn(rgba.width(), rgba.height(), |x, y| {
        Luma([rgba.get_pixel(x, y)[3]])
    });
    let Some((ax, ay, aw, ah)) = ops::bbox_where(&alpha, |a| a > 0) else {
        return Err(GlyphError::DegenerateTemplate {
            reason: "fully transparent",
        });
    };
    let rgba = image::imageops::crop_imm(&rgba, ax, ay, aw, ah).to_image();
    let alpha = ops::crop(&alpha, ax, ay, aw, ah).unwrap_or(alpha);

    let color_empty = rgba.pixels().all(|px| px[0] == 0 && px[1] == 0 && px[2] == 0);
    let gray = if color_empty {
        GrayImage::from_fn(alpha.width(), alpha.height(), |x, y| {
            Luma([255 - alpha.get_pixel(x, y)[0]])
        })
    } else {
        ops::to_gray(&DynamicImage::ImageRgba8(rgba))
    };
    let alpha_mask = GrayImage::from_fn(alpha.width(), alpha.height(), |x, y| {
        Luma([if alpha.get_pixel(x, y)[0] > 0 { 255 } else { 0 }])
    });
    Ok(Source {
        gray,
        alpha_mask: Some(alpha_mask),
    })
}

/// Alpha mask unless it is empty, otherwise an Otsu mask.
fn foreground_mask(source: &Source) -> GrayImage {
    match &source.alpha_mask {
        Some(mask) if ops::count_nonzero(mask) > 0 => mask.clone(),
        _ => ops::otsu_mask(&source.gray),
    }
}

/// Builds the rotated variants of a cropped template.
fn build_variants(
    gray: &GrayImage,
    mask: &GrayImage,
    edge: &GrayImage,
    tight_bbox: BBox,
    outer_bbox: BBox,
) -> Vec<TemplateVariant> {
    QuarterTurn::VARIANTS
        .iter()
        .map(|&rotation| {
            let gray = rotation.apply(gray);
            let mask = rotation.apply(mask);
            let edge = rotation.apply(edge);
            let histogram = Gradients::sobel(&gray).full_histogram(&edge);
            let canvas = rotation.rotate_box(outer_bbox, outer_bbox.w, outer_bbox.h);
            TemplateVariant {
                rotation,
                gray,
                edge,
                mask,
                histogram,
                tight_bbox: rotation.rotate_box(tight_bbox, outer_bbox.w, outer_bbox.h),
                outer_bbox: BBox::new(0, 0, canvas.w, canvas.h),
            }
        })
        .collect()
}

/// Turns a decoded template image into a [`TemplateImage`].
///
/// Images with alpha are first cropped to their opaque extent. The tight
/// bbox covers pixels darker than [`INK_THRESHOLD`] and falls back to the
/// whole canvas when there are none.
pub fn prepare_template(
    id: TemplateId,
    image: &DynamicImage,
    cfg: &PrepareConfig,
) -> GlyphResult<TemplateImage> {
    let _span = trace_span!("prepare_template", class = %id.class_name, name = %id.name).entered();

    let source = read_source(image)?;
    let mask = foreground_mask(&source);
    let (width, height) = source.gray.dimensions();
    let outer_bbox = BBox::new(0, 0, width as i32, height as i32);

    let tight = ops::bbox_where(&source.gray, |v| v < INK_THRESHOLD)
        .filter(|&(_, _, w, h)| w > 0 && h > 0);
    let (gray, mask, tight_bbox) = match tight {
        Some((x, y, w, h)) => match (
            ops::crop(&source.gray, x, y, w, h),
            ops::crop(&mask, x, y, w, h),
        ) {
            (Some(gray), Some(mask)) => (
                gray,
                mask,
                BBox::new(x as i32, y as i32, w as i32, h as i32),
            ),
            _ => (source.gray, mask, outer_bbox),
        },
        None => (source.gray, mask, outer_bbox),
    };

    let binary = ops::binary_map(&gray, Some(&mask));
    let edge = ops::edge_map(&gray, Some(&mask));
    let variants = if cfg.with_variants {
        build_variants(&gray, &mask, &edge, tight_bbox, outer_bbox)
    } else {
        Vec::new()
    };
    trace_debug!(
        "template_prepared",
        width = gray.width(),
        height = gray.height(),
        edge_pixels = ops::count_nonzero(&edge),
    );

    TemplateImage::from_maps(
        id,
        TemplateMaps {
            gray,
            mask,
            edge,
            binary,
        },
        tight_bbox,
        outer_bbox,
        variants,
    )
}

/// Accumulates prepared templates into a [`TemplateSet`].
///
/// Templates that fail to decode or prepare are skipped and counted.
#[derive(Debug, Default)]
pub struct TemplateSetBuilder {
    cfg: PrepareConfig,
    set: TemplateSet,
    skipped: usize,
}

impl TemplateSetBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(mut self, cfg: PrepareConfig) -> Self {
        self.cfg = cfg;
        self
    }

    /// Prepares and adds a decoded image. Returns `false` when it was skipped.
    pub fn add_image(
        &mut self,
        project: &str,
        class_name: &str,
        name: &str,
        image: &DynamicImage,
    ) -> bool {
        match prepare_template(TemplateId::new(project, class_name, name), image, &self.cfg) {
            Ok(template) => {
                self.set.insert(template);
                true
            }
            Err(err) => {
                trace_debug!("template_skipped", reason = err.to_string().as_str());
                self.skipped += 1;
                false
            }
        }
    }

    /// Decodes `bytes` and adds the template; undecodable input is skipped.
    #[cfg(feature = "image-io")]
    pub fn add_encoded(&mut self, project: &str, class_name: &str, name: &str, bytes: &[u8]) -> bool {
        match crate::image::io::decode_image(bytes) {
            Ok(image) => self.add_image(project, class_name, name, &image),
            Err(err) => {
                trace_debug!("template_skipped", reason = err.to_string().as_str());
                self.skipped += 1;
                false
            }
        }
    }

    /// Number of templates skipped so far.
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    pub fn build(self) -> TemplateSet {
        trace_event!(
            "template_set_built",
            templates = self.set.len(),
            skipped = self.skipped
        );
        self.set
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    fn ring_on_white(size: u32, pad: u32) -> GrayImage {
        GrayImage::from_fn(size, size, |x, y| {
            let inside = x >= pad && y >= pad && x < size - pad && y < size - pad;
            let ring = inside
                && (x < pad + 2 || y < pad + 2 || x >= size - pad - 2 || y >= size - pad - 2);
            Luma([if ring { 0 } else { 255 }])
        })
    }

    #[test]
    fn tight_bbox_crops_to_ink() {
        let img = DynamicImage::ImageLuma8(ring_on_white(32, 6));
        let tpl = prepare_template(TemplateId::new("p", "c", "t"), &img, &PrepareConfig::default())
            .unwrap();
        assert_eq!(tpl.tight_bbox(), BBox::new(6, 6, 20, 20));
        assert_eq!(tpl.outer_bbox(), BBox::new(0, 0, 32, 32));
        assert_eq!(tpl.gray().dimensions(), (20, 20));
        assert_eq!(tpl.edge().dimensions(), (20, 20));
        assert_eq!(tpl.binary().dimensions(), (20, 20));
        assert_eq!(tpl.variants().len(), 3);
    }

    #[test]
    fn blank_template_falls_back_to_outer_bbox() {
        let img = DynamicImage::ImageLuma8(GrayImage::from_pixel(10, 8, Luma([255])));
        let tpl = prepare_template(TemplateId::new("p", "c", "t"), &img, &PrepareConfig::default())
            .unwrap();
        assert_eq!(tpl.tight_bbox(), tpl.outer_bbox());
    }

    #[test]
    fn alpha_only_line_art_uses_inverted_alpha() {
        let mut rgba = RgbaImage::from_pixel(20, 20, Rgba([0, 0, 0, 0]));
        for i in 4..16 {
            rgba.put_pixel(i, 10, Rgba([0, 0, 0, 255]));
            rgba.put_pixel(10, i, Rgba([0, 0, 0, 255]));
        }
        let img = DynamicImage::ImageRgba8(rgba);
        let tpl = prepare_template(
            TemplateId::new("p", "c", "plus"),
            &img,
            &PrepareConfig {
                with_variants: false,
            },
        )
        .unwrap();
        // Cropped to the opaque extent first.
        assert_eq!(tpl.outer_bbox(), BBox::new(0, 0, 12, 12));
        assert_eq!(tpl.gray().get_pixel(6, 6)[0], 0);
        assert_eq!(tpl.gray().get_pixel(0, 0)[0], 255);
        assert_eq!(tpl.mask().get_pixel(6, 0)[0], 255);
        assert_eq!(tpl.mask().get_pixel(0, 0)[0], 0);
        assert!(tpl.variants().is_empty());
    }

    #[test]
    fn opaque_alpha_keeps_full_mask() {
        let ring = ring_on_white(20, 4);
        let rgba = RgbaImage::from_fn(20, 20, |x, y| {
            let v = ring.get_pixel(x, y)[0];
            Rgba([v, v, v, 255])
        });
        let tpl = prepare_template(
            TemplateId::new("p", "c", "ring"),
            &DynamicImage::ImageRgba8(rgba),
            &PrepareConfig::default(),
        )
        .unwrap();
        assert_eq!(tpl.outer_bbox(), BBox::new(0, 0, 20, 20));
        assert_eq!(tpl.tight_bbox(), BBox::new(4, 4, 12, 12));
        assert!(tpl.mask().pixels().all(|px| px[0] == 255));
        assert!(tpl.variants().iter().all(|v| v.mask.pixels().all(|px| px[0] == 255)));
    }

    #[test]
    fn translucent_alpha_shapes_the_mask() {
        // Dark ring at alpha 200 on a white alpha-128 card with a transparent hole.
        let rgba = RgbaImage::from_fn(24, 24, |x, y| {
            let card = (4..20).contains(&x) && (4..20).contains(&y);
            let ring = (6..18).contains(&x)
                && (6..18).contains(&y)
                && !((8..16).contains(&x) && (8..16).contains(&y));
            let hole = (10..14).contains(&x) && (10..14).contains(&y);
            if ring {
                Rgba([0, 0, 0, 200])
            } else if card && !hole {
                Rgba([255, 255, 255, 128])
            } else {
                Rgba([255, 255, 255, 0])
            }
        });
        let tpl = prepare_template(
            TemplateId::new("p", "c", "ring"),
            &DynamicImage::ImageRgba8(rgba),
            &PrepareConfig {
                with_variants: false,
            },
        )
        .unwrap();
        // Cropped to the card, then to the ring.
        assert_eq!(tpl.outer_bbox(), BBox::new(0, 0, 16, 16));
        assert_eq!(tpl.tight_bbox(), BBox::new(2, 2, 12, 12));
        let mask = tpl.mask();
        assert_eq!(mask.get_pixel(0, 0)[0], 255);
        assert_eq!(mask.get_pixel(2, 2)[0], 255);
        assert_eq!(mask.get_pixel(4, 4)[0], 0);
        assert!(tpl.gray().get_pixel(0, 0)[0] < INK_THRESHOLD);
        assert!(tpl.gray().get_pixel(2, 2)[0] >= INK_THRESHOLD);
    }

    #[test]
    fn fully_transparent_template_is_rejected() {
        let img = DynamicImage::ImageRgba8(RgbaImage::new(4, 4));
        let err = prepare_template(TemplateId::new("p", "c", "t"), &img, &PrepareConfig::default())
            .unwrap_err();
        assert!(matches!(err, GlyphError::DegenerateTemplate { .. }));
    }

    #[test]
    fn builder_groups_and_counts() {
        let img = DynamicImage::ImageLuma8(ring_on_white(24, 4));
        let mut builder = TemplateSetBuilder::new();
        assert!(builder.add_image("proj", "valve", "a.png", &img));
        assert!(builder.add_image("proj", "valve", "b.png", &img));
        assert!(builder.add_image("proj", "bolt", "c.png", &img));
        assert!(!builder.add_image("proj", "bolt", "empty.png", &DynamicImage::new_luma8(0, 0)));
        assert_eq!(builder.skipped(), 1);
        let set = builder.build();
        assert_eq!(set.len(), 3);
        assert_eq!(
            set.class_counts("proj"),
            vec![("bolt".to_string(), 1), ("valve".to_string(), 2)]
        );
        assert!(set.class_counts("other").is_empty());
    }
}
