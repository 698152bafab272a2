//! Pixel-level preprocessing shared by templates and query regions.
//!
//! Every map produced here uses `0` for background and a non-zero value for
//! foreground. Query ROIs and templates go through the same functions so
//! their maps are directly comparable.

use crate::image::ImageView;
use crate::util::math::{l2_normalize, wrap_orientation_deg};
use image::imageops::{self, FilterType};
use image::{DynamicImage, GrayImage, Luma};
use imageproc::contrast::otsu_level;
use imageproc::distance_transform::{euclidean_squared_distance_transform, Norm};
use imageproc::edges::canny;
use imageproc::filter::gaussian_blur_f32;
use imageproc::gradients::{horizontal_sobel, vertical_sobel};
use imageproc::morphology::dilate;

/// Pixels strictly darker than this count as ink.
pub const INK_THRESHOLD: u8 = 128;
/// Number of bins in an orientation histogram (10 degrees each).
pub const ORIENTATION_BINS: usize = 18;

/// Sigma equivalent to a 3x3 Gaussian kernel.
const BLUR_SIGMA: f32 = 0.8;
const CANNY_LOW: f32 = 50.0;
const CANNY_HIGH: f32 = 150.0;

/// BT.601 luma of an RGB triple.
pub fn luma(r: u8, g: u8, b: u8) -> u8 {
    let y = 0.299 * f32::from(r) + 0.587 * f32::from(g) + 0.114 * f32::from(b);
    y.round().clamp(0.0, 255.0) as u8
}

/// Grayscale conversion of a decoded image. Transparent pixels are
/// composited over white so background stays bright.
pub fn to_gray(img: &DynamicImage) -> GrayImage {
    if let DynamicImage::ImageLuma8(gray) = img {
        return gray.clone();
    }
    if !img.color().has_alpha() {
        let rgb = img.to_rgb8();
        return GrayImage::from_fn(rgb.width(), rgb.height(), |x, y| {
            let [r, g, b] = rgb.get_pixel(x, y).0;
            Luma([luma(r, g, b)])
        });
    }
    let rgba = img.to_rgba8();
    GrayImage::from_fn(rgba.width(), rgba.height(), |x, y| {
        let [r, g, b, a] = rgba.get_pixel(x, y).0;
        let alpha = f32::from(a) / 255.0;
        let v = f32::from(luma(r, g, b)) * alpha + 255.0 * (1.0 - alpha);
        Luma([v.round().clamp(0.0, 255.0) as u8])
    })
}

/// Light 3x3 Gaussian blur.
pub fn blur(gray: &GrayImage) -> GrayImage {
    if gray.width() == 0 || gray.height() == 0 {
        return gray.clone();
    }
    gaussian_blur_f32(gray, BLUR_SIGMA)
}

/// Blurs, then thresholds at the Otsu level with ink (dark) as foreground.
pub fn binary_inv(gray: &GrayImage) -> GrayImage {
    let blurred = blur(gray);
    let level = otsu_level(&blurred);
    map_pixels(&blurred, |v| if v > level { 0 } else { 255 })
}

/// Blurs, then thresholds at the Otsu level with bright pixels as foreground.
pub fn binary(gray: &GrayImage) -> GrayImage {
    let blurred = blur(gray);
    let level = otsu_level(&blurred);
    map_pixels(&blurred, |v| if v > level { 255 } else { 0 })
}

/// Foreground mask from an Otsu threshold of the raw grayscale (no blur).
pub fn otsu_mask(gray: &GrayImage) -> GrayImage {
    let level = otsu_level(gray);
    map_pixels(gray, |v| if v > level { 0 } else { 255 })
}

/// Fixed threshold: pixels darker than [`INK_THRESHOLD`] become foreground.
pub fn ink_map(gray: &GrayImage) -> GrayImage {
    map_pixels(gray, |v| if v < INK_THRESHOLD { 255 } else { 0 })
}

/// Ink map of `gray`, restricted to `mask` when the shapes agree.
pub fn binary_map(gray: &GrayImage, mask: Option<&GrayImage>) -> GrayImage {
    let bin = binary_inv(gray);
    match mask {
        Some(mask) if same_shape(&bin, mask) => and_maps(&bin, mask),
        _ => bin,
    }
}

/// Edge map derived from the binary map: blur, Canny, 3x3 dilation, then
/// restricted to `mask` when the shapes agree.
pub fn edge_map(gray: &GrayImage, mask: Option<&GrayImage>) -> GrayImage {
    let bin = binary_map(gray, mask);
    let edges = canny(&blur(&bin), CANNY_LOW, CANNY_HIGH);
    let edges = dilate(&edges, Norm::LInf, 1);
    match mask {
        Some(mask) if same_shape(&edges, mask) => and_maps(&edges, mask),
        _ => edges,
    }
}

pub fn same_shape(a: &GrayImage, b: &GrayImage) -> bool {
    a.dimensions() == b.dimensions()
}

/// Pixel-wise AND of two equally sized maps.
pub fn and_maps(a: &GrayImage, b: &GrayImage) -> GrayImage {
    GrayImage::from_fn(a.width(), a.height(), |x, y| {
        let on = a.get_pixel(x, y)[0] != 0 && b.get_pixel(x, y)[0] != 0;
        Luma([if on { 255 } else { 0 }])
    })
}

fn map_pixels(gray: &GrayImage, f: impl Fn(u8) -> u8) -> GrayImage {
    let data = gray.as_raw().iter().map(|&v| f(v)).collect();
    GrayImage::from_raw(gray.width(), gray.height(), data).unwrap_or_else(|| gray.clone())
}

pub fn count_nonzero(img: &GrayImage) -> usize {
    img.as_raw().iter().filter(|&&v| v != 0).count()
}

/// Bounding box `(x, y, w, h)` of pixels satisfying `pred`.
pub fn bbox_where(img: &GrayImage, pred: impl Fn(u8) -> bool) -> Option<(u32, u32, u32, u32)> {
    let (mut x0, mut y0) = (u32::MAX, u32::MAX);
    let (mut x1, mut y1) = (0u32, 0u32);
    let mut any = false;
    for (x, y, px) in img.enumerate_pixels() {
        if pred(px[0]) {
            any = true;
            x0 = x0.min(x);
            y0 = y0.min(y);
            x1 = x1.max(x);
            y1 = y1.max(y);
        }
    }
    any.then(|| (x0, y0, x1 - x0 + 1, y1 - y0 + 1))
}

/// Copies a window out of `img`; `None` when the window is empty.
pub fn crop(img: &GrayImage, x: u32, y: u32, w: u32, h: u32) -> Option<GrayImage> {
    if w == 0 || h == 0 || x >= img.width() || y >= img.height() {
        return None;
    }
    let w = w.min(img.width() - x);
    let h = h.min(img.height() - y);
    Some(imageops::crop_imm(img, x, y, w, h).to_image())
}

/// Area-style resize by `scale` with rounded target size (at least 1x1).
pub fn resize_scaled(img: &GrayImage, scale: f32) -> GrayImage {
    let (w, h) = scaled_size(img, scale, f32::round_ties_even);
    if (w, h) == img.dimensions() {
        return img.clone();
    }
    imageops::resize(img, w, h, FilterType::Triangle)
}

/// Nearest-neighbour resize by `scale` with rounded target size.
pub fn resize_mask(img: &GrayImage, scale: f32) -> GrayImage {
    let (w, h) = scaled_size(img, scale, f32::round_ties_even);
    if (w, h) == img.dimensions() {
        return img.clone();
    }
    imageops::resize(img, w, h, FilterType::Nearest)
}

/// Nearest-neighbour resize by `scale` with truncated target size.
pub fn resize_nearest_trunc(img: &GrayImage, scale: f32) -> GrayImage {
    let (w, h) = scaled_size(img, scale, f32::trunc);
    if (w, h) == img.dimensions() {
        return img.clone();
    }
    imageops::resize(img, w, h, FilterType::Nearest)
}

fn scaled_size(img: &GrayImage, scale: f32, snap: fn(f32) -> f32) -> (u32, u32) {
    let w = snap(img.width() as f32 * scale).max(1.0) as u32;
    let h = snap(img.height() as f32 * scale).max(1.0) as u32;
    (w, h)
}

/// Fraction of template foreground pixels whose counterpart in `patch` is
/// also foreground. Zero for an empty template or a shape mismatch.
pub fn shape_ratio(template: ImageView<'_, u8>, patch: ImageView<'_, u8>) -> f32 {
    if template.width() != patch.width() || template.height() != patch.height() {
        return 0.0;
    }
    let mut total = 0usize;
    let mut hit = 0usize;
    for y in 0..template.height() {
        let (Some(t_row), Some(p_row)) = (template.row(y), patch.row(y)) else {
            return 0.0;
        };
        for (&t, &p) in t_row.iter().zip(p_row) {
            if t != 0 {
                total += 1;
                if p != 0 {
                    hit += 1;
                }
            }
        }
    }
    if total == 0 {
        0.0
    } else {
        hit as f32 / total as f32
    }
}

/// Euclidean distance from each pixel to the nearest non-zero pixel of
/// `edges`, row-major. Zero at edge pixels.
pub fn distance_field(edges: &GrayImage) -> Vec<f32> {
    euclidean_squared_distance_transform(edges)
        .as_raw()
        .iter()
        .map(|&d2| d2.sqrt() as f32)
        .collect()
}

/// Sobel gradients of a grayscale image.
pub struct Gradients {
    width: usize,
    height: usize,
    gx: Vec<f32>,
    gy: Vec<f32>,
}

impl Gradients {
    pub fn sobel(gray: &GrayImage) -> Self {
        let gx = horizontal_sobel(gray);
        let gy = vertical_sobel(gray);
        Self {
            width: gray.width() as usize,
            height: gray.height() as usize,
            gx: gx.as_raw().iter().map(|&v| f32::from(v)).collect(),
            gy: gy.as_raw().iter().map(|&v| f32::from(v)).collect(),
        }
    }

    /// Magnitude-weighted orientation histogram over the window
    /// `(x, y, w, h)`, restricted to non-zero pixels of `edges`.
    ///
    /// Orientations are taken modulo 180 degrees and the result is
    /// L2-normalized; the zero vector is returned when no pixel qualifies or
    /// `edges` does not share the gradient shape.
    pub fn orientation_histogram(
        &self,
        edges: &GrayImage,
        window: (usize, usize, usize, usize),
    ) -> Vec<f32> {
        let mut hist = vec![0.0f32; ORIENTATION_BINS];
        if edges.width() as usize != self.width || edges.height() as usize != self.height {
            return hist;
        }
        let (x0, y0, w, h) = window;
        let x1 = (x0 + w).min(self.width);
        let y1 = (y0 + h).min(self.height);
        let edge_data = edges.as_raw();
        let bin_width = 180.0 / ORIENTATION_BINS as f32;
        for y in y0..y1 {
            for x in x0..x1 {
                let idx = y * self.width + x;
                if edge_data[idx] == 0 {
                    continue;
                }
                let (gx, gy) = (self.gx[idx], self.gy[idx]);
                let magnitude = (gx * gx + gy * gy).sqrt();
                if magnitude <= 0.0 {
                    continue;
                }
                let angle = wrap_orientation_deg(gy.atan2(gx).to_degrees());
                let bin = ((angle / bin_width) as usize).min(ORIENTATION_BINS - 1);
                hist[bin] += magnitude;
            }
        }
        l2_normalize(&mut hist);
        hist
    }

    /// Histogram over the whole image.
    pub fn full_histogram(&self, edges: &GrayImage) -> Vec<f32> {
        self.orientation_histogram(edges, (0, 0, self.width, self.height))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square_outline(size: u32, margin: u32) -> GrayImage {
        GrayImage::from_fn(size, size, |x, y| {
            let inside = x >= margin && y >= margin && x < size - margin && y < size - margin;
            let border = inside
                && (x == margin || y == margin || x == size - margin - 1 || y == size - margin - 1);
            Luma([if border { 0 } else { 255 }])
        })
    }

    #[test]
    fn to_gray_composites_transparency_over_white() {
        let mut rgba = image::RgbaImage::new(2, 1);
        rgba.put_pixel(0, 0, image::Rgba([0, 0, 0, 0]));
        rgba.put_pixel(1, 0, image::Rgba([0, 0, 0, 255]));
        let gray = to_gray(&DynamicImage::ImageRgba8(rgba));
        assert_eq!(gray.as_raw(), &vec![255, 0]);
    }

    #[test]
    fn ink_map_marks_dark_pixels() {
        let img = GrayImage::from_raw(3, 1, vec![0, 127, 128]).unwrap();
        let map = ink_map(&img);
        assert_eq!(map.as_raw(), &vec![255, 255, 0]);
    }

    #[test]
    fn bbox_where_finds_ink_extent() {
        let img = square_outline(20, 4);
        let bbox = bbox_where(&img, |v| v < INK_THRESHOLD).unwrap();
        assert_eq!(bbox, (4, 4, 12, 12));
        assert!(bbox_where(&GrayImage::new(4, 4), |v| v > 0).is_none());
    }

    #[test]
    fn edge_map_fires_on_outline() {
        let img = square_outline(24, 5);
        let edges = edge_map(&img, None);
        assert_eq!(edges.dimensions(), img.dimensions());
        assert!(count_nonzero(&edges) > 0);
        // Far corner stays quiet.
        assert_eq!(edges.get_pixel(0, 0)[0], 0);
    }

    #[test]
    fn shape_ratio_counts_overlap() {
        let tpl = [255u8, 255, 0, 0];
        let patch = [255u8, 0, 255, 0];
        let t = ImageView::from_slice(&tpl, 2, 2).unwrap();
        let p = ImageView::from_slice(&patch, 2, 2).unwrap();
        assert!((shape_ratio(t, p) - 0.5).abs() < 1e-6);

        let empty = [0u8; 4];
        let e = ImageView::from_slice(&empty, 2, 2).unwrap();
        assert_eq!(shape_ratio(e, p), 0.0);
    }

    #[test]
    fn distance_field_is_zero_on_edges() {
        let mut edges = GrayImage::new(5, 1);
        edges.put_pixel(0, 0, Luma([255]));
        let field = distance_field(&edges);
        assert_eq!(field[0], 0.0);
        assert!((field[3] - 3.0).abs() < 1e-4);
    }

    #[test]
    fn histogram_is_unit_or_zero() {
        let img = square_outline(24, 5);
        let edges = edge_map(&img, None);
        let hist = Gradients::sobel(&img).full_histogram(&edges);
        let norm: f32 = hist.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4);

        let blank = GrayImage::from_pixel(8, 8, Luma([255]));
        let hist = Gradients::sobel(&blank).full_histogram(&GrayImage::new(8, 8));
        assert!(hist.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn histogram_shape_mismatch_is_zero() {
        let img = square_outline(16, 3);
        let hist = Gradients::sobel(&img).full_histogram(&GrayImage::new(4, 4));
        assert_eq!(hist.len(), ORIENTATION_BINS);
        assert!(hist.iter().all(|&v| v == 0.0));
    }
}
