#![cfg(feature = "rayon")]

use glyphmatch::{
    detect_exhaustive, prepare_template, ExhaustiveConfig, MatchConfig, Matcher, PrepareConfig,
    TemplateId,
};
use image::{DynamicImage, GrayImage, Luma};

/// Square outline with a bar across its upper half, on a white canvas.
fn symbol(size: u32, pad: u32) -> GrayImage {
    let side = size + 2 * pad;
    GrayImage::from_fn(side, side, |x, y| {
        let inside = x >= pad && y >= pad && x < pad + size && y < pad + size;
        let (lx, ly) = (x.wrapping_sub(pad), y.wrapping_sub(pad));
        let outline = lx < 3 || ly < 3 || lx >= size - 3 || ly >= size - 3;
        let bar = (size / 3..size / 3 + 3).contains(&ly) && lx < size * 2 / 3;
        Luma([if inside && (outline || bar) { 0 } else { 255 }])
    })
}

fn scene(width: u32, height: u32, stamp: &GrayImage, at: &[(u32, u32)]) -> GrayImage {
    let mut img = GrayImage::from_pixel(width, height, Luma([255]));
    for &(x0, y0) in at {
        for (x, y, px) in stamp.enumerate_pixels() {
            img.put_pixel(x0 + x, y0 + y, *px);
        }
    }
    img
}

#[test]
fn parallel_point_match_equals_sequential() {
    let stamp = symbol(24, 3);
    let template = prepare_template(
        TemplateId::new("demo", "box", "box_0"),
        &DynamicImage::ImageLuma8(stamp.clone()),
        &PrepareConfig::default(),
    )
    .unwrap();
    let image = scene(160, 120, &stamp, &[(50, 40)]);

    let base = MatchConfig {
        scale_min: 0.8,
        scale_max: 1.2,
        scale_steps: 5,
        ..MatchConfig::default()
    };
    let seq = Matcher::new([&template]).with_config(MatchConfig {
        parallel: false,
        ..base
    });
    let par = Matcher::new([&template]).with_config(MatchConfig {
        parallel: true,
        ..base
    });

    let a = seq.match_point(&image, 65.0, 55.0);
    let b = par.match_point(&image, 65.0, 55.0);
    assert!(!a.is_empty());
    assert_eq!(a, b);

    let a = seq.match_point_line_art(&image, 65.0, 55.0);
    let b = par.match_point_line_art(&image, 65.0, 55.0);
    assert_eq!(a, b);
}

#[test]
fn parallel_exhaustive_detection_equals_sequential() {
    let stamp = symbol(20, 2);
    let template = prepare_template(
        TemplateId::new("demo", "box", "box_0"),
        &DynamicImage::ImageLuma8(stamp.clone()),
        &PrepareConfig::default(),
    )
    .unwrap();
    let image = scene(120, 90, &stamp, &[(10, 10), (70, 40)]);

    let base = ExhaustiveConfig {
        scale_min: 0.9,
        scale_max: 1.1,
        scale_steps: 3,
        ..ExhaustiveConfig::default()
    };
    let seq = detect_exhaustive(&image, [&template], &ExhaustiveConfig {
        parallel: false,
        ..base
    });
    let par = detect_exhaustive(&image, [&template], &ExhaustiveConfig {
        parallel: true,
        ..base
    });
    assert!(!seq.confirmed.is_empty());
    assert_eq!(seq, par);
}
