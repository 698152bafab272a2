use glyphmatch::kernel::scalar::{CcorrScalar, ZnccScalar};
use glyphmatch::template::{CcorrPlan, ZnccPlan};
use glyphmatch::{
    detect_exhaustive, prepare_template, ExhaustiveConfig, ImageView, Kernel, MatchConfig,
    Matcher, PrepareConfig, ScanParams, TemplateId,
};
use criterion::{criterion_group, criterion_main, Criterion};
use image::{imageops, DynamicImage, GrayImage, Luma};
use std::hint::black_box;

fn make_image(width: u32, height: u32) -> GrayImage {
    GrayImage::from_fn(width, height, |x, y| {
        Luma([(((x * 13) ^ (y * 7) ^ (x * y)) & 0xFF) as u8])
    })
}

/// Outlined square with an inner bar, dark ink on white.
fn symbol(size: u32) -> GrayImage {
    GrayImage::from_fn(size + 8, size + 8, |x, y| {
        let inside = (4..size + 4).contains(&x) && (4..size + 4).contains(&y);
        let (lx, ly) = (x.wrapping_sub(4), y.wrapping_sub(4));
        let outline = lx < 4 || ly < 4 || lx >= size - 4 || ly >= size - 4;
        let bar = (size / 3..size / 3 + 4).contains(&ly) && lx < size * 2 / 3;
        Luma([if inside && (outline || bar) { 0 } else { 255 }])
    })
}

fn drawing(width: u32, height: u32, stamp: &GrayImage, step: u32) -> GrayImage {
    let mut img = GrayImage::from_pixel(width, height, Luma([255]));
    let mut y = 10;
    while y + stamp.height() < height {
        let mut x = 10;
        while x + stamp.width() < width {
            imageops::replace(&mut img, stamp, i64::from(x), i64::from(y));
            x += step;
        }
        y += step;
    }
    img
}

fn bench_kernels(c: &mut Criterion) {
    let image = make_image(256, 256);
    let view = ImageView::from_gray(&image).unwrap();
    let patch = imageops::crop_imm(&image, 60, 40, 48, 48).to_image();
    let tpl_view = ImageView::from_gray(&patch).unwrap();

    let unmasked = ZnccPlan::build(tpl_view, None).unwrap();
    c.bench_function("zncc_scan_full_256", |b| {
        b.iter(|| black_box(ZnccScalar::scan_full(view, &unmasked, ScanParams::default()).unwrap()));
    });

    let mask = GrayImage::from_fn(48, 48, |x, y| Luma([if (x + y) % 3 == 0 { 0 } else { 255 }]));
    let masked = ZnccPlan::build(tpl_view, Some(ImageView::from_gray(&mask).unwrap())).unwrap();
    c.bench_function("zncc_masked_scan_full_256", |b| {
        b.iter(|| black_box(ZnccScalar::scan_full(view, &masked, ScanParams::default()).unwrap()));
    });

    let ccorr = CcorrPlan::from_view(tpl_view).unwrap();
    let params = ScanParams {
        min_score: 0.9,
        ..ScanParams::default()
    };
    c.bench_function("ccorr_scan_above_256", |b| {
        b.iter(|| black_box(CcorrScalar::scan_above(view, &ccorr, params).unwrap()));
    });
}

fn bench_point_query(c: &mut Criterion) {
    let stamp = symbol(32);
    let template = prepare_template(
        TemplateId::new("bench", "box", "box_0"),
        &DynamicImage::ImageLuma8(stamp.clone()),
        &PrepareConfig::default(),
    )
    .unwrap();
    let image = drawing(400, 300, &stamp, 90);

    let matcher = Matcher::new([&template]);
    // Build the scale cache outside the timed loop.
    let _ = matcher.prepared();
    c.bench_function("match_point_12_scales", |b| {
        b.iter(|| black_box(matcher.match_point(&image, 30.0, 30.0)));
    });
    c.bench_function("match_point_line_art_12_scales", |b| {
        b.iter(|| black_box(matcher.match_point_line_art(&image, 30.0, 30.0)));
    });

    if cfg!(feature = "rayon") {
        let par = Matcher::new([&template]).with_config(MatchConfig {
            parallel: true,
            ..MatchConfig::default()
        });
        let _ = par.prepared();
        c.bench_function("match_point_12_scales_parallel", |b| {
            b.iter(|| black_box(par.match_point(&image, 30.0, 30.0)));
        });
    }

    let cfg = ExhaustiveConfig {
        scale_min: 0.9,
        scale_max: 1.1,
        scale_steps: 3,
        ..ExhaustiveConfig::default()
    };
    c.bench_function("detect_exhaustive_3_scales", |b| {
        b.iter(|| black_box(detect_exhaustive(&image, [&template], &cfg)));
    });
}

criterion_group!(benches, bench_kernels, bench_point_query);
criterion_main!(benches);
