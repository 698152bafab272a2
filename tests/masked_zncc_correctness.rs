use glyphmatch::kernel::scalar::{CcorrScalar, ZnccMaskedScalar, ZnccScalar};
use glyphmatch::template::{CcorrPlan, MaskedTemplatePlan, ZnccPlan};
use glyphmatch::{ImageView, Kernel, ScanParams};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn brute_force_best(image: ImageView<'_, u8>, tpl: &MaskedTemplatePlan) -> (usize, usize, f64) {
    let tpl_w = tpl.width();
    let tpl_h = tpl.height();
    let sum_w = tpl.sum_w() as f64;
    let var_t = tpl.var_t() as f64;
    let t_prime = tpl.t_prime();
    let mask = tpl.mask();

    let mut best = (0usize, 0usize, f64::NEG_INFINITY);
    for y in 0..=(image.height() - tpl_h) {
        for x in 0..=(image.width() - tpl_w) {
            let mut dot = 0.0f64;
            let mut sum_i = 0.0f64;
            let mut sum_i2 = 0.0f64;
            for ty in 0..tpl_h {
                let row = image.row(y + ty).expect("row in bounds");
                for tx in 0..tpl_w {
                    let idx = ty * tpl_w + tx;
                    if mask[idx] == 0 {
                        continue;
                    }
                    let value = row[x + tx] as f64;
                    dot += t_prime[idx] as f64 * value;
                    sum_i += value;
                    sum_i2 += value * value;
                }
            }
            let var_i = sum_i2 - (sum_i * sum_i) / sum_w;
            if var_i <= 1e-12 {
                continue;
            }
            let score = dot / (var_t * var_i).sqrt();
            if score > best.2 {
                best = (x, y, score);
            }
        }
    }
    best
}

fn random_image(rng: &mut StdRng, width: usize, height: usize) -> Vec<u8> {
    (0..width * height).map(|_| rng.random_range(0..=255)).collect()
}

fn cut(image: &[u8], width: usize, x0: usize, y0: usize, w: usize, h: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(w * h);
    for y in 0..h {
        let start = (y0 + y) * width + x0;
        out.extend_from_slice(&image[start..start + w]);
    }
    out
}

#[test]
fn masked_zncc_finds_exact_copy() {
    let mut rng = StdRng::seed_from_u64(123);
    let (width, height) = (32, 32);
    let image = random_image(&mut rng, width, height);

    let (tpl_w, tpl_h, x0, y0) = (11, 9, 7, 9);
    let tpl = cut(&image, width, x0, y0, tpl_w, tpl_h);
    let mask: Vec<u8> = (0..tpl_w * tpl_h)
        .map(|i| if (i / tpl_w + i % tpl_w) % 3 == 0 { 0 } else { 255 })
        .collect();

    let plan = MaskedTemplatePlan::from_view(
        ImageView::from_slice(&tpl, tpl_w, tpl_h).unwrap(),
        ImageView::from_slice(&mask, tpl_w, tpl_h).unwrap(),
    )
    .unwrap();
    let image_view = ImageView::from_slice(&image, width, height).unwrap();
    let peaks = ZnccMaskedScalar::scan_full(
        image_view,
        &plan,
        ScanParams {
            topk: 5,
            ..ScanParams::default()
        },
    )
    .unwrap();
    let best = peaks.first().expect("at least one peak");
    assert_eq!((best.x, best.y), (x0, y0));
    assert!(best.score > 0.99);
    assert!(peaks.windows(2).all(|w| w[0].score >= w[1].score));
}

#[test]
fn masked_zncc_matches_bruteforce_with_random_mask() {
    let mut rng = StdRng::seed_from_u64(7);
    let (width, height) = (24, 20);
    let image = random_image(&mut rng, width, height);
    let (tpl_w, tpl_h) = (6, 5);
    let tpl = random_image(&mut rng, tpl_w, tpl_h);
    let mut mask: Vec<u8> = (0..tpl_w * tpl_h)
        .map(|_| if rng.random_bool(0.7) { 255 } else { 0 })
        .collect();
    mask[0] = 255;
    mask[1] = 255;

    let plan = MaskedTemplatePlan::from_view(
        ImageView::from_slice(&tpl, tpl_w, tpl_h).unwrap(),
        ImageView::from_slice(&mask, tpl_w, tpl_h).unwrap(),
    )
    .unwrap();
    let image_view = ImageView::from_slice(&image, width, height).unwrap();
    let (bx, by, bscore) = brute_force_best(image_view, &plan);
    let best = ZnccMaskedScalar::scan_full(image_view, &plan, ScanParams::default())
        .unwrap()
        .pop()
        .unwrap();
    assert_eq!((best.x, best.y), (bx, by));
    assert!((best.score as f64 - bscore).abs() < 1e-4);
}

#[test]
fn dispatching_kernel_agrees_with_masked_kernel() {
    let mut rng = StdRng::seed_from_u64(42);
    let (width, height) = (10, 10);
    let image = random_image(&mut rng, width, height);
    let tpl = cut(&image, width, 2, 4, 4, 3);
    let mask = vec![255u8; 12];

    let tpl_view = ImageView::from_slice(&tpl, 4, 3).unwrap();
    let mask_view = ImageView::from_slice(&mask, 4, 3).unwrap();
    let plan = ZnccPlan::build(tpl_view, Some(mask_view)).unwrap();
    assert!(plan.is_masked());
    let masked = MaskedTemplatePlan::from_view(tpl_view, mask_view).unwrap();

    let image_view = ImageView::from_slice(&image, width, height).unwrap();
    let a = ZnccScalar::scan_full(image_view, &plan, ScanParams::default()).unwrap();
    let b = ZnccMaskedScalar::scan_full(image_view, &masked, ScanParams::default()).unwrap();
    assert_eq!(a, b);
    assert_eq!((a[0].x, a[0].y), (2, 4));
}

#[test]
fn ccorr_threshold_scan_matches_bruteforce() {
    let (width, height) = (16, 12);
    let image: Vec<u8> = (0..width * height)
        .map(|i| if (i * 7) % 5 < 2 { 255 } else { 0 })
        .collect();
    let tpl = cut(&image, width, 3, 2, 5, 4);
    let plan = CcorrPlan::from_view(ImageView::from_slice(&tpl, 5, 4).unwrap()).unwrap();
    let image_view = ImageView::from_slice(&image, width, height).unwrap();
    let threshold = 0.8f32;

    let peaks = CcorrScalar::scan_above(
        image_view,
        &plan,
        ScanParams {
            min_score: threshold,
            ..ScanParams::default()
        },
    )
    .unwrap();

    let mut expected = Vec::new();
    for y in 0..=(height - 4) {
        for x in 0..=(width - 5) {
            let mut dot = 0.0f64;
            let mut sum_i2 = 0.0f64;
            let mut sum_t2 = 0.0f64;
            for ty in 0..4 {
                for tx in 0..5 {
                    let i = image[(y + ty) * width + x + tx] as f64;
                    let t = tpl[ty * 5 + tx] as f64;
                    dot += i * t;
                    sum_i2 += i * i;
                    sum_t2 += t * t;
                }
            }
            if sum_i2 <= 0.0 {
                continue;
            }
            let score = dot / (sum_i2 * sum_t2).sqrt();
            if score >= threshold as f64 + 1e-5 {
                expected.push((x, y));
            }
        }
    }
    let found: Vec<(usize, usize)> = peaks.iter().map(|p| (p.x, p.y)).collect();
    for pos in &expected {
        assert!(found.contains(pos), "missing placement {pos:?}");
    }
    assert!(found.contains(&(3, 2)));
}
