//! Numeric helpers shared by matching and scoring.

/// Returns `steps` evenly spaced scale factors over `[min, max]`.
///
/// A single unscaled pass (`[1.0]`) is returned when `steps <= 1`.
/// Non-positive factors are dropped.
pub(crate) fn scale_sweep(min: f32, max: f32, steps: usize) -> Vec<f32> {
    if steps <= 1 {
        return vec![1.0];
    }
    linspace(min, max, steps)
        .into_iter()
        .filter(|&s| s > 0.0)
        .collect()
}

/// Evenly spaced samples including both endpoints.
pub(crate) fn linspace(min: f32, max: f32, steps: usize) -> Vec<f32> {
    match steps {
        0 => Vec::new(),
        1 => vec![min],
        _ => {
            let last = (steps - 1) as f32;
            (0..steps)
                .map(|i| min + (max - min) * i as f32 / last)
                .collect()
        }
    }
}

pub(crate) fn mean(values: &[f32]) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f32>() / values.len() as f32
}

/// Population standard deviation.
pub(crate) fn std_dev(values: &[f32]) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    let m = mean(values);
    let var = values.iter().map(|v| (v - m) * (v - m)).sum::<f32>() / values.len() as f32;
    var.sqrt()
}

/// Median with the two middle samples averaged for even lengths.
pub(crate) fn median(values: &[f32]) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f32::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) * 0.5
    } else {
        sorted[mid]
    }
}

/// Regularity in `(0, 1]`: `exp(-std / mean)`, with a non-positive mean
/// replaced by 1.0.
pub(crate) fn regularity(values: &[f32]) -> f32 {
    let m = mean(values);
    let m = if m > 0.0 { m } else { 1.0 };
    (-std_dev(values) / m).exp()
}

/// Wraps an orientation in degrees to `[0, 180)`.
pub(crate) fn wrap_orientation_deg(angle_deg: f32) -> f32 {
    let wrapped = angle_deg.rem_euclid(180.0);
    if wrapped >= 180.0 {
        0.0
    } else {
        wrapped
    }
}

/// Scales `values` to unit L2 norm in place; leaves an all-zero vector alone.
pub(crate) fn l2_normalize(values: &mut [f32]) {
    let norm = values.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        for v in values.iter_mut() {
            *v /= norm;
        }
    } else {
        values.iter_mut().for_each(|v| *v = 0.0);
    }
}

/// Cosine similarity; 0 on length mismatch or degenerate vectors.
pub(crate) fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na = a.iter().map(|v| v * v).sum::<f32>().sqrt();
    let nb = b.iter().map(|v| v * v).sum::<f32>().sqrt();
    if na <= f32::EPSILON || nb <= f32::EPSILON {
        return 0.0;
    }
    dot / (na * nb)
}

/// Rounds half to even, matching how pixel coordinates are snapped elsewhere.
pub(crate) fn round_i32(value: f32) -> i32 {
    value.round_ties_even() as i32
}
