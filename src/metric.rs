//! Fixed-dimension vector arithmetic shared by the normalizer, reducer,
//! ranking engine, and publisher.

pub fn dot<const N: usize>(a: &[f32; N], b: &[f32; N]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

pub fn magnitude<const N: usize>(v: &[f32; N]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// Raw cosine in `[-1, 1]`, or `None` when `‖a‖·‖b‖ < epsilon`.
pub fn cosine_similarity<const N: usize>(a: &[f32; N], b: &[f32; N], epsilon: f32) -> Option<f32> {
    let denominator = magnitude(a) * magnitude(b);
    if denominator < epsilon {
        return None;
    }
    Some((dot(a, b) / denominator).clamp(-1.0, 1.0))
}

/// Cosine remapped from `[-1, 1]` to `[0, 1]`; incomparable pairs score 0.
pub fn compatibility<const N: usize>(a: &[f32; N], b: &[f32; N], epsilon: f32) -> f32 {
    match cosine_similarity(a, b, epsilon) {
        Some(cos) => (cos + 1.0) / 2.0,
        None => 0.0,
    }
}

/// Largest per-axis absolute difference.
pub fn max_abs_diff<const N: usize>(a: &[f32; N], b: &[f32; N]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y).abs())
        .fold(0.0, f32::max)
}
