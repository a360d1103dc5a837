//! Per-channel score standardization.
//!
//! Lexical BM25 scores are unbounded and vector similarities live in
//! `[-1, 1]`; blending them directly would let one channel swamp the other.
//! Each channel is z-scored over the candidate set before fusion:
//!
//! ```text
//! z(x) = (x - mean) / (population_std + EPSILON)
//! ```
//!
//! The epsilon keeps a constant channel (or a single candidate) from
//! dividing by zero; such a channel standardizes to all zeros.

/// Added to the standard deviation before dividing.
pub const EPSILON: f64 = 1e-9;

/// Arithmetic mean, `0.0` for an empty slice.
#[must_use]
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population standard deviation (no Bessel correction), `0.0` for an
/// empty slice.
#[must_use]
pub fn population_std(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let m = mean(values);
    let variance = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

/// Z-score `values` against their own mean and population standard
/// deviation.
#[must_use]
pub fn z_normalize(values: &[f64]) -> Vec<f64> {
    let m = mean(values);
    let denom = population_std(values) + EPSILON;
    values.iter().map(|v| (v - m) / denom).collect()
}
