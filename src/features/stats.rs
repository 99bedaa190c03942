//! Summary statistics

/// Standard deviations below this are treated as zero by callers dividing by them
pub const STDDEV_FLOOR: f64 = 1e-4;

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample standard deviation (n - 1 denominator)
///
/// Returns 0 for fewer than two values and for constant input.
pub fn stddev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    let variance =
        values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    let sd = variance.sqrt();
    if sd.is_finite() {
        sd
    } else {
        0.0
    }
}
