//! Small statistics helpers over slices that may contain NaN.

/// Population standard deviation (`ddof = 0`). NaN for an empty slice.
pub fn population_std(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n;
    var.sqrt()
}

/// Root-mean-square and arithmetic mean of the finite values, with their count.
///
/// Returns `(NaN, NaN, 0)` when no value is finite.
pub fn finite_rms_and_mean(values: impl IntoIterator<Item = f64>) -> (f64, f64, usize) {
    let mut n = 0usize;
    let mut sum = 0.0;
    let mut sum_sq = 0.0;
    for v in values.into_iter().filter(|v| v.is_finite()) {
        n += 1;
        sum += v;
        sum_sq += v * v;
    }
    if n == 0 {
        return (f64::NAN, f64::NAN, 0);
    }
    let nf = n as f64;
    ((sum_sq / nf).sqrt(), sum / nf, n)
}
