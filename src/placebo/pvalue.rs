//! Add-one empirical p-values against a placebo distribution.

/// One-sided p-value of `stat` against `null`: `(1 + #{x >= stat}) / (1 + n)`.
///
/// Only finite null values count. NaN when `stat` is not finite or no null
/// value is.
pub fn empirical_p_value(stat: f64, null: &[f64]) -> f64 {
    if !stat.is_finite() {
        return f64::NAN;
    }
    let (n, extreme) = null
        .iter()
        .filter(|x| x.is_finite())
        .fold((0usize, 0usize), |(n, k), &x| (n + 1, k + usize::from(x >= stat)));
    if n == 0 {
        return f64::NAN;
    }
    (1 + extreme) as f64 / (1 + n) as f64
}
