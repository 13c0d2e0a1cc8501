//! Euclidean projection onto the unit simplex.
//!
//! ```text
//! proj(v) = argmin_w ||w - v||²  s.t.  w >= 0, Σ w = 1
//! ```
//!
//! Sort-based algorithm (Held et al.; Duchi et al. 2008): find the threshold `θ`
//! such that `w_i = max(v_i - θ, 0)` sums to one. `O(J log J)`.

use nalgebra::DVector;

/// Project `v` onto the unit simplex.
///
/// Non-finite inputs produce non-finite outputs; callers check finiteness.
pub fn project_simplex(v: &DVector<f64>) -> DVector<f64> {
    let n = v.len();
    if n == 0 {
        return v.clone();
    }

    let mut u: Vec<f64> = v.iter().copied().collect();
    u.sort_by(|a, b| b.partial_cmp(a).unwrap_or(std::cmp::Ordering::Equal));

    let mut css = 0.0;
    let mut rho = 0usize;
    let mut css_rho = u[0];
    for (i, &ui) in u.iter().enumerate() {
        css += ui;
        if ui - (css - 1.0) / ((i + 1) as f64) > 0.0 {
            rho = i;
            css_rho = css;
        }
    }
    let theta = (css_rho - 1.0) / ((rho + 1) as f64);

    v.map(|vi| (vi - theta).max(0.0))
}

/// Clip negative entries to zero and rescale to sum to one.
///
/// Returns `None` when the clipped sum is not strictly positive (or not finite).
pub fn clip_and_renormalize(w: &DVector<f64>) -> Option<DVector<f64>> {
    let clipped = w.map(|x| if x < 0.0 { 0.0 } else { x });
    let sum = clipped.sum();
    if !(sum.is_finite() && sum > 0.0) {
        return None;
    }
    Some(clipped / sum)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn projection_of_interior_point_is_identity() {
        let v = DVector::from_vec(vec![0.2, 0.3, 0.5]);
        let w = project_simplex(&v);
        for (a, b) in w.iter().zip(v.iter()) {
            assert_abs_diff_eq!(*a, *b, epsilon = 1e-15);
        }
    }

    #[test]
    fn projection_lands_on_simplex() {
        let v = DVector::from_vec(vec![3.0, -1.0, 0.5, 2.9]);
        let w = project_simplex(&v);
        assert!(w.iter().all(|&x| x >= 0.0));
        assert_abs_diff_eq!(w.sum(), 1.0, epsilon = 1e-12);
        // Only the two largest coordinates survive: θ = (3.0 + 2.9 - 1) / 2.
        assert_abs_diff_eq!(w[0], 0.55, epsilon = 1e-12);
        assert_abs_diff_eq!(w[3], 0.45, epsilon = 1e-12);
        assert_eq!(w[1], 0.0);
        assert_eq!(w[2], 0.0);
    }

    #[test]
    fn projection_of_constant_vector_is_uniform() {
        let w = project_simplex(&DVector::from_element(4, -7.0));
        for &x in w.iter() {
            assert_abs_diff_eq!(x, 0.25, epsilon = 1e-12);
        }
    }

    #[test]
    fn clip_and_renormalize_handles_noise_and_degeneracy() {
        let w = clip_and_renormalize(&DVector::from_vec(vec![0.6, -1e-12, 0.6])).unwrap();
        assert_eq!(w[1], 0.0);
        assert_abs_diff_eq!(w[0], 0.5, epsilon = 1e-15);
        assert!(clip_and_renormalize(&DVector::from_vec(vec![-1.0, 0.0])).is_none());
    }
}
