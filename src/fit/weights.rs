//! Donor-weight solver: the canonical synthetic-control quadratic program.
//!
//! ```text
//! minimize ||y - X w||²   s.t.  w >= 0, Σ w = 1
//! ```
//!
//! We work on the Gram form `f(w) = wᵀGw - 2bᵀw + c` with `G = XᵀX`, `b = Xᵀy`,
//! which keeps every iteration `O(J²)` regardless of the pre-period length.
//!
//! Numerical policy:
//! - Each month's donor mean is subtracted from `y` and from every donor column.
//!   With `Σ w = 1` the residual `y - Xw` is unchanged, but the shared level no
//!   longer dominates the Gram matrix.
//! - `y` and `X` are divided by the population std of `y` before solving
//!   (scale 1 when the std is zero or non-finite). This does not move the arg-min.
//! - Backends are tried in order: accelerated projected gradient first, then
//!   pairwise Frank–Wolfe, which cannot leave the simplex and always returns its
//!   best iterate.
//! - The returned weights are clipped at zero and renormalized.

use nalgebra::{DMatrix, DVector};
use tracing::{debug, warn};

use crate::domain::{SolverBackend, SolverReport, SolverStatus};
use crate::error::{ScmError, ScmResult};
use crate::math::{clip_and_renormalize, population_std, project_simplex};

/// Iteration budgets and tolerances for the solver backends.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SolverOptions {
    pub max_iter_primary: usize,
    /// Stop when the projected-gradient residual (max-norm, weight units) is below this.
    pub tol_primary: f64,
    pub max_iter_fallback: usize,
    /// Stop when the Frank–Wolfe duality gap is below `tol_fallback × (1 + |f|)`.
    pub tol_fallback: f64,
}

impl Default for SolverOptions {
    fn default() -> Self {
        Self {
            max_iter_primary: 50_000,
            tol_primary: 1e-10,
            max_iter_fallback: 200_000,
            tol_fallback: 1e-12,
        }
    }
}

/// Weights on the unit simplex plus how they were obtained.
#[derive(Debug, Clone, PartialEq)]
pub struct WeightSolution {
    pub weights: DVector<f64>,
    pub report: SolverReport,
}

/// Quadratic program in Gram form.
#[derive(Debug, Clone)]
pub struct SimplexQp {
    gram: DMatrix<f64>,
    xty: DVector<f64>,
    yty: f64,
}

impl SimplexQp {
    pub fn new(y: &DVector<f64>, x: &DMatrix<f64>) -> Self {
        Self {
            gram: x.tr_mul(x),
            xty: x.tr_mul(y),
            yty: y.dot(y),
        }
    }

    pub fn dim(&self) -> usize {
        self.xty.len()
    }

    /// `||y - Xw||²`.
    pub fn objective(&self, w: &DVector<f64>) -> f64 {
        (w.dot(&(&self.gram * w)) - 2.0 * self.xty.dot(w) + self.yty).max(0.0)
    }

    /// `∇f(w) = 2(Gw - b)`.
    pub fn gradient(&self, w: &DVector<f64>) -> DVector<f64> {
        (&self.gram * w - &self.xty) * 2.0
    }

    fn uniform(&self) -> DVector<f64> {
        let j = self.dim();
        DVector::from_element(j, 1.0 / j as f64)
    }
}

/// Raw backend output before clipping/renormalization.
#[derive(Debug, Clone)]
pub struct RawSolution {
    pub weights: DVector<f64>,
    pub status: SolverStatus,
    pub iterations: usize,
}

/// A convex solver for the simplex-constrained QP.
pub trait QpBackend {
    fn backend(&self) -> SolverBackend;
    fn solve(&self, qp: &SimplexQp) -> Result<RawSolution, String>;
}

/// FISTA with function-value restart (O'Donoghue & Candès) and projection onto the simplex.
#[derive(Debug, Clone, Copy)]
pub struct ProjectedGradient {
    pub max_iter: usize,
    pub tol: f64,
}

impl QpBackend for ProjectedGradient {
    fn backend(&self) -> SolverBackend {
        SolverBackend::ProjectedGradient
    }

    fn solve(&self, qp: &SimplexQp) -> Result<RawSolution, String> {
        let lambda_max = qp.gram.symmetric_eigenvalues().max();
        if !lambda_max.is_finite() {
            return Err("non-finite curvature".to_string());
        }

        let mut w = qp.uniform();
        // Flat objective (X ≈ 0): every feasible point is optimal.
        if lambda_max <= f64::EPSILON * qp.yty.max(1.0) {
            return Ok(RawSolution {
                weights: w,
                status: SolverStatus::Optimal,
                iterations: 0,
            });
        }
        let step = 1.0 / (2.0 * lambda_max);

        let mut z = w.clone();
        let mut t = 1.0_f64;
        let mut f_prev = qp.objective(&w);

        for iter in 1..=self.max_iter {
            let w_next = project_simplex(&(&z - qp.gradient(&z) * step));
            if w_next.iter().any(|v| !v.is_finite()) {
                return Err(format!("non-finite iterate at iteration {iter}"));
            }

            let f_next = qp.objective(&w_next);
            if f_next > f_prev && t > 1.0 {
                // Momentum overshot: restart from the last accepted point.
                z = w.clone();
                t = 1.0;
                continue;
            }

            let residual = (&w_next - project_simplex(&(&w_next - qp.gradient(&w_next) * step))).amax();

            let t_next = 0.5 * (1.0 + (1.0 + 4.0 * t * t).sqrt());
            z = &w_next + (&w_next - &w) * ((t - 1.0) / t_next);
            w = w_next;
            t = t_next;
            f_prev = f_next;

            if residual <= self.tol {
                return Ok(RawSolution {
                    weights: w,
                    status: SolverStatus::Optimal,
                    iterations: iter,
                });
            }
        }

        Err(format!("no convergence after {} iterations", self.max_iter))
    }
}

/// Pairwise Frank–Wolfe with exact line search.
///
/// Each step moves mass from the worst active donor to the best vertex, so
/// iterates stay on the simplex and small weights can drop to exactly zero.
#[derive(Debug, Clone, Copy)]
pub struct FrankWolfe {
    pub max_iter: usize,
    pub tol: f64,
}

impl QpBackend for FrankWolfe {
    fn backend(&self) -> SolverBackend {
        SolverBackend::FrankWolfe
    }

    fn solve(&self, qp: &SimplexQp) -> Result<RawSolution, String> {
        let mut w = qp.uniform();
        let optimal = |w: DVector<f64>, iterations: usize| RawSolution {
            weights: w,
            status: SolverStatus::Optimal,
            iterations,
        };

        for iter in 0..self.max_iter {
            let grad = qp.gradient(&w);
            let Some(toward) = argmin(grad.iter().copied()) else {
                return Err("empty problem".to_string());
            };
            let gap = grad.dot(&w) - grad[toward];
            if !gap.is_finite() {
                return Err(format!("non-finite duality gap at iteration {iter}"));
            }
            if gap <= self.tol * (1.0 + qp.objective(&w)) {
                return Ok(optimal(w, iter));
            }

            let Some(away) = argmin(
                grad.iter()
                    .zip(w.iter())
                    .map(|(&g, &wi)| if wi > 0.0 { -g } else { f64::INFINITY }),
            ) else {
                return Err("no active donor".to_string());
            };

            // d = e_toward - e_away; f(w + γd) = f(w) - γ·slope + γ²·dᵀGd.
            let slope = grad[away] - grad[toward];
            if slope <= 0.0 {
                return Ok(optimal(w, iter));
            }
            let g = &qp.gram;
            let curvature = g[(toward, toward)] - 2.0 * g[(toward, away)] + g[(away, away)];
            let gamma_max = w[away];
            let gamma = if curvature > 0.0 {
                (slope / (2.0 * curvature)).min(gamma_max)
            } else {
                gamma_max
            };

            w[toward] += gamma;
            if gamma >= gamma_max {
                w[away] = 0.0;
            } else {
                w[away] -= gamma;
            }
        }

        Ok(RawSolution {
            weights: w,
            status: SolverStatus::OptimalInaccurate,
            iterations: self.max_iter,
        })
    }
}

fn argmin(values: impl Iterator<Item = f64>) -> Option<usize> {
    values
        .enumerate()
        .filter(|(_, v)| !v.is_nan())
        .fold(None, |best: Option<(usize, f64)>, (i, v)| match best {
            Some((_, b)) if b <= v => best,
            _ => Some((i, v)),
        })
        .map(|(i, _)| i)
}

/// Solve for synthetic-control weights with default solver options.
pub fn solve_scm_weights(y_pre: &DVector<f64>, x_pre: &DMatrix<f64>) -> ScmResult<WeightSolution> {
    solve_scm_weights_with(y_pre, x_pre, &SolverOptions::default())
}

/// Solve for synthetic-control weights.
///
/// Fails on empty or mismatched inputs, non-finite values, when every backend
/// fails, or when the clipped weights sum to zero.
pub fn solve_scm_weights_with(
    y_pre: &DVector<f64>,
    x_pre: &DMatrix<f64>,
    opts: &SolverOptions,
) -> ScmResult<WeightSolution> {
    let (t, j) = x_pre.shape();
    if t == 0 || j == 0 {
        return Err(ScmError::EmptyMatrix { rows: t, cols: j });
    }
    if y_pre.len() != t {
        return Err(ScmError::ShapeMismatch {
            expected: t,
            found: y_pre.len(),
        });
    }
    if y_pre.iter().chain(x_pre.iter()).any(|v| !v.is_finite()) {
        return Err(ScmError::NonFinite {
            context: "pre-period matrices",
        });
    }

    let mut scale = population_std(y_pre.as_slice());
    if !(scale.is_finite() && scale > 0.0) {
        scale = 1.0;
    }
    let offset = DVector::from_fn(t, |i, _| x_pre.row(i).mean());
    let y = DVector::from_fn(t, |i, _| (y_pre[i] - offset[i]) / scale);
    let x = DMatrix::from_fn(t, j, |i, k| (x_pre[(i, k)] - offset[i]) / scale);
    let qp = SimplexQp::new(&y, &x);

    let primary = ProjectedGradient {
        max_iter: opts.max_iter_primary,
        tol: opts.tol_primary,
    };
    let fallback = FrankWolfe {
        max_iter: opts.max_iter_fallback,
        tol: opts.tol_fallback,
    };
    let backends: [&dyn QpBackend; 2] = [&primary, &fallback];

    let mut last_failure = String::from("unknown");
    for backend in backends {
        match backend.solve(&qp) {
            Ok(raw) => {
                debug!(
                    backend = backend.backend().display_name(),
                    status = raw.status.as_str(),
                    iterations = raw.iterations,
                    donors = j,
                    months = t,
                    "weight solve complete"
                );
                let weights = clip_and_renormalize(&raw.weights).ok_or_else(|| {
                    ScmError::DegenerateWeights {
                        sum: raw.weights.map(|x| x.max(0.0)).sum(),
                    }
                })?;
                return Ok(WeightSolution {
                    weights,
                    report: SolverReport {
                        backend: backend.backend(),
                        status: raw.status,
                        iterations: raw.iterations,
                    },
                });
            }
            Err(reason) => {
                warn!(
                    backend = backend.backend().display_name(),
                    reason = %reason,
                    "weight solver backend failed"
                );
                last_failure = format!("{}: {reason}", backend.backend().display_name());
            }
        }
    }

    Err(ScmError::SolverFailed {
        status: last_failure,
    })
}
