//! Fit orchestrator: one treated unit against a donor pool, end to end.
//!
//! Stages, strictly in order:
//!
//! 1. normalize dates and validate `pre_start < t0`
//! 2. wide fit-window matrix over `[date_min, fit_end]` for treated + donors
//! 3. keep donors that are finite across the whole fit window
//! 4. solve simplex weights on the pre-period `[pre_start, t0)`
//! 5. active donors = weight above `ACTIVE_WEIGHT_MIN` (all complete donors if none)
//! 6. wide full-window matrix over `[date_min, full_end]`, fully observed months only
//! 7. renormalize active weights
//! 8. synthetic series and gap
//! 9. segment statistics and post/pre error ratios
//!
//! Every stage either produces the next value or aborts the whole call.

use std::cmp::Ordering;
use std::collections::HashSet;

use nalgebra::DVector;
use tracing::debug;

use crate::domain::{DonorWeight, FitResult, FitSpec};
use crate::error::{ScmError, ScmResult};
use crate::fit::segments::{error_ratio, summarize_segments};
use crate::fit::weights::{SolverOptions, solve_scm_weights_with};
use crate::panel::Panel;

/// Donors at or below this weight are treated as inactive.
pub const ACTIVE_WEIGHT_MIN: f64 = 1e-6;

/// Fit one specification with the default solver options.
pub fn fit_one(panel: &Panel, spec: &FitSpec) -> ScmResult<FitResult> {
    fit_one_with(panel, spec, &SolverOptions::default())
}

pub fn fit_one_with(panel: &Panel, spec: &FitSpec, opts: &SolverOptions) -> ScmResult<FitResult> {
    let spec = spec.normalized()?;
    let treated = spec.treated.as_str();
    let donors = requested_donors(&spec);

    let mut fit_units = Vec::with_capacity(donors.len() + 1);
    fit_units.push(spec.treated.clone());
    fit_units.extend(donors.iter().cloned());

    let fit_wide = panel.wide(&fit_units, &spec.outcome, spec.date_min, spec.fit_end)?;
    if !fit_wide.has_unit(treated) {
        return Err(ScmError::TreatedMissing {
            unit: spec.treated.clone(),
            window: "fit window",
        });
    }

    let pre_mask = fit_wide.date_mask(spec.pre_start, spec.t0);
    if !pre_mask.iter().any(|&m| m) {
        return Err(ScmError::NoPrePeriodRows);
    }
    if !fit_wide.column_is_finite(treated, Some(&pre_mask)) {
        return Err(ScmError::NonFinite {
            context: "treated pre-period",
        });
    }

    // The pre-period rows are a subset of the fit window.
    let donors_complete: Vec<String> = donors
        .iter()
        .filter(|d| fit_wide.column_is_finite(d, None))
        .cloned()
        .collect();
    if donors_complete.len() < spec.min_donors {
        return Err(ScmError::InsufficientDonors {
            found: donors_complete.len(),
            required: spec.min_donors,
        });
    }

    let y_pre = fit_wide
        .masked_column(treated, &pre_mask)
        .ok_or_else(|| ScmError::TreatedMissing {
            unit: spec.treated.clone(),
            window: "pre-period",
        })?;
    let x_pre = fit_wide.masked_block(&donors_complete, &pre_mask)?;
    let solution = solve_scm_weights_with(&y_pre, &x_pre, opts)?;

    let active = select_active(&donors_complete, solution.weights.as_slice());

    let active_units: Vec<String> = active.iter().map(|(d, _)| d.clone()).collect();
    let mut eval_units = Vec::with_capacity(active_units.len() + 1);
    eval_units.push(spec.treated.clone());
    eval_units.extend(active_units.iter().cloned());

    let full_wide = panel.wide(&eval_units, &spec.outcome, spec.date_min, spec.full_end)?;
    if !full_wide.has_unit(treated) {
        return Err(ScmError::TreatedMissing {
            unit: spec.treated.clone(),
            window: "full window",
        });
    }
    let eval = full_wide.complete_rows(&eval_units)?;

    let sum: f64 = active.iter().map(|(_, w)| *w).sum();
    if !(sum.is_finite() && sum > 0.0) {
        return Err(ScmError::DegenerateWeights { sum });
    }
    let weights: Vec<DonorWeight> = active
        .iter()
        .map(|(donor, w)| DonorWeight {
            donor: donor.clone(),
            weight: w / sum,
        })
        .collect();
    let w = DVector::from_iterator(weights.len(), weights.iter().map(|dw| dw.weight));

    let y = eval.values().column(0).clone_owned();
    let synthetic = eval.values().columns(1, weights.len()) * &w;
    let gap = &y - &synthetic;

    let dates = eval.dates().to_vec();
    let segments = summarize_segments(&dates, gap.as_slice(), &spec);
    let ratio_post1 = error_ratio(segments.post1.rmspe, segments.pre.rmspe);
    let ratio_post2 = error_ratio(segments.post2.rmspe, segments.pre.rmspe);

    debug!(
        treated,
        outcome = %spec.outcome,
        complete = donors_complete.len(),
        active = weights.len(),
        months = dates.len(),
        pre_rmspe = segments.pre.rmspe,
        "fit complete"
    );

    Ok(FitResult {
        spec,
        donors_complete,
        donors_active: active_units,
        weights,
        solver: solution.report,
        dates,
        treated_series: y.iter().copied().collect(),
        synthetic: synthetic.iter().copied().collect(),
        gap: gap.iter().copied().collect(),
        segments,
        ratio_post1,
        ratio_post2,
    })
}

/// Donors with weight above `ACTIVE_WEIGHT_MIN`, weight descending (stable on ties).
///
/// When no weight clears the threshold every donor is kept, still ranked.
fn select_active(donors: &[String], weights: &[f64]) -> Vec<(String, f64)> {
    let mut ranked: Vec<(String, f64)> = donors.iter().cloned().zip(weights.iter().copied()).collect();
    ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));

    let active: Vec<(String, f64)> = ranked
        .iter()
        .filter(|(_, w)| *w > ACTIVE_WEIGHT_MIN)
        .cloned()
        .collect();
    if active.is_empty() { ranked } else { active }
}

/// Requested donors in caller order, without duplicates or the treated unit.
fn requested_donors(spec: &FitSpec) -> Vec<String> {
    let mut seen = HashSet::with_capacity(spec.donors.len());
    spec.donors
        .iter()
        .filter(|d| **d != spec.treated && seen.insert(d.as_str()))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{EventWindows, SolverBackend, add_months};
    use crate::panel::PanelRow;
    use approx::assert_abs_diff_eq;
    use chrono::NaiveDate;

    const MONTHS: u32 = 48;

    fn base() -> NaiveDate {
        NaiveDate::from_ymd_opt(2010, 1, 1).unwrap()
    }

    fn donor_value(unit: &str, i: f64) -> f64 {
        match unit {
            "AZ" => 100.0 + 0.8 * i + 5.0 * (0.5 * i).sin(),
            "TX" => 80.0 + 10.0 * (0.3 * i).cos(),
            "NV" => 120.0 - 0.5 * i + 3.0 * (1.1 * i).sin(),
            "WA" => 60.0 + 0.02 * i * i,
            _ => 90.0 + (0.9 * i).cos(),
        }
    }

    /// CA is 0.4·AZ + 0.6·TX, plus `effect` from month 24 on.
    fn panel_with(effect: f64, edit: impl Fn(&mut PanelRow)) -> Panel {
        let mut rows = Vec::new();
        for m in 0..MONTHS {
            let i = f64::from(m);
            let date = add_months(base(), m);
            for unit in ["AZ", "TX", "NV", "WA", "CO"] {
                rows.push(PanelRow {
                    unit: unit.to_string(),
                    date,
                    values: vec![donor_value(unit, i)],
                });
            }
            let shift = if m >= 24 { effect } else { 0.0 };
            rows.push(PanelRow {
                unit: "CA".to_string(),
                date,
                values: vec![0.4 * donor_value("AZ", i) + 0.6 * donor_value("TX", i) + shift],
            });
        }
        for row in &mut rows {
            edit(row);
        }
        Panel::new(vec!["y".to_string()], rows).unwrap()
    }

    fn spec() -> FitSpec {
        FitSpec {
            treated: "CA".to_string(),
            outcome: "y".to_string(),
            donors: ["AZ", "TX", "NV", "WA", "CO"].iter().map(|s| s.to_string()).collect(),
            pre_start: base(),
            t0: add_months(base(), 24),
            date_min: base(),
            fit_end: add_months(base(), 35),
            full_end: add_months(base(), 47),
            min_donors: 3,
            windows: EventWindows {
                pandemic_start: add_months(base(), 36),
                pandemic_end: add_months(base(), 41),
                post2_start: add_months(base(), 42),
            },
        }
    }

    #[test]
    fn recovers_convex_combination_and_measures_the_effect() {
        let res = fit_one(&panel_with(10.0, |_| {}), &spec()).unwrap();

        assert_eq!(res.donors_complete.len(), 5);
        assert_eq!(res.donors_active[0], "TX");
        assert_abs_diff_eq!(res.weight_of("TX"), 0.6, epsilon = 1e-4);
        assert_abs_diff_eq!(res.weight_of("AZ"), 0.4, epsilon = 1e-4);
        let total: f64 = res.weights.iter().map(|w| w.weight).sum();
        assert_abs_diff_eq!(total, 1.0, epsilon = 1e-12);

        assert_eq!(res.dates.len(), MONTHS as usize);
        assert_eq!(res.segments.pre.n, 24);
        assert_eq!(res.segments.post1.n, 12);
        assert_eq!(res.segments.pandemic.n, 6);
        assert_eq!(res.segments.post2.n, 6);
        assert!(res.pre_rmspe() < 1e-3, "pre_rmspe={}", res.pre_rmspe());
        assert_abs_diff_eq!(res.segments.post1.mean_gap, 10.0, epsilon = 1e-2);
        assert!(res.ratio_post1 > 1e3);
        assert_eq!(res.solver.backend, SolverBackend::ProjectedGradient);
    }

    #[test]
    fn too_few_complete_donors_is_insufficient_data() {
        let panel = panel_with(0.0, |row| {
            if row.unit != "CA" && row.unit != "AZ" && row.date == add_months(base(), 30) {
                row.values[0] = f64::NAN;
            }
        });
        let err = fit_one(&panel, &spec()).unwrap_err();
        assert_eq!(err, ScmError::InsufficientDonors { found: 1, required: 3 });
    }

    #[test]
    fn donor_gap_outside_the_fit_window_drops_the_month() {
        let missing = add_months(base(), 40);
        let panel = panel_with(0.0, |row| {
            if row.unit == "TX" && row.date == missing {
                row.values[0] = f64::NAN;
            }
        });
        let res = fit_one(&panel, &spec()).unwrap();
        assert!(res.donors_active.iter().any(|d| d == "TX"));
        assert_eq!(res.dates.len(), MONTHS as usize - 1);
        assert!(!res.dates.contains(&missing));
        assert_eq!(res.segments.pandemic.n, 5);
        assert!(res.gap.iter().all(|g| g.is_finite()));
    }

    #[test]
    fn identical_inputs_give_identical_results() {
        let panel = panel_with(3.0, |_| {});
        let a = fit_one(&panel, &spec()).unwrap();
        let b = fit_one(&panel, &spec()).unwrap();
        assert_eq!(serde_json::to_string(&a).unwrap(), serde_json::to_string(&b).unwrap());
        assert_eq!(a.pre_rmspe().to_bits(), b.pre_rmspe().to_bits());
    }

    #[test]
    fn constant_treated_series_still_fits() {
        let panel = panel_with(0.0, |row| match row.unit.as_str() {
            "CA" => row.values[0] = 7.0,
            "CO" => row.values[0] = 7.0,
            _ => {}
        });
        let res = fit_one(&panel, &spec()).unwrap();
        assert_abs_diff_eq!(res.weight_of("CO"), 1.0, epsilon = 1e-6);
        assert!(res.pre_rmspe() < 1e-6);
    }

    #[test]
    fn treated_problems_are_input_errors() {
        let mut s = spec();
        s.treated = "ZZ".to_string();
        assert!(matches!(
            fit_one(&panel_with(0.0, |_| {}), &s),
            Err(ScmError::TreatedMissing { .. })
        ));

        let panel = panel_with(0.0, |row| {
            if row.unit == "CA" && row.date == add_months(base(), 5) {
                row.values[0] = f64::NAN;
            }
        });
        assert!(matches!(fit_one(&panel, &spec()), Err(ScmError::NonFinite { .. })));

        let mut s = spec();
        s.date_min = add_months(base(), 30);
        assert_eq!(fit_one(&panel_with(0.0, |_| {}), &s).unwrap_err(), ScmError::NoPrePeriodRows);
    }

    #[test]
    fn treated_is_never_its_own_donor() {
        let mut s = spec();
        s.donors.push("CA".to_string());
        s.donors.push("AZ".to_string());
        let res = fit_one(&panel_with(0.0, |_| {}), &s).unwrap();
        assert_eq!(res.donors_complete.len(), 5);
        assert!(!res.donors_complete.iter().any(|d| d == "CA"));
    }

    #[test]
    fn active_selection_keeps_every_donor_when_all_weights_are_tiny() {
        let donors: Vec<String> = ["AZ", "TX", "NV"].iter().map(|s| s.to_string()).collect();

        let picked = select_active(&donors, &[0.2, 0.8, 5e-7]);
        assert_eq!(picked, vec![("TX".to_string(), 0.8), ("AZ".to_string(), 0.2)]);

        let picked = select_active(&donors, &[1e-7, 3e-7, 1e-6]);
        let names: Vec<&str> = picked.iter().map(|(d, _)| d.as_str()).collect();
        assert_eq!(names, vec!["NV", "TX", "AZ"]);
        assert_eq!(picked[0].1, 1e-6);
    }
}
