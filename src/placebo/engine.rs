//! In-space placebo runs: every donor in turn plays the treated unit.
//!
//! Placebo fits are independent and only read the shared panel, so they run on
//! the rayon pool; results come back in donor-base order.

use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info};

use crate::domain::{FitResult, FitSpec, PlaceboRecord};
use crate::error::{FailureKind, ScmError};
use crate::fit::fit_one;
use crate::panel::Panel;
use crate::placebo::pvalue::empirical_p_value;

/// Why a donor contributed no placebo record.
#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    /// The pseudo-treated fit failed.
    Failed(ScmError),
    /// The fit succeeded but a statistic is undefined.
    NonFinite,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlaceboSkip {
    pub unit: String,
    pub reason: SkipReason,
}

impl PlaceboSkip {
    pub fn kind(&self) -> Option<FailureKind> {
        match &self.reason {
            SkipReason::Failed(err) => Some(err.kind()),
            SkipReason::NonFinite => None,
        }
    }
}

/// All placebo records of one specification (finite rows only) plus the skips.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PlaceboSet {
    pub all: Vec<PlaceboRecord>,
    pub skipped: Vec<PlaceboSkip>,
}

/// Placebo distribution after the pre-fit quality filter, with p-values.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlaceboInference {
    pub mult: f64,
    /// `mult × treated pre-RMSPE`.
    pub threshold: f64,
    pub filtered: Vec<PlaceboRecord>,
    pub p_post1: f64,
    pub p_post2: f64,
}

impl PlaceboSet {
    /// Filter at `mult` and compute both p-values for the treated fit.
    pub fn infer(&self, treated: &FitResult, mult: f64) -> PlaceboInference {
        let threshold = mult * treated.pre_rmspe();
        let filtered = filter_by_pre_rmspe(&self.all, threshold);
        let post1: Vec<f64> = filtered.iter().map(|r| r.ratio_post1).collect();
        let post2: Vec<f64> = filtered.iter().map(|r| r.ratio_post2).collect();
        PlaceboInference {
            mult,
            threshold,
            p_post1: empirical_p_value(treated.ratio_post1, &post1),
            p_post2: empirical_p_value(treated.ratio_post2, &post2),
            filtered,
        }
    }
}

/// Records whose pre-period RMSPE is at most `threshold` (none if it is NaN).
pub fn filter_by_pre_rmspe(records: &[PlaceboRecord], threshold: f64) -> Vec<PlaceboRecord> {
    records
        .iter()
        .filter(|r| r.pre_rmspe <= threshold)
        .cloned()
        .collect()
}

/// Fit every unit of `donor_base` as pseudo-treated against the rest of the base.
///
/// Uses the dates and `min_donors` of `spec`. A failing donor is logged and
/// skipped; it never aborts the sweep.
pub fn run_placebos(panel: &Panel, spec: &FitSpec, donor_base: &[String], verbose: bool) -> PlaceboSet {
    let outcomes: Vec<(String, Result<PlaceboRecord, SkipReason>)> = donor_base
        .par_iter()
        .map(|unit| {
            let donors: Vec<String> = donor_base.iter().filter(|d| *d != unit).cloned().collect();
            let placebo = spec.for_placebo(unit, donors);
            let outcome = match fit_one(panel, &placebo) {
                Ok(fit) => {
                    let record = PlaceboRecord {
                        unit: unit.clone(),
                        pre_rmspe: fit.pre_rmspe(),
                        ratio_post1: fit.ratio_post1,
                        ratio_post2: fit.ratio_post2,
                    };
                    if record.is_finite() {
                        Ok(record)
                    } else {
                        Err(SkipReason::NonFinite)
                    }
                }
                Err(err) => Err(SkipReason::Failed(err)),
            };
            (unit.clone(), outcome)
        })
        .collect();

    let mut set = PlaceboSet::default();
    for (unit, outcome) in outcomes {
        match outcome {
            Ok(record) => set.all.push(record),
            Err(reason) => {
                let message = match &reason {
                    SkipReason::Failed(err) => err.to_string(),
                    SkipReason::NonFinite => "undefined placebo statistics".to_string(),
                };
                if verbose {
                    info!(unit = %unit, outcome = %spec.outcome, "[placebo skip] {message}");
                } else {
                    debug!(unit = %unit, outcome = %spec.outcome, "[placebo skip] {message}");
                }
                set.skipped.push(PlaceboSkip { unit, reason });
            }
        }
    }
    set
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{SimulationConfig, generate_panel};
    use crate::domain::{EventWindows, add_months};
    use chrono::NaiveDate;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn record(unit: &str, pre: f64, r1: f64, r2: f64) -> PlaceboRecord {
        PlaceboRecord {
            unit: unit.to_string(),
            pre_rmspe: pre,
            ratio_post1: r1,
            ratio_post2: r2,
        }
    }

    fn sim() -> SimulationConfig {
        SimulationConfig {
            months: 72,
            t0: NaiveDate::from_ymd_opt(2014, 1, 1).unwrap(),
            ..SimulationConfig::default()
        }
    }

    fn spec(cfg: &SimulationConfig) -> FitSpec {
        FitSpec {
            treated: cfg.treated.clone(),
            outcome: cfg.outcome.clone(),
            donors: cfg.donors.clone(),
            pre_start: cfg.start,
            t0: cfg.t0,
            date_min: cfg.start,
            fit_end: add_months(cfg.start, 59),
            full_end: add_months(cfg.start, 71),
            min_donors: 5,
            windows: EventWindows {
                pandemic_start: add_months(cfg.start, 60),
                pandemic_end: add_months(cfg.start, 65),
                post2_start: add_months(cfg.start, 66),
            },
        }
    }

    #[test]
    fn larger_multiplier_never_shrinks_the_filtered_set() {
        let mut rng = StdRng::seed_from_u64(3);
        let records: Vec<PlaceboRecord> = (0..30)
            .map(|i| record(&format!("U{i}"), rng.gen_range(0.1..10.0), 1.0, 1.0))
            .collect();
        let treated_pre = 2.0;
        let mults = [0.5, 1.0, 1.5, 2.0, 3.0, 10.0];
        for pair in mults.windows(2) {
            let small = filter_by_pre_rmspe(&records, pair[0] * treated_pre);
            let large = filter_by_pre_rmspe(&records, pair[1] * treated_pre);
            assert!(small.iter().all(|r| large.contains(r)));
            assert!(small.len() <= large.len());
        }
        assert!(filter_by_pre_rmspe(&records, f64::NAN).is_empty());
    }

    #[test]
    fn placebo_sweep_skips_failures_and_keeps_donor_order() {
        let cfg = sim();
        let panel = generate_panel(&cfg).unwrap();
        let treated = fit_one(&panel, &spec(&cfg)).unwrap();

        let mut base = treated.donors_complete.clone();
        base.insert(2, "ZZ".to_string());
        let set = run_placebos(&panel, &treated.spec, &base, false);

        assert_eq!(set.all.len(), treated.donors_complete.len());
        let units: Vec<&str> = set.all.iter().map(|r| r.unit.as_str()).collect();
        let expected: Vec<&str> = treated.donors_complete.iter().map(String::as_str).collect();
        assert_eq!(units, expected);
        assert!(set.all.iter().all(PlaceboRecord::is_finite));

        assert_eq!(set.skipped.len(), 1);
        assert_eq!(set.skipped[0].unit, "ZZ");
        assert_eq!(set.skipped[0].kind(), Some(FailureKind::InputValidity));
    }

    #[test]
    fn undersized_base_skips_every_donor() {
        let cfg = sim();
        let panel = generate_panel(&cfg).unwrap();
        let base: Vec<String> = cfg.donors.iter().take(4).cloned().collect();
        let set = run_placebos(&panel, &spec(&cfg), &base, true);
        assert!(set.all.is_empty());
        assert_eq!(set.skipped.len(), 4);
        assert!(set
            .skipped
            .iter()
            .all(|s| s.kind() == Some(FailureKind::InsufficientData)));
    }

    #[test]
    fn inference_filters_then_scores_the_treated_ratios() {
        let cfg = sim();
        let panel = generate_panel(&cfg).unwrap();
        let treated = fit_one(&panel, &spec(&cfg)).unwrap();
        let set = PlaceboSet {
            all: vec![
                record("A", 0.5 * treated.pre_rmspe(), 0.5, 100.0),
                record("B", 1.8 * treated.pre_rmspe(), 1e9, 0.1),
                record("C", 50.0 * treated.pre_rmspe(), 1e9, 1e9),
            ],
            skipped: Vec::new(),
        };

        let wide = set.infer(&treated, 2.0);
        assert_eq!(wide.filtered.len(), 2);
        let expected_p1 = if treated.ratio_post1 <= 0.5 { 1.0 } else { 2.0 / 3.0 };
        assert!((wide.p_post1 - expected_p1).abs() < 1e-12);

        let tight = set.infer(&treated, 1.5);
        assert_eq!(tight.filtered.len(), 1);
        assert!(tight.p_post1 > 0.0 && tight.p_post1 <= 1.0);
    }
}
