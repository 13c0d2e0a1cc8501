//! Shared domain types.
//!
//! These types are intentionally kept lightweight and serializable so they can be:
//!
//! - used in-memory during fitting and placebo runs
//! - exported to JSON/CSV
//! - handed to an external plotting collaborator

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::domain::calendar::{month_start, prev_month};
use crate::error::{ScmError, ScmResult};

/// Fixed calendar intervals used by segment statistics.
///
/// The pandemic interval and the post-2 start are absolute calendar dates,
/// independent of the intervention date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventWindows {
    pub pandemic_start: NaiveDate,
    pub pandemic_end: NaiveDate,
    pub post2_start: NaiveDate,
}

impl Default for EventWindows {
    fn default() -> Self {
        Self {
            pandemic_start: ymd(2020, 3),
            pandemic_end: ymd(2021, 12),
            post2_start: ymd(2022, 1),
        }
    }
}

impl EventWindows {
    pub fn normalized(self) -> Self {
        Self {
            pandemic_start: month_start(self.pandemic_start),
            pandemic_end: month_start(self.pandemic_end),
            post2_start: month_start(self.post2_start),
        }
    }
}

/// Immutable description of one treated-vs-donors estimation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitSpec {
    pub treated: String,
    pub outcome: String,
    /// Requested donors, in caller order.
    pub donors: Vec<String>,
    pub pre_start: NaiveDate,
    /// Intervention date.
    pub t0: NaiveDate,
    pub date_min: NaiveDate,
    pub fit_end: NaiveDate,
    pub full_end: NaiveDate,
    pub min_donors: usize,
    pub windows: EventWindows,
}

impl FitSpec {
    /// Copy with every date normalized to month start, validating `pre_start < t0`.
    pub fn normalized(&self) -> ScmResult<FitSpec> {
        let out = FitSpec {
            pre_start: month_start(self.pre_start),
            t0: month_start(self.t0),
            date_min: month_start(self.date_min),
            fit_end: month_start(self.fit_end),
            full_end: month_start(self.full_end),
            windows: self.windows.normalized(),
            ..self.clone()
        };
        if out.pre_start >= out.t0 {
            return Err(ScmError::InvalidWindow {
                pre_start: out.pre_start,
                t0: out.t0,
            });
        }
        Ok(out)
    }

    /// Last month of the pre-period (the month before `t0`).
    pub fn pre_end(&self) -> NaiveDate {
        prev_month(self.t0)
    }

    /// Same dates and thresholds, with `unit` as the pseudo-treated unit.
    pub fn for_placebo(&self, unit: &str, donors: Vec<String>) -> FitSpec {
        FitSpec {
            treated: unit.to_string(),
            donors,
            ..self.clone()
        }
    }
}

/// Which backend produced the donor weights.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SolverBackend {
    /// Accelerated projected gradient on the unit simplex.
    ProjectedGradient,
    /// Frank–Wolfe (conditional gradient) with exact line search.
    FrankWolfe,
}

impl SolverBackend {
    pub fn display_name(self) -> &'static str {
        match self {
            SolverBackend::ProjectedGradient => "projected-gradient",
            SolverBackend::FrankWolfe => "frank-wolfe",
        }
    }
}

/// Convergence status reported by a solver backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SolverStatus {
    Optimal,
    /// The iteration budget ran out; the best feasible iterate is returned.
    OptimalInaccurate,
}

impl SolverStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SolverStatus::Optimal => "optimal",
            SolverStatus::OptimalInaccurate => "optimal_inaccurate",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SolverReport {
    pub backend: SolverBackend,
    pub status: SolverStatus,
    pub iterations: usize,
}

/// Donor id with its fitted weight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DonorWeight {
    pub donor: String,
    pub weight: f64,
}

/// Gap statistics over one calendar segment.
///
/// A segment with no finite gap values has `n = 0` and NaN statistics.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SegmentStats {
    pub rmspe: f64,
    pub mean_gap: f64,
    pub n: usize,
}

impl SegmentStats {
    pub fn undefined() -> Self {
        Self {
            rmspe: f64::NAN,
            mean_gap: f64::NAN,
            n: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SegmentSummary {
    pub pre: SegmentStats,
    pub post1: SegmentStats,
    pub pandemic: SegmentStats,
    pub post2: SegmentStats,
}

/// Output of one fit orchestrator run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FitResult {
    /// The normalized specification this result was fitted from.
    pub spec: FitSpec,
    /// Donors finite across the whole fit window and the pre-period.
    pub donors_complete: Vec<String>,
    /// Donors used to build the synthetic series.
    pub donors_active: Vec<String>,
    /// Active donor weights (sum to 1), weight descending.
    pub weights: Vec<DonorWeight>,
    pub solver: SolverReport,

    /// Fully observed evaluation months.
    pub dates: Vec<NaiveDate>,
    pub treated_series: Vec<f64>,
    pub synthetic: Vec<f64>,
    pub gap: Vec<f64>,

    pub segments: SegmentSummary,
    pub ratio_post1: f64,
    pub ratio_post2: f64,
}

impl FitResult {
    pub fn treated(&self) -> &str {
        &self.spec.treated
    }

    pub fn donors_requested(&self) -> &[String] {
        &self.spec.donors
    }

    pub fn pre_rmspe(&self) -> f64 {
        self.segments.pre.rmspe
    }

    pub fn weight_of(&self, donor: &str) -> f64 {
        self.weights
            .iter()
            .find(|w| w.donor == donor)
            .map(|w| w.weight)
            .unwrap_or(0.0)
    }
}

/// One donor re-fitted as a pseudo-treated unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaceboRecord {
    pub unit: String,
    pub pre_rmspe: f64,
    pub ratio_post1: f64,
    pub ratio_post2: f64,
}

impl PlaceboRecord {
    pub fn is_finite(&self) -> bool {
        self.pre_rmspe.is_finite() && self.ratio_post1.is_finite() && self.ratio_post2.is_finite()
    }
}

/// One named specification of a study: outcome, intervention date and pre-period start.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpecDef {
    pub id: String,
    pub outcome: String,
    pub t0: NaiveDate,
    pub pre_start: NaiveDate,
}

/// Default data-quality exclusions (units with unreliable reporting coverage).
pub const DEFAULT_EXCLUDED_UNITS: [&str; 18] = [
    "AR", "HI", "IN", "MI", "MS", "MT", "NE", "NH", "NY", "OH", "PA", "SD", "UT", "WV", "OR", "CZ",
    "PR", "GU",
];

pub const THEFT_OUTCOME: &str = "theft_per_100k_coveredpop";
pub const VIOLENT_OUTCOME: &str = "violent_per_100k_coveredpop";

/// A full study: one treated unit, a list of specifications, shared windows and thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StudyConfig {
    pub treated: String,
    pub date_min: NaiveDate,
    pub fit_end: NaiveDate,
    pub full_end: NaiveDate,
    /// Pre-RMSPE filter multipliers to sweep.
    pub pre_mults: Vec<f64>,
    pub min_donors: usize,
    pub excluded_units: Vec<String>,
    pub windows: EventWindows,
    pub specs: Vec<SpecDef>,
}

impl Default for StudyConfig {
    fn default() -> Self {
        let spec = |id: &str, outcome: &str, t0: NaiveDate, pre_start: NaiveDate| SpecDef {
            id: id.to_string(),
            outcome: outcome.to_string(),
            t0,
            pre_start,
        };
        Self {
            treated: "CA".to_string(),
            date_min: ymd(2010, 1),
            fit_end: ymd(2019, 12),
            full_end: ymd(2024, 12),
            pre_mults: vec![2.0, 1.5],
            min_donors: 5,
            excluded_units: DEFAULT_EXCLUDED_UNITS.iter().map(|s| s.to_string()).collect(),
            windows: EventWindows::default(),
            specs: vec![
                spec("S0", THEFT_OUTCOME, ymd(2014, 11), ymd(2010, 1)),
                spec("S1", THEFT_OUTCOME, ymd(2015, 1), ymd(2010, 1)),
                spec("S2", THEFT_OUTCOME, ymd(2014, 11), ymd(2012, 1)),
                spec("N0", VIOLENT_OUTCOME, ymd(2014, 11), ymd(2010, 1)),
            ],
        }
    }
}

impl StudyConfig {
    /// Build the fit specification for one study entry.
    pub fn fit_spec(&self, def: &SpecDef, donors: Vec<String>) -> FitSpec {
        FitSpec {
            treated: self.treated.clone(),
            outcome: def.outcome.clone(),
            donors,
            pre_start: def.pre_start,
            t0: def.t0,
            date_min: self.date_min,
            fit_end: self.fit_end,
            full_end: self.full_end,
            min_donors: self.min_donors,
            windows: self.windows,
        }
    }
}

/// One row of the study summary table (specification × multiplier).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryRow {
    pub spec_id: String,
    pub outcome: String,
    pub t0: NaiveDate,
    pub pre_start: NaiveDate,
    pub date_min: NaiveDate,
    pub fit_end: NaiveDate,
    pub full_end: NaiveDate,
    pub n_donors_requested: usize,
    pub n_donors_complete_pre: usize,
    pub n_donors_active: usize,
    pub pre_rmspe: f64,
    pub post1_rmspe: f64,
    pub post2_rmspe: f64,
    pub ratio_post1: f64,
    pub ratio_post2: f64,
    pub avg_gap_post1: f64,
    pub avg_gap_covid: f64,
    pub avg_gap_post2: f64,
    pub n_months_pre: usize,
    pub n_months_post1: usize,
    pub n_months_covid: usize,
    pub n_months_post2: usize,
    pub n_placebos: usize,
    pub n_placebos_filtered: usize,
    pub pre_rmspe_mult: f64,
    pub pval_ratio_post1: f64,
    pub pval_ratio_post2: f64,
    pub solver_status: String,
    pub solver_backend: String,
}

fn ymd(year: i32, month: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, 1).unwrap_or(NaiveDate::MIN)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> FitSpec {
        FitSpec {
            treated: "CA".to_string(),
            outcome: THEFT_OUTCOME.to_string(),
            donors: vec!["AZ".to_string(), "TX".to_string()],
            pre_start: NaiveDate::from_ymd_opt(2010, 1, 15).unwrap(),
            t0: NaiveDate::from_ymd_opt(2014, 11, 20).unwrap(),
            date_min: NaiveDate::from_ymd_opt(2010, 1, 1).unwrap(),
            fit_end: NaiveDate::from_ymd_opt(2019, 12, 31).unwrap(),
            full_end: NaiveDate::from_ymd_opt(2024, 12, 2).unwrap(),
            min_donors: 1,
            windows: EventWindows::default(),
        }
    }

    #[test]
    fn normalized_spec_uses_month_starts() {
        let s = spec().normalized().unwrap();
        assert_eq!(s.pre_start, ymd(2010, 1));
        assert_eq!(s.t0, ymd(2014, 11));
        assert_eq!(s.fit_end, ymd(2019, 12));
        assert_eq!(s.pre_end(), ymd(2014, 10));
    }

    #[test]
    fn pre_start_in_same_month_as_t0_is_rejected() {
        let mut s = spec();
        s.pre_start = NaiveDate::from_ymd_opt(2014, 11, 1).unwrap();
        let err = s.normalized().unwrap_err();
        assert!(matches!(err, ScmError::InvalidWindow { .. }));
    }

    #[test]
    fn study_config_json_fills_missing_fields_from_defaults() {
        let cfg: StudyConfig = serde_json::from_str(r#"{"treated":"TX","pre_mults":[3.0]}"#).unwrap();
        assert_eq!(cfg.treated, "TX");
        assert_eq!(cfg.pre_mults, vec![3.0]);
        assert_eq!(cfg.specs.len(), 4);
        assert_eq!(cfg.min_donors, 5);
        assert_eq!(cfg.windows, EventWindows::default());
    }
}
