//! Formatted terminal output.
//!
//! Formatting lives in one place so estimation code stays free of presentation
//! and output changes stay local (the tests here are snapshot-style).

use crate::domain::{FitResult, SegmentStats, SummaryRow};
use crate::placebo::{PlaceboInference, PlaceboSet};

/// Fit diagnostics: windows, donor counts, solver and segment statistics.
pub fn format_fit_summary(fit: &FitResult) -> String {
    let spec = &fit.spec;
    let mut out = String::new();

    out.push_str("=== scm - Synthetic Control Fit ===\n");
    out.push_str(&format!("Treated: {} | outcome: {}\n", fit.treated(), spec.outcome));
    out.push_str(&format!(
        "Windows: pre=[{}, {}] | t0={} | fit_end={} | full_end={}\n",
        spec.pre_start,
        spec.pre_end(),
        spec.t0,
        spec.fit_end,
        spec.full_end
    ));
    out.push_str(&format!(
        "Donors: requested={} complete={} active={}\n",
        requested_count(fit),
        fit.donors_complete.len(),
        fit.donors_active.len()
    ));
    out.push_str(&format!(
        "Solver: {} ({}, {} iterations)\n",
        fit.solver.backend.display_name(),
        fit.solver.status.as_str(),
        fit.solver.iterations
    ));
    out.push_str(&format!("Evaluation months: {}\n", fit.dates.len()));

    out.push_str("\nSegments:\n");
    out.push_str(&format!("{:<10} {:>12} {:>12} {:>6}\n", "segment", "rmspe", "mean_gap", "n"));
    out.push_str(&format!("{:-<10} {:-<12} {:-<12} {:-<6}\n", "", "", "", ""));
    let segs = &fit.segments;
    for (name, s) in [
        ("pre", &segs.pre),
        ("post1", &segs.post1),
        ("pandemic", &segs.pandemic),
        ("post2", &segs.post2),
    ] {
        out.push_str(&segment_line(name, s));
    }

    out.push_str(&format!(
        "\nRatios: post1/pre={} | post2/pre={}\n",
        fmt_num(fit.ratio_post1, 3),
        fmt_num(fit.ratio_post2, 3)
    ));
    out
}

/// Donor weights table, weight descending.
pub fn format_weights(fit: &FitResult) -> String {
    let mut out = String::new();
    out.push_str(&format!("{:<12} {:>10}\n", "donor", "weight"));
    out.push_str(&format!("{:-<12} {:-<10}\n", "", ""));
    for w in &fit.weights {
        out.push_str(&format!("{:<12} {:>10.6}\n", truncate(&w.donor, 12), w.weight));
    }
    out
}

/// Placebo counts and, per multiplier, the filtered size and p-values.
pub fn format_placebo_summary(set: &PlaceboSet, inferences: &[PlaceboInference]) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "Placebos: fitted={} skipped={}\n",
        set.all.len(),
        set.skipped.len()
    ));
    if !set.skipped.is_empty() {
        let units: Vec<&str> = set.skipped.iter().map(|s| s.unit.as_str()).collect();
        out.push_str(&format!("Skipped: {}\n", truncate(&units.join(","), 72)));
    }
    out.push_str(&format!(
        "{:>6} {:>12} {:>9} {:>10} {:>10}\n",
        "mult", "threshold", "filtered", "p_post1", "p_post2"
    ));
    out.push_str(&format!("{:->6} {:->12} {:->9} {:->10} {:->10}\n", "", "", "", "", ""));
    for inf in inferences {
        out.push_str(&format!(
            "{:>6.2} {:>12} {:>9} {:>10} {:>10}\n",
            inf.mult,
            fmt_num(inf.threshold, 4),
            inf.filtered.len(),
            fmt_num(inf.p_post1, 4),
            fmt_num(inf.p_post2, 4)
        ));
    }
    out
}

/// Cross-specification summary, one line per (specification × multiplier).
pub fn format_study_summary(rows: &[SummaryRow]) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "{:<10} {:>6} {:>10} {:>9} {:>9} {:>8} {:>8} {:>8} {:>8}\n",
        "spec", "donors", "pre_rmspe", "ratio_p1", "ratio_p2", "n_plac", "n_filt", "p_post1", "p_post2"
    ));
    out.push_str(&format!(
        "{:-<10} {:-<6} {:-<10} {:-<9} {:-<9} {:-<8} {:-<8} {:-<8} {:-<8}\n",
        "", "", "", "", "", "", "", "", ""
    ));
    for r in rows {
        out.push_str(&format!(
            "{:<10} {:>6} {:>10} {:>9} {:>9} {:>8} {:>8} {:>8} {:>8}\n",
            truncate(&r.spec_id, 10),
            r.n_donors_active,
            fmt_num(r.pre_rmspe, 3),
            fmt_num(r.ratio_post1, 3),
            fmt_num(r.ratio_post2, 3),
            r.n_placebos,
            r.n_placebos_filtered,
            fmt_num(r.pval_ratio_post1, 3),
            fmt_num(r.pval_ratio_post2, 3)
        ));
    }
    out
}

fn requested_count(fit: &FitResult) -> usize {
    fit.donors_requested().iter().filter(|d| d.as_str() != fit.treated()).count()
}

fn segment_line(name: &str, s: &SegmentStats) -> String {
    format!(
        "{:<10} {:>12} {:>12} {:>6}\n",
        name,
        fmt_num(s.rmspe, 4),
        fmt_num(s.mean_gap, 4),
        s.n
    )
}

fn fmt_num(v: f64, decimals: usize) -> String {
    if v.is_nan() {
        return "NaN".to_string();
    }
    format!("{v:.decimals$}")
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max.saturating_sub(1)).collect();
    out.push('.');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::PlaceboRecord;
    use crate::placebo::{PlaceboSkip, SkipReason};
    use crate::error::ScmError;

    #[test]
    fn nan_renders_as_text() {
        assert_eq!(fmt_num(f64::NAN, 3), "NaN");
        assert_eq!(fmt_num(1.23456, 2), "1.23");
        let line = segment_line("post2", &SegmentStats::undefined());
        assert_eq!(line, "post2               NaN          NaN      0\n");
    }

    #[test]
    fn truncate_marks_cut_strings() {
        assert_eq!(truncate("S0_m2", 10), "S0_m2");
        assert_eq!(truncate("ABCDEFGHIJK", 5), "ABCD.");
    }

    #[test]
    fn placebo_summary_snapshot() {
        let set = PlaceboSet {
            all: vec![PlaceboRecord {
                unit: "TX".to_string(),
                pre_rmspe: 1.0,
                ratio_post1: 2.0,
                ratio_post2: 3.0,
            }],
            skipped: vec![PlaceboSkip {
                unit: "NV".to_string(),
                reason: SkipReason::Failed(ScmError::NoPrePeriodRows),
            }],
        };
        let inf = PlaceboInference {
            mult: 2.0,
            threshold: 1.5,
            filtered: set.all.clone(),
            p_post1: 0.5,
            p_post2: f64::NAN,
        };
        let out = format_placebo_summary(&set, &[inf]);
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines[0], "Placebos: fitted=1 skipped=1");
        assert_eq!(lines[1], "Skipped: NV");
        assert_eq!(lines[4], "  2.00       1.5000         1     0.5000        NaN");
    }

    #[test]
    fn fit_summary_names_the_treated_unit_and_counts_donors() {
        use crate::data::{SimulationConfig, generate_panel};
        use crate::domain::{EventWindows, FitSpec, add_months};
        use crate::fit::fit_one;

        let cfg = SimulationConfig {
            months: 60,
            ..SimulationConfig::default()
        };
        let panel = generate_panel(&cfg).unwrap();
        let mut donors = cfg.donors.clone();
        donors.push(cfg.treated.clone());
        let spec = FitSpec {
            treated: cfg.treated.clone(),
            outcome: cfg.outcome.clone(),
            donors,
            pre_start: cfg.start,
            t0: add_months(cfg.start, 48),
            date_min: cfg.start,
            fit_end: add_months(cfg.start, 59),
            full_end: add_months(cfg.start, 59),
            min_donors: 3,
            windows: EventWindows::default(),
        };
        let fit = fit_one(&panel, &spec).unwrap();
        let out = format_fit_summary(&fit);
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines[1], format!("Treated: CA | outcome: {}", cfg.outcome));
        assert!(lines[3].starts_with("Donors: requested=8 complete=8 active="));
    }
}
