//! Study pipeline shared by the CLI commands and the integration tests.
//!
//! panel -> exclusions -> (per specification) treated fit -> placebo sweep
//! -> per-multiplier inference -> summary rows -> exports
//!
//! Commands only add presentation (printing) on top of this.

use std::fs;
use std::path::Path;

use tracing::{info, warn};

use crate::domain::{FitResult, SpecDef, StudyConfig, SummaryRow};
use crate::error::{AppError, ScmError};
use crate::fit::fit_one;
use crate::io::export::ensure_parent;
use crate::io::{write_fit_json, write_placebos_csv, write_summary_csv, write_weights_csv};
use crate::panel::Panel;
use crate::placebo::{PlaceboInference, PlaceboSet, run_placebos};
use crate::plot::{render_gap_plot, render_histogram, render_series_plot};

/// Everything computed for one specification.
#[derive(Debug, Clone)]
pub struct SpecOutcome {
    pub def: SpecDef,
    pub fit: FitResult,
    pub placebos: PlaceboSet,
    /// One entry per pre-RMSPE multiplier, in study order.
    pub inferences: Vec<PlaceboInference>,
}

/// A specification whose treated fit failed.
#[derive(Debug, Clone)]
pub struct SpecFailure {
    pub id: String,
    pub error: ScmError,
}

/// All computed outputs of a study run.
#[derive(Debug, Clone)]
pub struct StudyOutput {
    pub specs: Vec<SpecOutcome>,
    pub failures: Vec<SpecFailure>,
    pub summary: Vec<SummaryRow>,
}

/// Text figure size; `None` skips figures.
#[derive(Debug, Clone, Copy)]
pub struct FigureSize {
    pub width: usize,
    pub height: usize,
}

/// Run every specification of `study` against `panel`.
///
/// A failing treated fit skips that specification; the run fails only when
/// every specification fails.
pub fn run_study(panel: &Panel, study: &StudyConfig, verbose_placebos: bool) -> Result<StudyOutput, AppError> {
    let panel = panel.without_units(&study.excluded_units);
    let donors: Vec<String> = panel
        .units()
        .into_iter()
        .filter(|u| *u != study.treated)
        .collect();
    info!(
        treated = %study.treated,
        candidates = donors.len(),
        excluded = study.excluded_units.len(),
        specs = study.specs.len(),
        "study start"
    );

    let mut specs = Vec::with_capacity(study.specs.len());
    let mut failures = Vec::new();
    let mut summary = Vec::new();

    for def in &study.specs {
        let spec = study.fit_spec(def, donors.clone());
        let fit = match fit_one(&panel, &spec) {
            Ok(fit) => fit,
            Err(error) => {
                warn!(spec = %def.id, "treated fit failed: {error}");
                failures.push(SpecFailure {
                    id: def.id.clone(),
                    error,
                });
                continue;
            }
        };

        let placebos = run_placebos(&panel, &fit.spec, &fit.donors_complete, verbose_placebos);
        let inferences: Vec<PlaceboInference> = study
            .pre_mults
            .iter()
            .map(|&mult| placebos.infer(&fit, mult))
            .collect();

        info!(
            spec = %def.id,
            active = fit.donors_active.len(),
            pre_rmspe = fit.pre_rmspe(),
            placebos = placebos.all.len(),
            skipped = placebos.skipped.len(),
            "spec done"
        );

        summary.extend(
            inferences
                .iter()
                .map(|inf| summary_row(def, &fit, &placebos, inf)),
        );
        specs.push(SpecOutcome {
            def: def.clone(),
            fit,
            placebos,
            inferences,
        });
    }

    if specs.is_empty() {
        if let Some(first) = failures.first() {
            return Err(AppError::from(first.error.clone()));
        }
    }

    Ok(StudyOutput {
        specs,
        failures,
        summary,
    })
}

/// One summary row for a specification at one multiplier.
pub fn summary_row(def: &SpecDef, fit: &FitResult, placebos: &PlaceboSet, inf: &PlaceboInference) -> SummaryRow {
    let spec = &fit.spec;
    let seg = &fit.segments;
    SummaryRow {
        spec_id: format!("{}_m{}", def.id, mult_tag(inf.mult)),
        outcome: spec.outcome.clone(),
        t0: spec.t0,
        pre_start: spec.pre_start,
        date_min: spec.date_min,
        fit_end: spec.fit_end,
        full_end: spec.full_end,
        n_donors_requested: fit.donors_requested().len(),
        n_donors_complete_pre: fit.donors_complete.len(),
        n_donors_active: fit.donors_active.len(),
        pre_rmspe: seg.pre.rmspe,
        post1_rmspe: seg.post1.rmspe,
        post2_rmspe: seg.post2.rmspe,
        ratio_post1: fit.ratio_post1,
        ratio_post2: fit.ratio_post2,
        avg_gap_post1: seg.post1.mean_gap,
        avg_gap_covid: seg.pandemic.mean_gap,
        avg_gap_post2: seg.post2.mean_gap,
        n_months_pre: seg.pre.n,
        n_months_post1: seg.post1.n,
        n_months_covid: seg.pandemic.n,
        n_months_post2: seg.post2.n,
        n_placebos: placebos.all.len(),
        n_placebos_filtered: inf.filtered.len(),
        pre_rmspe_mult: inf.mult,
        pval_ratio_post1: inf.p_post1,
        pval_ratio_post2: inf.p_post2,
        solver_status: fit.solver.status.as_str().to_string(),
        solver_backend: fit.solver.backend.display_name().to_string(),
    }
}

/// Multiplier as used in ids and file names (`2.0`, `1.5`).
pub fn mult_tag(mult: f64) -> String {
    format!("{mult:?}")
}

/// Write tables, fit JSON and (optionally) text figures under `outdir`.
pub fn write_outputs(outdir: &Path, output: &StudyOutput, figures: Option<FigureSize>) -> Result<(), AppError> {
    let tables = outdir.join("tables");
    let fits = outdir.join("fits");
    let figs = outdir.join("figures");

    for s in &output.specs {
        let id = &s.def.id;
        write_weights_csv(&tables.join(format!("{id}_weights.csv")), &s.fit)?;
        write_fit_json(&fits.join(format!("{id}_fit.json")), &s.fit)?;

        for inf in &s.inferences {
            let tag = mult_tag(inf.mult);
            write_placebos_csv(&tables.join(format!("{id}_placebos_all_m{tag}.csv")), &s.placebos.all)?;
            write_placebos_csv(&tables.join(format!("{id}_placebos_filt_m{tag}.csv")), &inf.filtered)?;
        }

        if let Some(size) = figures {
            write_figures(&figs, s, size)?;
        }
    }

    write_summary_csv(&tables.join("all_specs_summary.csv"), &output.summary)?;
    info!(outdir = %outdir.display(), specs = output.specs.len(), "outputs written");
    Ok(())
}

fn write_figures(dir: &Path, s: &SpecOutcome, size: FigureSize) -> Result<(), AppError> {
    let id = &s.def.id;
    let fit = &s.fit;
    let t0 = fit.spec.t0;

    write_text(
        &dir.join(format!("{id}_treated_vs_synth.txt")),
        &render_series_plot(&fit.dates, &fit.treated_series, &fit.synthetic, t0, size.width, size.height),
    )?;
    write_text(
        &dir.join(format!("{id}_gap.txt")),
        &render_gap_plot(&fit.dates, &fit.gap, t0, size.width, size.height),
    )?;

    for inf in &s.inferences {
        let tag = mult_tag(inf.mult);
        let post1: Vec<f64> = inf.filtered.iter().map(|r| r.ratio_post1).collect();
        let post2: Vec<f64> = inf.filtered.iter().map(|r| r.ratio_post2).collect();
        write_text(
            &dir.join(format!("{id}_hist_ratio_post1_m{tag}.txt")),
            &render_histogram(&post1, Some(fit.ratio_post1), 20, size.width.saturating_sub(40).max(10)),
        )?;
        write_text(
            &dir.join(format!("{id}_hist_ratio_post2_m{tag}.txt")),
            &render_histogram(&post2, Some(fit.ratio_post2), 20, size.width.saturating_sub(40).max(10)),
        )?;
    }
    Ok(())
}

fn write_text(path: &Path, contents: &str) -> Result<(), AppError> {
    ensure_parent(path)?;
    fs::write(path, contents)
        .map_err(|e| AppError::new(2, format!("Failed to write '{}': {e}", path.display())))
}
