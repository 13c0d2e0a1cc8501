//! Top-level application orchestration.
//!
//! `src/main.rs` is intentionally tiny; this module is the "real main" that:
//! - parses CLI arguments and sets up logging / the worker pool
//! - loads the panel and resolves exclusions
//! - runs a single fit or the full study (fits, placebos, p-values)
//! - prints reports/plots
//! - writes tables, fit JSON and figures

use clap::Parser;
use tracing::{info, warn};

use crate::app::pipeline::FigureSize;
use crate::cli::{Cli, Command, FitArgs, PanelArgs, RunArgs, SimulateArgs};
use crate::data::{SimulationConfig, generate_panel};
use crate::domain::{DEFAULT_EXCLUDED_UNITS, EventWindows, FitSpec, StudyConfig};
use crate::error::AppError;
use crate::io::{DEFAULT_DATE_COLUMN, DEFAULT_UNIT_COLUMN, PanelIngest};
use crate::panel::Panel;

pub mod pipeline;

/// Entry point for the `scm` binary.
pub fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    init_logging(cli.log_level);
    configure_threads(cli.threads)?;

    match cli.command {
        Command::Run(args) => handle_run(args),
        Command::Fit(args) => handle_fit(args),
        Command::Simulate(args) => handle_simulate(args),
    }
}

fn init_logging(level: tracing::Level) {
    // A second init (tests, embedding) keeps the first subscriber.
    let _ = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

fn configure_threads(threads: usize) -> Result<(), AppError> {
    if threads == 0 {
        return Ok(());
    }
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .map_err(|e| AppError::new(2, format!("Failed to configure {threads} worker threads: {e}")))
}

fn handle_run(args: RunArgs) -> Result<(), AppError> {
    let ingest = load_panel(&args.panel)?;

    let base = match &args.study {
        Some(path) => crate::io::read_study_json(path)?,
        None => StudyConfig::default(),
    };
    let study = study_config_from_args(&args, base);
    crate::io::validate_study(&study)?;

    let output = pipeline::run_study(&ingest.panel, &study, args.verbose_placebos)?;

    for s in &output.specs {
        println!("[{}] {} t0={}", s.def.id, s.def.outcome, s.def.t0);
        println!("{}", crate::report::format_placebo_summary(&s.placebos, &s.inferences));
    }
    println!("{}", crate::report::format_study_summary(&output.summary));
    for failure in &output.failures {
        println!("Spec {} failed: {}", failure.id, failure.error);
    }

    let figures = (!args.no_figures).then_some(FigureSize {
        width: args.width,
        height: args.height,
    });
    pipeline::write_outputs(&args.outdir, &output, figures)?;
    println!("Outputs written to {}", args.outdir.display());
    Ok(())
}

fn handle_fit(args: FitArgs) -> Result<(), AppError> {
    let ingest = load_panel(&args.panel)?;
    let excluded = resolve_exclusions(&args.panel, &default_exclusions());
    let panel = ingest.panel.without_units(&excluded);

    let spec = fit_spec_from_args(&args, &panel);
    let fit = crate::fit::fit_one(&panel, &spec)?;

    println!("{}", crate::report::format_fit_summary(&fit));
    println!("{}", crate::report::format_weights(&fit));

    if !args.no_plot {
        let t0 = fit.spec.t0;
        println!(
            "{}",
            crate::plot::render_series_plot(&fit.dates, &fit.treated_series, &fit.synthetic, t0, args.width, args.height)
        );
        println!(
            "{}",
            crate::plot::render_gap_plot(&fit.dates, &fit.gap, t0, args.width, args.height)
        );
    }

    if let Some(path) = &args.export_weights {
        crate::io::write_weights_csv(path, &fit)?;
    }
    if let Some(path) = &args.export_json {
        crate::io::write_fit_json(path, &fit)?;
    }
    Ok(())
}

fn handle_simulate(args: SimulateArgs) -> Result<(), AppError> {
    let config = SimulationConfig {
        months: args.months,
        t0: args.t0,
        effect: args.effect,
        donor_noise_sd: args.noise,
        treated_noise_sd: args.treated_noise,
        seed: args.seed,
        ..SimulationConfig::default()
    };
    let panel = generate_panel(&config)?;
    crate::io::write_panel_csv(&args.out, &panel, DEFAULT_UNIT_COLUMN, DEFAULT_DATE_COLUMN)?;

    info!(rows = panel.len(), seed = config.seed, "simulated panel written");
    println!(
        "Wrote {} rows ({} units x {} months) to {}",
        panel.len(),
        config.donors.len() + 1,
        config.months,
        args.out.display()
    );
    Ok(())
}

fn load_panel(args: &PanelArgs) -> Result<PanelIngest, AppError> {
    let ingest = crate::io::load_panel_csv(&args.panel, &args.unit_col, &args.date_col)?;
    if !ingest.row_errors.is_empty() {
        warn!(
            path = %args.panel.display(),
            skipped = ingest.row_errors.len(),
            "panel rows skipped"
        );
    }
    Ok(ingest)
}

fn default_exclusions() -> Vec<String> {
    DEFAULT_EXCLUDED_UNITS.iter().map(|s| s.to_string()).collect()
}

/// Exclusion list: `--no-exclude` wins, then `--exclude`, then `default`.
pub fn resolve_exclusions(args: &PanelArgs, default: &[String]) -> Vec<String> {
    if args.no_exclude {
        return Vec::new();
    }
    match &args.exclude {
        Some(units) => units
            .iter()
            .map(|u| u.trim().to_string())
            .filter(|u| !u.is_empty())
            .collect(),
        None => default.to_vec(),
    }
}

/// Apply CLI overrides on top of a study configuration.
pub fn study_config_from_args(args: &RunArgs, base: StudyConfig) -> StudyConfig {
    let excluded_units = resolve_exclusions(&args.panel, &base.excluded_units);
    StudyConfig {
        treated: args.treated.clone().unwrap_or(base.treated),
        pre_mults: args.pre_mult.clone().unwrap_or(base.pre_mults),
        min_donors: args.min_donors.unwrap_or(base.min_donors),
        date_min: args.date_min.unwrap_or(base.date_min),
        fit_end: args.fit_end.unwrap_or(base.fit_end),
        full_end: args.full_end.unwrap_or(base.full_end),
        excluded_units,
        ..base
    }
}

/// Single-fit specification; without `--donors` every other panel unit is a candidate.
pub fn fit_spec_from_args(args: &FitArgs, panel: &Panel) -> FitSpec {
    let donors = match &args.donors {
        Some(d) => d.clone(),
        None => panel
            .units()
            .into_iter()
            .filter(|u| *u != args.treated)
            .collect(),
    };
    FitSpec {
        treated: args.treated.clone(),
        outcome: args.outcome.clone(),
        donors,
        pre_start: args.pre_start,
        t0: args.t0,
        date_min: args.date_min,
        fit_end: args.fit_end,
        full_end: args.full_end,
        min_donors: args.min_donors,
        windows: EventWindows::default(),
    }
}
