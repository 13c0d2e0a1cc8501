//! Command-line parsing for the synthetic-control estimator.
//!
//! Argument parsing and command dispatch stay separate from the estimation code;
//! `app` turns these structs into a `StudyConfig` / `FitSpec`.

use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};

use crate::domain::parse_month;
use crate::io::{DEFAULT_DATE_COLUMN, DEFAULT_UNIT_COLUMN};

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(name = "scm", version, about = "Synthetic Control Method estimation with placebo inference")]
pub struct Cli {
    /// Log level (error, warn, info, debug, trace).
    #[arg(long, global = true, default_value = "warn")]
    pub log_level: tracing::Level,

    /// Worker threads for placebo fits (0 = one per core).
    #[arg(long, global = true, default_value_t = 0)]
    pub threads: usize,

    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the full study: every specification, placebos, p-values and exports.
    Run(RunArgs),
    /// Fit one treated unit and print diagnostics (no placebos).
    Fit(FitArgs),
    /// Write a synthetic panel CSV with a known treated mix and effect.
    Simulate(SimulateArgs),
}

/// Panel input options shared by `run` and `fit`.
#[derive(Debug, Args, Clone)]
pub struct PanelArgs {
    /// Long-format panel CSV (one row per unit and month).
    #[arg(long, value_name = "CSV")]
    pub panel: PathBuf,

    /// Unit id column.
    #[arg(long, default_value = DEFAULT_UNIT_COLUMN)]
    pub unit_col: String,

    /// Date column.
    #[arg(long, default_value = DEFAULT_DATE_COLUMN)]
    pub date_col: String,

    /// Units to drop before fitting (comma-separated). Defaults to the data-quality exclusion list.
    #[arg(long, value_delimiter = ',')]
    pub exclude: Option<Vec<String>>,

    /// Keep every unit (ignore the exclusion list).
    #[arg(long)]
    pub no_exclude: bool,
}

#[derive(Debug, Args, Clone)]
pub struct RunArgs {
    #[command(flatten)]
    pub panel: PanelArgs,

    /// Study configuration JSON; missing fields use the default study.
    #[arg(long, value_name = "JSON")]
    pub study: Option<PathBuf>,

    /// Output directory for tables, fits and figures.
    #[arg(long, default_value = "out")]
    pub outdir: PathBuf,

    /// Override the treated unit.
    #[arg(long)]
    pub treated: Option<String>,

    /// Override the pre-RMSPE filter multipliers (comma-separated).
    #[arg(long, value_delimiter = ',')]
    pub pre_mult: Option<Vec<f64>>,

    /// Override the minimum number of complete donors.
    #[arg(long)]
    pub min_donors: Option<usize>,

    /// Override the first month of both evaluation windows.
    #[arg(long, value_parser = parse_month)]
    pub date_min: Option<NaiveDate>,

    /// Override the last month of the fit window (end of post-1).
    #[arg(long, value_parser = parse_month)]
    pub fit_end: Option<NaiveDate>,

    /// Override the last month of the full window (end of post-2).
    #[arg(long, value_parser = parse_month)]
    pub full_end: Option<NaiveDate>,

    /// Log every skipped placebo donor at info level.
    #[arg(long)]
    pub verbose_placebos: bool,

    /// Do not write text figures.
    #[arg(long)]
    pub no_figures: bool,

    /// Figure width (columns).
    #[arg(long, default_value_t = 100)]
    pub width: usize,

    /// Figure height (rows).
    #[arg(long, default_value_t = 25)]
    pub height: usize,
}

#[derive(Debug, Args, Clone)]
pub struct FitArgs {
    #[command(flatten)]
    pub panel: PanelArgs,

    /// Treated unit id.
    #[arg(long, default_value = "CA")]
    pub treated: String,

    /// Outcome column.
    #[arg(long)]
    pub outcome: String,

    /// Intervention month (YYYY-MM or YYYY-MM-DD).
    #[arg(long, value_parser = parse_month)]
    pub t0: NaiveDate,

    /// First pre-period month.
    #[arg(long, value_parser = parse_month)]
    pub pre_start: NaiveDate,

    /// First month of both evaluation windows.
    #[arg(long, value_parser = parse_month, default_value = "2010-01")]
    pub date_min: NaiveDate,

    /// Last month of the fit window (end of post-1).
    #[arg(long, value_parser = parse_month, default_value = "2019-12")]
    pub fit_end: NaiveDate,

    /// Last month of the full window (end of post-2).
    #[arg(long, value_parser = parse_month, default_value = "2024-12")]
    pub full_end: NaiveDate,

    /// Minimum number of complete donors.
    #[arg(long, default_value_t = 5)]
    pub min_donors: usize,

    /// Donor pool (comma-separated). Defaults to every other unit in the panel.
    #[arg(long, value_delimiter = ',')]
    pub donors: Option<Vec<String>>,

    /// Disable the text plots.
    #[arg(long)]
    pub no_plot: bool,

    /// Plot width (columns).
    #[arg(long, default_value_t = 100)]
    pub width: usize,

    /// Plot height (rows).
    #[arg(long, default_value_t = 25)]
    pub height: usize,

    /// Export the weights table to CSV.
    #[arg(long)]
    pub export_weights: Option<PathBuf>,

    /// Export the full fit (series, weights, segments) to JSON.
    #[arg(long)]
    pub export_json: Option<PathBuf>,
}

#[derive(Debug, Args, Clone)]
pub struct SimulateArgs {
    /// Output panel CSV.
    #[arg(long, value_name = "CSV")]
    pub out: PathBuf,

    /// Number of months from 2010-01.
    #[arg(long, default_value_t = 180)]
    pub months: u32,

    /// Intervention month for the injected effect.
    #[arg(long, value_parser = parse_month, default_value = "2014-11")]
    pub t0: NaiveDate,

    /// Level shift added to the treated unit from t0 on.
    #[arg(long, default_value_t = 25.0)]
    pub effect: f64,

    /// Donor noise standard deviation.
    #[arg(long, default_value_t = 4.0)]
    pub noise: f64,

    /// Treated noise standard deviation.
    #[arg(long, default_value_t = 1.0)]
    pub treated_noise: f64,

    /// Random seed.
    #[arg(long, default_value_t = 47)]
    pub seed: u64,
}
