//! Table and JSON exports.
//!
//! Tables are plain CSV for spreadsheets and downstream scripts; the fit JSON
//! carries every series an external plotting tool needs. NaN is written as
//! `NaN` in CSV and `null` in JSON.

use std::fs::{self, File};
use std::io::BufWriter;
use std::path::Path;

use serde::Serialize;

use crate::domain::{FitResult, PlaceboRecord, SummaryRow};
use crate::error::AppError;
use crate::panel::Panel;

/// Column order of `DonorWeight` rows.
pub const WEIGHT_COLUMNS: [&str; 2] = ["donor", "weight"];

/// Column order of `PlaceboRecord` rows.
pub const PLACEBO_COLUMNS: [&str; 4] = ["unit", "pre_rmspe", "ratio_post1", "ratio_post2"];

/// Column order of `SummaryRow` rows.
pub const SUMMARY_COLUMNS: [&str; 29] = [
    "spec_id",
    "outcome",
    "t0",
    "pre_start",
    "date_min",
    "fit_end",
    "full_end",
    "n_donors_requested",
    "n_donors_complete_pre",
    "n_donors_active",
    "pre_rmspe",
    "post1_rmspe",
    "post2_rmspe",
    "ratio_post1",
    "ratio_post2",
    "avg_gap_post1",
    "avg_gap_covid",
    "avg_gap_post2",
    "n_months_pre",
    "n_months_post1",
    "n_months_covid",
    "n_months_post2",
    "n_placebos",
    "n_placebos_filtered",
    "pre_rmspe_mult",
    "pval_ratio_post1",
    "pval_ratio_post2",
    "solver_status",
    "solver_backend",
];

/// Donor weights, weight descending.
pub fn write_weights_csv(path: &Path, fit: &FitResult) -> Result<(), AppError> {
    write_csv_rows(path, &WEIGHT_COLUMNS, &fit.weights)
}

/// One row per placebo: unit, pre_rmspe, ratio_post1, ratio_post2.
///
/// An empty set still gets its header line.
pub fn write_placebos_csv(path: &Path, records: &[PlaceboRecord]) -> Result<(), AppError> {
    write_csv_rows(path, &PLACEBO_COLUMNS, records)
}

pub fn write_summary_csv(path: &Path, rows: &[SummaryRow]) -> Result<(), AppError> {
    write_csv_rows(path, &SUMMARY_COLUMNS, rows)
}

/// Full fit result as pretty JSON.
pub fn write_fit_json(path: &Path, fit: &FitResult) -> Result<(), AppError> {
    ensure_parent(path)?;
    let file = File::create(path)
        .map_err(|e| AppError::new(2, format!("Failed to create fit JSON '{}': {e}", path.display())))?;
    serde_json::to_writer_pretty(BufWriter::new(file), fit)
        .map_err(|e| AppError::new(2, format!("Failed to write fit JSON: {e}")))?;
    Ok(())
}

/// Long-format panel CSV, readable by `load_panel_csv`.
pub fn write_panel_csv(path: &Path, panel: &Panel, unit_col: &str, date_col: &str) -> Result<(), AppError> {
    ensure_parent(path)?;
    let mut writer = csv::Writer::from_path(path)
        .map_err(|e| AppError::new(2, format!("Failed to create panel CSV '{}': {e}", path.display())))?;

    let mut header = vec![unit_col.to_string(), date_col.to_string()];
    header.extend(panel.outcomes().iter().cloned());
    writer
        .write_record(&header)
        .map_err(|e| AppError::new(2, format!("Failed to write panel CSV header: {e}")))?;

    for row in panel.rows() {
        let mut record = vec![row.unit.clone(), row.date.to_string()];
        record.extend(row.values.iter().map(|v| if v.is_nan() { String::new() } else { format!("{v}") }));
        writer
            .write_record(&record)
            .map_err(|e| AppError::new(2, format!("Failed to write panel CSV row: {e}")))?;
    }

    writer
        .flush()
        .map_err(|e| AppError::new(2, format!("Failed to flush panel CSV: {e}")))
}

/// Header first, then one serialized record per row (header written even with no rows).
fn write_csv_rows<T: Serialize>(path: &Path, header: &[&str], rows: &[T]) -> Result<(), AppError> {
    ensure_parent(path)?;
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(path)
        .map_err(|e| AppError::new(2, format!("Failed to create CSV '{}': {e}", path.display())))?;
    writer
        .write_record(header)
        .map_err(|e| AppError::new(2, format!("Failed to write CSV header to '{}': {e}", path.display())))?;
    for row in rows {
        writer
            .serialize(row)
            .map_err(|e| AppError::new(2, format!("Failed to write CSV row to '{}': {e}", path.display())))?;
    }
    writer
        .flush()
        .map_err(|e| AppError::new(2, format!("Failed to flush CSV '{}': {e}", path.display())))
}

pub(crate) fn ensure_parent(path: &Path) -> Result<(), AppError> {
    match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => fs::create_dir_all(dir)
            .map_err(|e| AppError::new(2, format!("Failed to create directory '{}': {e}", dir.display()))),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{SimulationConfig, generate_panel};
    use crate::io::ingest::load_panel_csv;

    fn temp_dir(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("synth-control-export-{name}-{}", std::process::id()))
    }

    #[test]
    fn panel_csv_round_trips_through_ingest() {
        let cfg = SimulationConfig {
            months: 6,
            ..SimulationConfig::default()
        };
        let panel = generate_panel(&cfg).unwrap();
        let path = temp_dir("panel").join("panel.csv");
        write_panel_csv(&path, &panel, "state_abb", "date").unwrap();

        let back = load_panel_csv(&path, "state_abb", "date").unwrap();
        assert!(back.row_errors.is_empty());
        assert_eq!(back.panel.len(), panel.len());
        assert_eq!(back.panel.units(), panel.units());
        for (a, b) in back.panel.rows().iter().zip(panel.rows()) {
            assert_eq!(a.unit, b.unit);
            assert_eq!(a.date, b.date);
            assert_eq!(a.values[0], b.values[0]);
        }
    }

    #[test]
    fn placebo_table_writes_header_and_nan() {
        let path = temp_dir("placebo").join("tables").join("p.csv");
        let records = vec![PlaceboRecord {
            unit: "TX".to_string(),
            pre_rmspe: 1.5,
            ratio_post1: f64::NAN,
            ratio_post2: 2.0,
        }];
        write_placebos_csv(&path, &records).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some("unit,pre_rmspe,ratio_post1,ratio_post2"));
        assert_eq!(lines.next(), Some("TX,1.5,NaN,2.0"));
    }

    #[test]
    fn empty_tables_still_carry_their_header() {
        let dir = temp_dir("empty");
        let placebos = dir.join("filt.csv");
        write_placebos_csv(&placebos, &[]).unwrap();
        assert_eq!(
            fs::read_to_string(&placebos).unwrap(),
            "unit,pre_rmspe,ratio_post1,ratio_post2\n"
        );

        let summary = dir.join("summary.csv");
        write_summary_csv(&summary, &[]).unwrap();
        let text = fs::read_to_string(&summary).unwrap();
        assert_eq!(text.lines().count(), 1);
        assert!(text.starts_with("spec_id,outcome,t0,"));
        fs::remove_dir_all(&dir).ok();
    }

    fn serde_header<T: Serialize>(row: &T) -> String {
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.serialize(row).unwrap();
        let bytes = writer.into_inner().unwrap();
        String::from_utf8(bytes).unwrap().lines().next().unwrap().to_string()
    }

    #[test]
    fn column_lists_match_serialized_field_order() {
        let weight = crate::domain::DonorWeight {
            donor: "TX".to_string(),
            weight: 1.0,
        };
        assert_eq!(serde_header(&weight), WEIGHT_COLUMNS.join(","));

        let placebo = PlaceboRecord {
            unit: "TX".to_string(),
            pre_rmspe: 1.0,
            ratio_post1: 1.0,
            ratio_post2: 1.0,
        };
        assert_eq!(serde_header(&placebo), PLACEBO_COLUMNS.join(","));

        let day = chrono::NaiveDate::from_ymd_opt(2014, 11, 1).unwrap();
        let row = SummaryRow {
            spec_id: "S0_m2.0".to_string(),
            outcome: "theft".to_string(),
            t0: day,
            pre_start: day,
            date_min: day,
            fit_end: day,
            full_end: day,
            n_donors_requested: 1,
            n_donors_complete_pre: 1,
            n_donors_active: 1,
            pre_rmspe: 1.0,
            post1_rmspe: 1.0,
            post2_rmspe: 1.0,
            ratio_post1: 1.0,
            ratio_post2: 1.0,
            avg_gap_post1: 0.0,
            avg_gap_covid: 0.0,
            avg_gap_post2: 0.0,
            n_months_pre: 1,
            n_months_post1: 1,
            n_months_covid: 1,
            n_months_post2: 1,
            n_placebos: 0,
            n_placebos_filtered: 0,
            pre_rmspe_mult: 2.0,
            pval_ratio_post1: f64::NAN,
            pval_ratio_post2: f64::NAN,
            solver_status: "optimal".to_string(),
            solver_backend: "projected-gradient".to_string(),
        };
        assert_eq!(serde_header(&row), SUMMARY_COLUMNS.join(","));
    }
}
