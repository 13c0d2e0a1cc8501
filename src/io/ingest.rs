//! CSV panel ingest.
//!
//! Turns a long-format CSV (one row per unit and month) into a validated `Panel`.
//!
//! - one unit column and one date column (names configurable)
//! - every other column is a numeric outcome
//! - bad rows are skipped and reported, never fatal unless nothing survives

use std::collections::HashMap;
use std::fs::File;
use std::path::Path;

use csv::StringRecord;
use tracing::{info, warn};

use crate::domain::parse_month;
use crate::error::AppError;
use crate::panel::{Panel, PanelRow};

pub const DEFAULT_UNIT_COLUMN: &str = "state_abb";
pub const DEFAULT_DATE_COLUMN: &str = "date";

/// Cell values read as missing (case-insensitive).
const MISSING_TOKENS: [&str; 5] = ["", "nan", "na", "null", "none"];

/// A row-level error encountered during ingest.
#[derive(Debug, Clone)]
pub struct RowError {
    pub line: usize,
    pub unit: Option<String>,
    pub message: String,
}

/// Ingest output: the panel plus what happened along the way.
#[derive(Debug, Clone)]
pub struct PanelIngest {
    pub panel: Panel,
    pub row_errors: Vec<RowError>,
    pub rows_read: usize,
    pub rows_used: usize,
    /// Rows repeating an earlier (unit, month) key; averaged downstream.
    pub duplicate_keys: usize,
}

/// Load a long-format panel CSV.
pub fn load_panel_csv(path: &Path, unit_col: &str, date_col: &str) -> Result<PanelIngest, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::new(2, format!("Failed to open panel CSV '{}': {e}", path.display())))?;

    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(file);

    let headers = reader
        .headers()
        .map_err(|e| AppError::new(2, format!("Failed to read CSV headers: {e}")))?
        .clone();
    let header_map = build_header_map(&headers);

    let unit_idx = required_column(&header_map, unit_col)?;
    let date_idx = required_column(&header_map, date_col)?;

    let mut row_errors = Vec::new();
    let mut records = Vec::new();
    let mut rows_read = 0usize;

    for (idx, result) in reader.records().enumerate() {
        // Header is line 1.
        let line = idx + 2;
        rows_read += 1;
        match result {
            Ok(r) => records.push((line, r)),
            Err(e) => row_errors.push(RowError {
                line,
                unit: None,
                message: format!("CSV parse error: {e}"),
            }),
        }
    }

    let mut outcome_cols: Vec<(String, usize)> = Vec::new();
    for (idx, name) in headers.iter().enumerate() {
        if idx == unit_idx || idx == date_idx {
            continue;
        }
        let name = normalize_header_name(name);
        if is_text_column(records.iter().map(|(_, r)| r.get(idx).unwrap_or(""))) {
            warn!(column = %name, "ignoring non-numeric column");
            continue;
        }
        outcome_cols.push((name, idx));
    }
    if outcome_cols.is_empty() {
        return Err(AppError::new(2, "Panel CSV has no numeric outcome columns."));
    }

    let mut rows = Vec::with_capacity(records.len());
    for (line, record) in &records {
        match parse_row(record, unit_idx, date_idx, &outcome_cols) {
            Ok(row) => rows.push(row),
            Err(message) => row_errors.push(RowError {
                line: *line,
                unit: record.get(unit_idx).filter(|s| !s.is_empty()).map(str::to_string),
                message,
            }),
        }
    }
    row_errors.sort_by_key(|e| e.line);

    for err in row_errors.iter().take(5) {
        warn!(line = err.line, unit = err.unit.as_deref().unwrap_or("-"), "skipped row: {}", err.message);
    }
    if row_errors.len() > 5 {
        warn!(count = row_errors.len(), "skipped rows in total");
    }

    let rows_used = rows.len();
    if rows_used == 0 {
        return Err(AppError::new(3, "No valid rows in panel CSV."));
    }

    let outcomes = outcome_cols.into_iter().map(|(name, _)| name).collect();
    let panel = Panel::new(outcomes, rows)?;

    let duplicate_keys = panel.duplicate_keys();
    if duplicate_keys > 0 {
        warn!(duplicate_keys, "duplicate (unit, month) rows will be averaged");
    }
    info!(
        path = %path.display(),
        rows_read,
        rows_used,
        units = panel.units().len(),
        "panel loaded"
    );

    Ok(PanelIngest {
        panel,
        row_errors,
        rows_read,
        rows_used,
        duplicate_keys,
    })
}

fn build_header_map(headers: &StringRecord) -> HashMap<String, usize> {
    headers
        .iter()
        .enumerate()
        .map(|(idx, name)| (normalize_header_name(name), idx))
        .collect()
}

fn normalize_header_name(name: &str) -> String {
    // Spreadsheet exports may prefix the first header with a UTF-8 BOM.
    let name = name.trim().trim_start_matches('\u{feff}');
    name.to_ascii_lowercase()
}

fn required_column(header_map: &HashMap<String, usize>, name: &str) -> Result<usize, AppError> {
    header_map
        .get(&normalize_header_name(name))
        .copied()
        .ok_or_else(|| AppError::new(2, format!("Missing required column: `{name}`")))
}

fn parse_row(
    record: &StringRecord,
    unit_idx: usize,
    date_idx: usize,
    outcome_cols: &[(String, usize)],
) -> Result<PanelRow, String> {
    let unit = record.get(unit_idx).unwrap_or("").to_string();
    if unit.is_empty() {
        return Err("Missing unit id".to_string());
    }

    let raw_date = record.get(date_idx).unwrap_or("");
    let date = parse_month(raw_date)?;

    let values = outcome_cols
        .iter()
        .map(|(name, idx)| parse_value(record.get(*idx).unwrap_or(""), name))
        .collect::<Result<Vec<f64>, String>>()?;

    Ok(PanelRow { unit, date, values })
}

/// A column with at least one present cell and no parseable number.
fn is_text_column<'a>(cells: impl Iterator<Item = &'a str>) -> bool {
    let mut present = false;
    for cell in cells.map(str::trim) {
        if MISSING_TOKENS.iter().any(|t| cell.eq_ignore_ascii_case(t)) {
            continue;
        }
        if cell.parse::<f64>().is_ok() {
            return false;
        }
        present = true;
    }
    present
}

fn parse_value(raw: &str, column: &str) -> Result<f64, String> {
    let raw = raw.trim();
    if MISSING_TOKENS.iter().any(|t| raw.eq_ignore_ascii_case(t)) {
        return Ok(f64::NAN);
    }
    raw.parse::<f64>()
        .map_err(|_| format!("Invalid number '{raw}' in column `{column}`"))
}
