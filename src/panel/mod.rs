//! Long-format panel storage and the wide-matrix accessor.
//!
//! The panel is validated once at construction (fixed outcome schema, month-start
//! dates); downstream code only ever asks for a wide `dates × units` view of a
//! single outcome column over a date range.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use chrono::NaiveDate;
use nalgebra::DMatrix;

use crate::domain::month_start;
use crate::error::{ScmError, ScmResult};

pub mod wide;

pub use wide::WideMatrix;

/// One observation: a unit in a month, with one value per outcome column.
#[derive(Debug, Clone, PartialEq)]
pub struct PanelRow {
    pub unit: String,
    pub date: NaiveDate,
    /// Outcome values in `Panel::outcomes()` order; NaN means missing.
    pub values: Vec<f64>,
}

/// A typed long-format panel keyed by (unit, month).
#[derive(Debug, Clone, PartialEq)]
pub struct Panel {
    outcomes: Vec<String>,
    rows: Vec<PanelRow>,
}

impl Panel {
    /// Validate and build a panel. Row dates are normalized to month start.
    pub fn new(outcomes: Vec<String>, rows: Vec<PanelRow>) -> ScmResult<Self> {
        if outcomes.is_empty() {
            return Err(ScmError::EmptyMatrix {
                rows: rows.len(),
                cols: 0,
            });
        }

        let width = outcomes.len();
        let mut normalized = Vec::with_capacity(rows.len());
        for mut row in rows {
            if row.values.len() != width {
                return Err(ScmError::ShapeMismatch {
                    expected: width,
                    found: row.values.len(),
                });
            }
            row.date = month_start(row.date);
            normalized.push(row);
        }

        Ok(Self {
            outcomes,
            rows: normalized,
        })
    }

    pub fn outcomes(&self) -> &[String] {
        &self.outcomes
    }

    pub fn rows(&self) -> &[PanelRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Sorted distinct unit ids.
    pub fn units(&self) -> Vec<String> {
        let set: BTreeSet<&str> = self.rows.iter().map(|r| r.unit.as_str()).collect();
        set.into_iter().map(str::to_string).collect()
    }

    pub fn outcome_index(&self, name: &str) -> ScmResult<usize> {
        self.outcomes
            .iter()
            .position(|c| c == name)
            .ok_or_else(|| ScmError::UnknownOutcome {
                column: name.to_string(),
            })
    }

    /// Copy of the panel without the given units.
    pub fn without_units(&self, excluded: &[String]) -> Panel {
        let excluded: HashSet<&str> = excluded.iter().map(String::as_str).collect();
        Panel {
            outcomes: self.outcomes.clone(),
            rows: self
                .rows
                .iter()
                .filter(|r| !excluded.contains(r.unit.as_str()))
                .cloned()
                .collect(),
        }
    }

    /// Number of rows that repeat an earlier (unit, month) key.
    pub fn duplicate_keys(&self) -> usize {
        let mut seen = HashSet::with_capacity(self.rows.len());
        self.rows
            .iter()
            .filter(|r| !seen.insert((r.unit.as_str(), r.date)))
            .count()
    }

    /// Wide view of one outcome: rows = sorted months in `[start, end]`,
    /// columns = requested units (caller order, duplicates dropped).
    ///
    /// Duplicate (unit, month) observations are averaged; NaN values are ignored.
    /// A month appears only if some requested unit has a value in it, and a unit
    /// column appears only if it has at least one value in the range.
    pub fn wide(
        &self,
        units: &[String],
        outcome: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> ScmResult<WideMatrix> {
        let idx = self.outcome_index(outcome)?;

        let mut col_of: HashMap<&str, usize> = HashMap::with_capacity(units.len());
        let mut requested: Vec<&str> = Vec::with_capacity(units.len());
        for u in units {
            if !col_of.contains_key(u.as_str()) {
                col_of.insert(u.as_str(), requested.len());
                requested.push(u.as_str());
            }
        }

        // (sum, count) per requested column, keyed by month.
        let mut cells: BTreeMap<NaiveDate, Vec<(f64, usize)>> = BTreeMap::new();
        for row in &self.rows {
            if row.date < start || row.date > end {
                continue;
            }
            let Some(&col) = col_of.get(row.unit.as_str()) else {
                continue;
            };
            let v = row.values[idx];
            if v.is_nan() {
                continue;
            }
            let acc = cells
                .entry(row.date)
                .or_insert_with(|| vec![(0.0, 0); requested.len()]);
            acc[col].0 += v;
            acc[col].1 += 1;
        }

        let present: Vec<usize> = (0..requested.len())
            .filter(|&c| cells.values().any(|acc| acc[c].1 > 0))
            .collect();

        let dates: Vec<NaiveDate> = cells.keys().copied().collect();
        let values = DMatrix::from_fn(dates.len(), present.len(), |i, j| {
            let (sum, n) = cells[&dates[i]][present[j]];
            if n == 0 { f64::NAN } else { sum / n as f64 }
        });

        Ok(WideMatrix::new(
            dates,
            present.iter().map(|&c| requested[c].to_string()).collect(),
            values,
        ))
    }
}
