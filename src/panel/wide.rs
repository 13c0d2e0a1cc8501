//! Date-indexed wide matrix (rows = months, columns = units).

use chrono::NaiveDate;
use nalgebra::{DMatrix, DVector};

use crate::error::{ScmError, ScmResult};

#[derive(Debug, Clone, PartialEq)]
pub struct WideMatrix {
    dates: Vec<NaiveDate>,
    units: Vec<String>,
    values: DMatrix<f64>,
}

impl WideMatrix {
    pub(crate) fn new(dates: Vec<NaiveDate>, units: Vec<String>, values: DMatrix<f64>) -> Self {
        debug_assert_eq!(values.nrows(), dates.len());
        debug_assert_eq!(values.ncols(), units.len());
        Self {
            dates,
            units,
            values,
        }
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn units(&self) -> &[String] {
        &self.units
    }

    pub fn values(&self) -> &DMatrix<f64> {
        &self.values
    }

    pub fn nrows(&self) -> usize {
        self.values.nrows()
    }

    pub fn value(&self, row: usize, col: usize) -> f64 {
        self.values[(row, col)]
    }

    pub fn column_index(&self, unit: &str) -> Option<usize> {
        self.units.iter().position(|u| u == unit)
    }

    pub fn has_unit(&self, unit: &str) -> bool {
        self.column_index(unit).is_some()
    }

    /// Mask of rows whose date falls in the half-open range `[start, end)`.
    pub fn date_mask(&self, start: NaiveDate, end: NaiveDate) -> Vec<bool> {
        self.dates.iter().map(|&d| d >= start && d < end).collect()
    }

    /// Values of `unit` on the masked rows, in date order.
    pub fn masked_column(&self, unit: &str, mask: &[bool]) -> Option<DVector<f64>> {
        let col = self.column_index(unit)?;
        let vals: Vec<f64> = mask
            .iter()
            .enumerate()
            .filter(|(_, keep)| **keep)
            .map(|(i, _)| self.values[(i, col)])
            .collect();
        Some(DVector::from_vec(vals))
    }

    /// `rows(mask) × units` sub-matrix, columns in the order given.
    pub fn masked_block(&self, units: &[String], mask: &[bool]) -> ScmResult<DMatrix<f64>> {
        let cols = self.column_positions(units, "sub-matrix")?;
        let rows: Vec<usize> = mask
            .iter()
            .enumerate()
            .filter(|(_, keep)| **keep)
            .map(|(i, _)| i)
            .collect();
        Ok(DMatrix::from_fn(rows.len(), cols.len(), |i, j| {
            self.values[(rows[i], cols[j])]
        }))
    }

    /// True when every value of `unit` is finite (on masked rows only, if a mask is given).
    pub fn column_is_finite(&self, unit: &str, mask: Option<&[bool]>) -> bool {
        let Some(col) = self.column_index(unit) else {
            return false;
        };
        self.values
            .column(col)
            .iter()
            .enumerate()
            .filter(|(i, _)| mask.map_or(true, |m| m[*i]))
            .all(|(_, v)| v.is_finite())
    }

    /// Restrict to the given columns (in that order) and drop every month where
    /// any of them is non-finite.
    pub fn complete_rows(&self, units: &[String]) -> ScmResult<WideMatrix> {
        let cols = self.column_positions(units, "evaluation window")?;
        let keep: Vec<usize> = (0..self.nrows())
            .filter(|&i| cols.iter().all(|&c| self.values[(i, c)].is_finite()))
            .collect();

        let values = DMatrix::from_fn(keep.len(), cols.len(), |i, j| {
            self.values[(keep[i], cols[j])]
        });
        Ok(WideMatrix::new(
            keep.iter().map(|&i| self.dates[i]).collect(),
            units.to_vec(),
            values,
        ))
    }

    fn column_positions(&self, units: &[String], window: &'static str) -> ScmResult<Vec<usize>> {
        units
            .iter()
            .map(|u| {
                self.column_index(u).ok_or_else(|| ScmError::UnitMissing {
                    unit: u.clone(),
                    window,
                })
            })
            .collect()
    }
}
