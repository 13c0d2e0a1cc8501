use chrono::NaiveDate;
use thiserror::Error;

/// Which class of failure a fit call hit.
///
/// The placebo engine uses this to decide what to log; every class is
/// recoverable per donor there, and fatal for a single treated fit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Malformed windows, ill-shaped matrices, non-finite required values, unknown units/columns.
    InputValidity,
    /// Too few donors survive completeness filtering.
    InsufficientData,
    /// Every solver backend failed to return a usable solution.
    Optimization,
    /// Weights collapse to a zero sum.
    Degeneracy,
}

/// Typed failure of the estimation core (panel accessor, weight solver, fit orchestrator).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ScmError {
    #[error("Bad window: pre_start={pre_start} must be < t0={t0}")]
    InvalidWindow { pre_start: NaiveDate, t0: NaiveDate },

    #[error("Empty matrix: rows={rows}, cols={cols}")]
    EmptyMatrix { rows: usize, cols: usize },

    #[error("Shape mismatch: expected {expected} values, found {found}")]
    ShapeMismatch { expected: usize, found: usize },

    #[error("Non-finite values in {context} (NaN/Inf)")]
    NonFinite { context: &'static str },

    #[error("Treated unit '{unit}' missing from panel ({window})")]
    TreatedMissing { unit: String, window: &'static str },

    #[error("Unit '{unit}' missing from panel ({window})")]
    UnitMissing { unit: String, window: &'static str },

    #[error("Unknown outcome column '{column}'")]
    UnknownOutcome { column: String },

    #[error("No pre-period rows after date filtering")]
    NoPrePeriodRows,

    #[error("Too few complete donors in fit window: {found} (<{required})")]
    InsufficientDonors { found: usize, required: usize },

    #[error("SCM optimization failed: status={status}")]
    SolverFailed { status: String },

    #[error("Degenerate weights (sum={sum})")]
    DegenerateWeights { sum: f64 },
}

impl ScmError {
    pub fn kind(&self) -> FailureKind {
        match self {
            ScmError::InvalidWindow { .. }
            | ScmError::EmptyMatrix { .. }
            | ScmError::ShapeMismatch { .. }
            | ScmError::NonFinite { .. }
            | ScmError::TreatedMissing { .. }
            | ScmError::UnitMissing { .. }
            | ScmError::UnknownOutcome { .. }
            | ScmError::NoPrePeriodRows => FailureKind::InputValidity,
            ScmError::InsufficientDonors { .. } => FailureKind::InsufficientData,
            ScmError::SolverFailed { .. } => FailureKind::Optimization,
            ScmError::DegenerateWeights { .. } => FailureKind::Degeneracy,
        }
    }
}

pub type ScmResult<T> = Result<T, ScmError>;

#[derive(Clone)]
pub struct AppError {
    exit_code: u8,
    message: String,
}

impl AppError {
    pub fn new(exit_code: u8, message: impl Into<String>) -> Self {
        Self {
            exit_code,
            message: message.into(),
        }
    }

    pub fn exit_code(&self) -> u8 {
        self.exit_code
    }
}

impl From<ScmError> for AppError {
    fn from(err: ScmError) -> Self {
        let exit_code = match err.kind() {
            FailureKind::InputValidity => 2,
            FailureKind::InsufficientData => 3,
            FailureKind::Optimization | FailureKind::Degeneracy => 4,
        };
        AppError::new(exit_code, err.to_string())
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::fmt::Debug for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppError")
            .field("exit_code", &self.exit_code)
            .field("message", &self.message)
            .finish()
    }
}

impl std::error::Error for AppError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scm_errors_map_to_exit_codes_by_kind() {
        let insufficient: AppError = ScmError::InsufficientDonors { found: 2, required: 5 }.into();
        assert_eq!(insufficient.exit_code(), 3);
        assert_eq!(insufficient.to_string(), "Too few complete donors in fit window: 2 (<5)");

        let degenerate: AppError = ScmError::DegenerateWeights { sum: 0.0 }.into();
        assert_eq!(degenerate.exit_code(), 4);

        let missing: AppError = ScmError::NoPrePeriodRows.into();
        assert_eq!(missing.exit_code(), 2);
    }
}
