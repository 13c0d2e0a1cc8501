//! Synthetic-control estimation for a single treated unit.
//!
//! Responsibilities:
//!
//! - solve simplex-constrained donor weights (primary + fallback backend)
//! - summarize the treated-minus-synthetic gap over calendar segments
//! - orchestrate one full fit from panel to `FitResult`

pub mod fitter;
pub mod segments;
pub mod weights;

pub use fitter::*;
pub use segments::*;
pub use weights::*;
