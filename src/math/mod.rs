//! Mathematical utilities: simplex projection and small finite-value statistics.

pub mod simplex;
pub mod stats;

pub use simplex::*;
pub use stats::*;
