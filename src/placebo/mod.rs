//! Placebo inference.
//!
//! - re-fit each donor as a pseudo-treated unit (parallel, order-preserving)
//! - filter placebos by pre-period fit quality
//! - add-one empirical p-values for the post/pre error ratios

pub mod engine;
pub mod pvalue;

pub use engine::*;
pub use pvalue::*;
