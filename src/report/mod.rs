//! Reporting utilities: fit, weights, placebo and study summaries for the terminal.

pub mod format;

pub use format::*;
