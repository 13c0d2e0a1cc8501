//! `synth-control` library crate.
//!
//! Synthetic Control Method estimation: donor weights on the unit simplex,
//! segment diagnostics, and placebo-based inference.
//!
//! The binary (`scm`) is a thin wrapper around this library so that:
//!
//! - core logic is testable without spawning processes
//! - the estimator can be driven from other Rust code (batch jobs, notebooks)

pub mod app;
pub mod cli;
pub mod data;
pub mod domain;
pub mod error;
pub mod fit;
pub mod io;
pub mod math;
pub mod panel;
pub mod placebo;
pub mod plot;
pub mod report;
