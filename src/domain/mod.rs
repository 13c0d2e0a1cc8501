//! Domain types used throughout the pipeline.
//!
//! This module defines:
//!
//! - month calendar helpers (`month_start`, `prev_month`, ...)
//! - the immutable fit inputs (`FitSpec`, `EventWindows`)
//! - fit and placebo outputs (`FitResult`, `SegmentStats`, `PlaceboRecord`, ...)
//! - the study configuration and its summary rows

pub mod calendar;
pub mod types;

pub use calendar::*;
pub use types::*;
