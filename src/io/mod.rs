//! Input/output helpers.
//!
//! - panel CSV ingest + validation (`ingest`)
//! - study configuration JSON (`study`)
//! - table and fit exports (CSV/JSON) (`export`)

pub mod export;
pub mod ingest;
pub mod study;

pub use export::*;
pub use ingest::*;
pub use study::*;
