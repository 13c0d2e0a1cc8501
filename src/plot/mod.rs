//! Text plots for the terminal and for figure files.

pub mod ascii;

pub use ascii::*;
