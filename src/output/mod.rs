//! Report rendering
//!
//! - [`text`]: the human-readable summary printed at the end of every run
//! - [`json`]: an optional machine-readable report written to a file

pub mod json;
pub mod text;
