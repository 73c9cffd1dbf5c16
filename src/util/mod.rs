//! Shared helpers
//!
//! - [`buffer`]: aligned IO buffers for O_DIRECT
//! - [`time`]: rate and duration formatting

pub mod buffer;
pub mod time;
