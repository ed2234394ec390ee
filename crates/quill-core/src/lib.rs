//! Quill Core
//!
//! Logging, profiling and matrix helpers shared by the Quill crates.

pub mod logging;
pub mod math;
pub mod profiling;
