//! Shared utility functions for finsight.
//!
//! Text helpers used by the pipeline stages to bound prompt sizes and to
//! clean up generated code before it is executed.

pub mod text;

pub use text::{strip_code_fences, truncate_chars};
