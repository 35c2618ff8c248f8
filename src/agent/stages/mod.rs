//! The five stage functions.
//!
//! Each takes the run state by value plus the ports it needs and returns
//! the state advanced by exactly one phase. Stages never call each other;
//! sequencing belongs to [`crate::agent::AnalystAgent`].

pub mod compute;
pub mod plan;
pub mod query;
pub mod retrieve;
pub mod synthesize;

pub use compute::{
    resolve_analysis, AnalysisAttempt, DIRECT_FALLBACK_PREFIX, FAILURE_MARKER,
    SKIPPED_FALLBACK_PREFIX,
};
pub use retrieve::{format_passages, NO_DOCUMENTS_FOUND};
