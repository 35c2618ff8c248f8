//! Error types for pipeline runs.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use super::state::RunMetadata;
use crate::error::LlmError;

/// The five pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Plan,
    Retrieve,
    Query,
    Compute,
    Synthesize,
}

impl Stage {
    pub const ALL: [Stage; 5] = [
        Stage::Plan,
        Stage::Retrieve,
        Stage::Query,
        Stage::Compute,
        Stage::Synthesize,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Plan => "plan",
            Stage::Retrieve => "retrieve",
            Stage::Query => "query",
            Stage::Compute => "compute",
            Stage::Synthesize => "synthesize",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stage could not produce its output because text generation failed.
#[derive(Debug, Error)]
#[error("Stage '{stage}' failed: {source}")]
pub struct StageError {
    pub stage: Stage,
    #[source]
    pub source: LlmError,
}

impl StageError {
    pub fn new(stage: Stage, source: LlmError) -> Self {
        Self { stage, source }
    }
}

/// Why a run did not complete.
#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Stage(#[from] StageError),

    #[error("Run exceeded its deadline of {budget:?}")]
    DeadlineExceeded { budget: Duration },
}

impl RunError {
    /// The stage that failed, if the failure came from a stage.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            RunError::Stage(e) => Some(e.stage),
            RunError::DeadlineExceeded { .. } => None,
        }
    }
}

/// Errors from assembling an [`crate::agent::AnalystAgent`].
#[derive(Debug, Error)]
pub enum AgentBuildError {
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    #[error(transparent)]
    InvalidLimits(#[from] crate::error::ConfigError),
}

/// A failed run: its identity, final metadata (`success == false`, `error`
/// set) and the cause. Partial stage outputs are not kept.
#[derive(Debug, Error)]
#[error("Run {run_id} failed: {error}")]
pub struct RunFailure {
    pub run_id: Uuid,
    pub query: String,
    pub metadata: RunMetadata,
    #[source]
    pub error: RunError,
}
