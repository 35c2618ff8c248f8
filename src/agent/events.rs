//! Progress events emitted while a run is in flight.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::Stage;

/// Events emitted during a run for progress display.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PipelineEvent {
    /// A stage has started.
    StageStarted {
        run_id: Uuid,
        stage: Stage,
        timestamp: DateTime<Utc>,
    },
    /// A stage has produced its output.
    StageCompleted {
        run_id: Uuid,
        stage: Stage,
        timestamp: DateTime<Utc>,
    },
    /// A stage failed and the run stops.
    StageFailed {
        run_id: Uuid,
        stage: Stage,
        error: String,
        timestamp: DateTime<Utc>,
    },
    /// The run finished with an answer.
    RunCompleted {
        run_id: Uuid,
        duration_secs: f64,
        timestamp: DateTime<Utc>,
    },
    /// The run failed.
    RunFailed {
        run_id: Uuid,
        error: String,
        timestamp: DateTime<Utc>,
    },
}

impl PipelineEvent {
    pub fn stage_started(run_id: Uuid, stage: Stage) -> Self {
        PipelineEvent::StageStarted {
            run_id,
            stage,
            timestamp: Utc::now(),
        }
    }

    pub fn stage_completed(run_id: Uuid, stage: Stage) -> Self {
        PipelineEvent::StageCompleted {
            run_id,
            stage,
            timestamp: Utc::now(),
        }
    }

    pub fn stage_failed(run_id: Uuid, stage: Stage, error: impl Into<String>) -> Self {
        PipelineEvent::StageFailed {
            run_id,
            stage,
            error: error.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn run_completed(run_id: Uuid, duration_secs: f64) -> Self {
        PipelineEvent::RunCompleted {
            run_id,
            duration_secs,
            timestamp: Utc::now(),
        }
    }

    pub fn run_failed(run_id: Uuid, error: impl Into<String>) -> Self {
        PipelineEvent::RunFailed {
            run_id,
            error: error.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn run_id(&self) -> Uuid {
        match self {
            PipelineEvent::StageStarted { run_id, .. }
            | PipelineEvent::StageCompleted { run_id, .. }
            | PipelineEvent::StageFailed { run_id, .. }
            | PipelineEvent::RunCompleted { run_id, .. }
            | PipelineEvent::RunFailed { run_id, .. } => *run_id,
        }
    }

    /// The stage this event refers to, if it is a stage event.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            PipelineEvent::StageStarted { stage, .. }
            | PipelineEvent::StageCompleted { stage, .. }
            | PipelineEvent::StageFailed { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}
