//! The analyst agent.
//!
//! A run moves one query through five stages in a fixed order:
//!
//! 1. **Plan** - write a numbered analysis plan
//! 2. **Retrieve** - search internal documents for context
//! 3. **Query** - generate and execute one SQL query
//! 4. **Compute** - generate and run a pandas snippet over the tables
//! 5. **Synthesize** - write the final answer
//!
//! Each stage reads the outputs of earlier stages from [`RunState`] and
//! writes exactly one field plus one step record.

pub mod error;
pub mod events;
pub mod orchestrator;
pub mod stages;
pub mod state;

pub use error::{AgentBuildError, RunError, RunFailure, Stage, StageError};
pub use events::PipelineEvent;
pub use orchestrator::{AnalystAgent, AnalystAgentBuilder};
pub use state::{
    Completed, Computed, HasAnalysis, HasDocumentContext, HasPlan, HasSqlResults, Phase, Planned,
    Queried, Retrieved, RunMetadata, RunState, Started, Step, StepRecord,
};
