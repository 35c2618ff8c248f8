//! finsight: a multi-step financial analyst agent.
//!
//! Answers natural-language questions about a loan and transaction dataset
//! by planning, searching internal documents, querying SQL, running a pandas
//! analysis and writing a final answer. External services sit behind the
//! capability ports in [`ports`].

pub mod agent;
pub mod cli;
pub mod config;
pub mod error;
pub mod llm;
pub mod ports;
pub mod prompts;
pub mod retrieval;
pub mod sandbox;
pub mod store;
pub mod utils;

// Re-export commonly used types
pub use agent::{AnalystAgent, RunFailure, RunState};
pub use config::{AnalystConfig, ContextLimits};
pub use error::{ConfigError, ExecutionError, LlmError, QueryError, RetrievalError};
