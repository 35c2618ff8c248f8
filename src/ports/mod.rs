//! Capability ports: the interfaces the pipeline needs from its external
//! collaborators.
//!
//! Each port is a single request/response operation with a defined failure
//! mode. Implementations are shared between concurrent runs behind
//! `Arc<dyn ...>`, so they must be `Send + Sync` and safe for concurrent
//! read-only use. Any caching they do (a lazily built index, a connection
//! pool) is their own business; the pipeline never mutates port state.
//!
//! Default adapters live in [`crate::llm`], [`crate::store`],
//! [`crate::retrieval`] and [`crate::sandbox`].

pub mod tabular;

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{ExecutionError, LlmError, QueryError, RetrievalError};

pub use tabular::{CellValue, TabularResult, DEFAULT_RENDER_ROW_CAP};

/// Name of the variable a generated snippet must bind its output to.
pub const OUTPUT_VARIABLE: &str = "result";

/// Named tables bound into a code execution, keyed by the exact variable
/// name the snippet refers to.
pub type BoundTables = BTreeMap<String, TabularResult>;

/// Text generation with role framing.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Generates text for `user_prompt` under the `system_role` instruction.
    async fn generate(&self, system_role: &str, user_prompt: &str) -> Result<String, LlmError>;

    /// Model identifier recorded in run metadata.
    fn model_name(&self) -> &str {
        "unknown"
    }
}

/// Query execution against the tabular store.
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    async fn execute_query(&self, query: &str) -> Result<TabularResult, QueryError>;
}

/// A retrieved excerpt with source attribution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Passage {
    /// Identifier of the source document, rendered verbatim in prompts.
    pub source_id: String,
    pub excerpt: String,
    /// Similarity score; higher is more relevant.
    #[serde(default)]
    pub score: f64,
}

impl Passage {
    pub fn new(source_id: impl Into<String>, excerpt: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            excerpt: excerpt.into(),
            score: 0.0,
        }
    }
}

/// Passage retrieval over the document corpus.
#[async_trait]
pub trait PassageRetriever: Send + Sync {
    /// Returns at most `k` passages, most relevant first.
    ///
    /// An empty vector is a valid answer: nothing indexed, or nothing above
    /// the relevance threshold.
    async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<Passage>, RetrievalError>;
}

/// Execution of a generated snippet against named tables.
#[async_trait]
pub trait CodeExecutor: Send + Sync {
    /// Runs `snippet` with `tables` bound and returns the textual value of
    /// [`OUTPUT_VARIABLE`].
    ///
    /// Returns [`ExecutionError::MissingOutput`] when the snippet finishes
    /// without binding the output variable, and [`ExecutionError::Failed`]
    /// when the snippet itself raises.
    async fn execute(&self, snippet: &str, tables: &BoundTables) -> Result<String, ExecutionError>;
}
