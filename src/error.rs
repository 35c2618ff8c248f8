//! Error types for finsight operations.
//!
//! Defines the error types for each capability port and for the pipeline:
//! - Text generation (LLM API interactions)
//! - Tabular query execution
//! - Passage retrieval
//! - Sandboxed code execution
//! - Configuration loading and validation

use thiserror::Error;

/// Errors that can occur during LLM operations.
///
/// This is the generation port's failure mode. The pipeline treats it as
/// fatal everywhere except inside the compute stage.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("Missing API base URL: LITELLM_API_BASE environment variable not set")]
    MissingApiBase,

    #[error("HTTP request failed: {0}")]
    RequestFailed(String),

    #[error("Failed to parse LLM response: {0}")]
    ParseError(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("API error ({code}): {message}")]
    ApiError { code: u16, message: String },
}

/// Errors that can occur while executing a query against the tabular store.
///
/// The display text of every variant starts with `Error executing query:`
/// because the query stage forwards it verbatim into the next prompts.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("Error executing query: {0}")]
    Sql(#[from] sqlx::Error),

    #[error("Error executing query: empty query")]
    EmptyQuery,

    #[error("Error executing query: unsupported value in column '{column}': {message}")]
    Decode { column: String, message: String },
}

/// Errors that can occur while searching the document index.
#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("Document directory not found: {0}")]
    MissingCorpus(String),

    #[error("Failed to read document '{path}': {message}")]
    ReadFailed { path: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that can occur while executing a generated analysis snippet.
#[derive(Debug, Error)]
pub enum ExecutionError {
    /// The snippet ran and raised.
    #[error("Error in analysis: {0}")]
    Failed(String),

    /// The snippet ran to completion without binding the output variable.
    #[error("Code executed but no '{variable}' variable was set.")]
    MissingOutput { variable: String },

    #[error("Analysis execution timed out after {seconds} seconds")]
    Timeout { seconds: u64 },

    /// The interpreter or sandbox could not be started at all.
    #[error("Analysis sandbox unavailable: {0}")]
    Unavailable(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ExecutionError {
    /// Returns true when the snippet itself ran and reported a failure,
    /// as opposed to the port failing to run it.
    pub fn is_reported_failure(&self) -> bool {
        matches!(
            self,
            ExecutionError::Failed(_) | ExecutionError::MissingOutput { .. }
        )
    }
}

/// Errors that can occur while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An environment variable has an invalid value.
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    /// Configuration validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
