//! Stage 4: generate and run a pandas snippet over the two tables.
//!
//! This stage never fails the run. Whatever goes wrong, the analysis field
//! ends up holding either the snippet output or a substitute built from the
//! SQL results:
//!
//! 1. the snippet ran and its output does not carry the failure marker:
//!    the output;
//! 2. the snippet reported a failure (raised, or bound no `result`) and SQL
//!    results exist: [`DIRECT_FALLBACK_PREFIX`] plus the leading SQL results;
//! 3. the code could not be produced or run at all (generation error, table
//!    load error, timeout, sandbox unavailable) and SQL results exist:
//!    [`SKIPPED_FALLBACK_PREFIX`] plus the leading SQL results;
//! 4. otherwise whatever text is available.

use tracing::{debug, warn};

use crate::agent::state::{Computed, Queried, RunState};
use crate::config::ContextLimits;
use crate::error::ExecutionError;
use crate::ports::{BoundTables, CodeExecutor, QueryExecutor, TextGenerator};
use crate::prompts::build_analysis_prompt;
use crate::utils::{strip_code_fences, truncate_chars};

/// Text marking a failed analysis inside otherwise successful output.
pub const FAILURE_MARKER: &str = "Error in analysis";

pub const DIRECT_FALLBACK_PREFIX: &str = "Using SQL results directly: ";
pub const SKIPPED_FALLBACK_PREFIX: &str = "Analysis step skipped. Using SQL results: ";

/// Tables bound into every snippet, by variable name.
pub const BOUND_TABLE_QUERIES: &[(&str, &str)] = &[
    ("loans_df", "SELECT * FROM loans"),
    ("transactions_df", "SELECT * FROM transactions"),
];

/// What happened when the stage tried to produce an analysis.
#[derive(Debug)]
pub enum AnalysisAttempt {
    /// The snippet ran and produced output.
    Output(String),
    /// The snippet ran and reported a failure.
    Reported(ExecutionError),
    /// No snippet result could be obtained; carries the error text.
    Unavailable(String),
}

pub async fn run(
    state: RunState<Queried>,
    generator: &dyn TextGenerator,
    tables: &dyn QueryExecutor,
    executor: &dyn CodeExecutor,
    limits: &ContextLimits,
) -> RunState<Computed> {
    let attempt = attempt_analysis(&state, generator, tables, executor, limits).await;
    match &attempt {
        AnalysisAttempt::Output(_) => {}
        AnalysisAttempt::Reported(e) => {
            warn!(run_id = %state.run_id(), error = %e, "Analysis snippet failed")
        }
        AnalysisAttempt::Unavailable(e) => {
            warn!(run_id = %state.run_id(), error = %e, "Analysis step skipped")
        }
    }

    let analysis = resolve_analysis(attempt, state.sql_results(), limits.fallback_sql_chars);
    let message = format!("**Statistical Analysis:**\n{}", analysis);
    state.record_analysis(analysis, message)
}

async fn attempt_analysis(
    state: &RunState<Queried>,
    generator: &dyn TextGenerator,
    tables: &dyn QueryExecutor,
    executor: &dyn CodeExecutor,
    limits: &ContextLimits,
) -> AnalysisAttempt {
    let prompt = build_analysis_prompt(
        truncate_chars(state.sql_results(), limits.sql_prompt_chars),
        state.analysis_plan(),
    );
    let snippet = match generator.generate(prompt.system, &prompt.user).await {
        Ok(raw) => strip_code_fences(&raw),
        Err(e) => return AnalysisAttempt::Unavailable(e.to_string()),
    };

    let mut bound = BoundTables::new();
    for (name, query) in BOUND_TABLE_QUERIES {
        match tables.execute_query(query).await {
            Ok(table) => {
                bound.insert(name.to_string(), table);
            }
            Err(e) => return AnalysisAttempt::Unavailable(e.to_string()),
        }
    }

    debug!(run_id = %state.run_id(), chars = snippet.chars().count(), "Executing analysis snippet");
    match executor.execute(&snippet, &bound).await {
        Ok(output) => AnalysisAttempt::Output(output),
        Err(e) if e.is_reported_failure() => AnalysisAttempt::Reported(e),
        Err(e) => AnalysisAttempt::Unavailable(e.to_string()),
    }
}

/// Applies the fallback ladder to an attempt.
pub fn resolve_analysis(attempt: AnalysisAttempt, sql_results: &str, fallback_chars: usize) -> String {
    let has_sql = !sql_results.is_empty();
    let leading_sql = || truncate_chars(sql_results, fallback_chars);

    match attempt {
        AnalysisAttempt::Output(output) if !output.contains(FAILURE_MARKER) => output,
        AnalysisAttempt::Output(_) | AnalysisAttempt::Reported(_) if has_sql => {
            format!("{}{}", DIRECT_FALLBACK_PREFIX, leading_sql())
        }
        AnalysisAttempt::Output(output) => output,
        AnalysisAttempt::Reported(e) => e.to_string(),
        AnalysisAttempt::Unavailable(_) if has_sql => {
            format!("{}{}", SKIPPED_FALLBACK_PREFIX, leading_sql())
        }
        AnalysisAttempt::Unavailable(message) => message,
    }
}
