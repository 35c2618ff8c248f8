//! Stage 3: generate one SQL query from the plan and run it.

use tracing::{debug, warn};

use crate::agent::error::{Stage, StageError};
use crate::agent::state::{Queried, RunState, Retrieved};
use crate::config::ContextLimits;
use crate::ports::{QueryExecutor, TextGenerator};
use crate::prompts::build_sql_prompt;
use crate::utils::{strip_code_fences, truncate_chars};

pub async fn run(
    state: RunState<Retrieved>,
    generator: &dyn TextGenerator,
    executor: &dyn QueryExecutor,
    limits: &ContextLimits,
) -> Result<RunState<Queried>, StageError> {
    let prompt = build_sql_prompt(state.analysis_plan());
    let raw = generator
        .generate(prompt.system, &prompt.user)
        .await
        .map_err(|e| StageError::new(Stage::Query, e))?;
    let sql = strip_code_fences(&raw);
    debug!(run_id = %state.run_id(), query = %truncate_chars(&sql, 100), "Executing SQL");

    // Execution errors are data for the later stages, not a run failure.
    let results = match executor.execute_query(&sql).await {
        Ok(table) => table.rendered().to_string(),
        Err(e) => {
            warn!(run_id = %state.run_id(), error = %e, "SQL execution failed");
            e.to_string()
        }
    };

    let message = format!(
        "**SQL Query:**\n```sql\n{}\n```\n\n**Results:** Retrieved data successfully.",
        truncate_chars(&sql, limits.logged_query_chars)
    );
    Ok(state.record_sql_results(results, message))
}
