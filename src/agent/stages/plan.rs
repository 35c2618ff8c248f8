//! Stage 1: turn the question into a short numbered analysis plan.

use crate::agent::error::{Stage, StageError};
use crate::agent::state::{Planned, RunState, Started};
use crate::ports::TextGenerator;
use crate::prompts::build_plan_prompt;

pub async fn run(
    state: RunState<Started>,
    generator: &dyn TextGenerator,
) -> Result<RunState<Planned>, StageError> {
    let prompt = build_plan_prompt(state.query());
    let plan = generator
        .generate(prompt.system, &prompt.user)
        .await
        .map_err(|e| StageError::new(Stage::Plan, e))?;

    let message = format!("**Analysis Plan:**\n{}", plan);
    Ok(state.record_plan(plan, message))
}
