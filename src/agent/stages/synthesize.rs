//! Stage 5: write the narrative answer from everything gathered.

use crate::agent::error::{Stage, StageError};
use crate::agent::state::{Completed, Computed, RunState};
use crate::config::ContextLimits;
use crate::ports::TextGenerator;
use crate::prompts::{build_synthesis_prompt, SynthesisInputs};
use crate::utils::truncate_chars;

pub async fn run(
    state: RunState<Computed>,
    generator: &dyn TextGenerator,
    limits: &ContextLimits,
) -> Result<RunState<Completed>, StageError> {
    let prompt = build_synthesis_prompt(SynthesisInputs {
        query: state.query(),
        plan: state.analysis_plan(),
        document_context: truncate_chars(state.document_context(), limits.document_context_chars),
        sql_results: truncate_chars(state.sql_results(), limits.sql_prompt_chars),
        analysis: state.analysis_results(),
    });

    let answer = generator
        .generate(prompt.system, &prompt.user)
        .await
        .map_err(|e| StageError::new(Stage::Synthesize, e))?;

    Ok(state.record_final_answer(answer))
}
