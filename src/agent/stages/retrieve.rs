//! Stage 2: derive a causal search string and pull supporting passages.

use tracing::{debug, warn};

use crate::agent::error::{Stage, StageError};
use crate::agent::state::{Planned, RunState, Retrieved};
use crate::config::ContextLimits;
use crate::ports::{Passage, PassageRetriever, TextGenerator};
use crate::prompts::build_search_prompt;
use crate::utils::truncate_chars;

/// Document context when retrieval returns nothing.
pub const NO_DOCUMENTS_FOUND: &str = "No relevant information found in documents.";

pub async fn run(
    state: RunState<Planned>,
    generator: &dyn TextGenerator,
    retriever: &dyn PassageRetriever,
    limits: &ContextLimits,
) -> Result<RunState<Retrieved>, StageError> {
    let prompt = build_search_prompt(state.query(), state.analysis_plan());
    let search = generator
        .generate(prompt.system, &prompt.user)
        .await
        .map_err(|e| StageError::new(Stage::Retrieve, e))?
        .trim()
        .to_string();
    debug!(run_id = %state.run_id(), search = %search, "Derived document search");

    let (context, found) = match retriever.retrieve(&search, limits.top_k).await {
        Ok(passages) if passages.is_empty() => (NO_DOCUMENTS_FOUND.to_string(), false),
        Ok(passages) => (format_passages(&passages, limits.excerpt_chars), true),
        Err(e) => {
            warn!(run_id = %state.run_id(), error = %e, "Document search failed");
            (format!("Error searching documents: {}", e), false)
        }
    };

    let outcome = if found {
        "Found relevant context in internal documents."
    } else {
        "No matching context in internal documents."
    };
    let message = format!("**Document Search:** {}\n\n{}", search, outcome);
    Ok(state.record_document_context(context, message))
}

/// Renders passages as `--- Source: {id} ---` blocks with truncated excerpts.
pub fn format_passages(passages: &[Passage], excerpt_chars: usize) -> String {
    passages
        .iter()
        .map(|p| {
            format!(
                "--- Source: {} ---\n{}...\n\n",
                p.source_id,
                truncate_chars(&p.excerpt, excerpt_chars)
            )
        })
        .collect()
}
