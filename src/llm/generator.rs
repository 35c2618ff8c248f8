//! Role-framed text generation on top of an [`LlmProvider`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use super::types::{GenerationRequest, LlmProvider, Message};
use crate::error::LlmError;
use crate::ports::TextGenerator;

/// Default sampling temperature. Analysis answers should be reproducible.
pub const DEFAULT_TEMPERATURE: f64 = 0.0;

/// Adapts a chat-completion provider to the [`TextGenerator`] port.
///
/// Every call sends exactly two messages: the system role and the user
/// prompt. No conversation history is carried between calls.
pub struct LlmGenerator {
    provider: Arc<dyn LlmProvider>,
    model: String,
    temperature: f64,
    max_tokens: Option<u32>,
    tokens_used: AtomicU64,
}

impl LlmGenerator {
    pub fn new(provider: Arc<dyn LlmProvider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: None,
            tokens_used: AtomicU64::new(0),
        }
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn temperature(&self) -> f64 {
        self.temperature
    }

    /// Total tokens reported by the provider across all calls so far.
    pub fn tokens_used(&self) -> u64 {
        self.tokens_used.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl TextGenerator for LlmGenerator {
    async fn generate(&self, system_role: &str, user_prompt: &str) -> Result<String, LlmError> {
        let mut request = GenerationRequest::new(
            self.model.clone(),
            vec![Message::system(system_role), Message::user(user_prompt)],
        )
        .with_temperature(self.temperature);
        if let Some(max_tokens) = self.max_tokens {
            request = request.with_max_tokens(max_tokens);
        }

        let response = self.provider.generate(request).await?;
        let usage = &response.usage;
        self.tokens_used
            .fetch_add(u64::from(usage.total_tokens), Ordering::Relaxed);
        tracing::debug!(
            model = %self.model,
            prompt_tokens = usage.prompt_tokens,
            completion_tokens = usage.completion_tokens,
            "Generation completed"
        );

        match response.first_content() {
            Some(content) if !content.trim().is_empty() => Ok(content.to_string()),
            _ => Err(LlmError::ParseError("No content in LLM response".to_string())),
        }
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
