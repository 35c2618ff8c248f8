//! LLM integration for finsight.
//!
//! [`ChatClient`] talks to any OpenAI-compatible chat completion endpoint
//! (OpenRouter or a LiteLLM proxy) and handles retries. [`LlmGenerator`]
//! wraps a provider as the pipeline's text generation port.
//!
//! ```ignore
//! use std::sync::Arc;
//! use finsight::llm::{ChatClient, LlmGenerator};
//! use finsight::ports::TextGenerator;
//!
//! let client = ChatClient::openrouter(api_key, "openai/gpt-4o-mini")?;
//! let generator = LlmGenerator::new(Arc::new(client), "openai/gpt-4o-mini");
//! let plan = generator.generate("You are an expert financial analyst.", prompt).await?;
//! ```

pub mod client;
pub mod generator;
pub mod types;

pub use client::{ChatClient, DEFAULT_MODEL, OPENROUTER_BASE_URL};
pub use generator::{LlmGenerator, DEFAULT_TEMPERATURE};
pub use types::{Choice, GenerationRequest, GenerationResponse, LlmProvider, Message, Usage};
