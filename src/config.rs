//! Analyst configuration.
//!
//! Values are layered: [`AnalystConfig::default`], then an optional YAML
//! file, then `FINSIGHT_*` environment variables, then command-line flags
//! (applied by the CLI). [`AnalystConfig::validate`] runs last.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::llm::{DEFAULT_MODEL, DEFAULT_TEMPERATURE};
use crate::retrieval::{IndexOptions, DEFAULT_SIMILARITY_THRESHOLD};
use crate::sandbox::{SandboxConfig, DEFAULT_PYTHON, DEFAULT_TIMEOUT_SECS};

/// How much of each stage output flows into later prompts and messages.
///
/// All limits count characters, not bytes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextLimits {
    /// Passages requested from the retriever.
    pub top_k: usize,
    /// Characters kept from each retrieved excerpt.
    pub excerpt_chars: usize,
    /// Characters of document context given to the synthesis prompt.
    pub document_context_chars: usize,
    /// Characters of SQL results given to the analysis and synthesis prompts.
    pub sql_prompt_chars: usize,
    /// Characters of SQL results used when the analysis falls back.
    pub fallback_sql_chars: usize,
    /// Characters of the executed query kept in the step record.
    pub logged_query_chars: usize,
}

impl Default for ContextLimits {
    fn default() -> Self {
        Self {
            top_k: 3,
            excerpt_chars: 500,
            document_context_chars: 2000,
            sql_prompt_chars: 1000,
            fallback_sql_chars: 500,
            logged_query_chars: 500,
        }
    }
}

impl ContextLimits {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let caps = [
            ("top_k", self.top_k),
            ("excerpt_chars", self.excerpt_chars),
            ("document_context_chars", self.document_context_chars),
            ("sql_prompt_chars", self.sql_prompt_chars),
            ("fallback_sql_chars", self.fallback_sql_chars),
            ("logged_query_chars", self.logged_query_chars),
        ];
        for (name, value) in caps {
            if value == 0 {
                return Err(ConfigError::ValidationFailed(format!(
                    "{} must be greater than 0",
                    name
                )));
            }
        }
        Ok(())
    }
}

/// Configuration for the analyst agent and its default adapters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalystConfig {
    // LLM settings
    /// Model used for every generation call.
    pub model: String,
    /// Sampling temperature (0.0 - 2.0).
    pub temperature: f64,
    /// Optional completion token cap.
    pub max_tokens: Option<u32>,

    // Data sources
    /// SQLite database with the `loans` and `transactions` tables.
    pub database_path: PathBuf,
    /// Directory of `.txt` / `.md` documents to index.
    pub documents_dir: PathBuf,
    /// Minimum similarity for a retrieved passage.
    pub retrieval_threshold: f64,

    // Sandbox settings
    pub python: String,
    pub sandbox_timeout_secs: u64,
    pub docker_image: Option<String>,

    /// Whole-run deadline, if any.
    pub run_timeout_secs: Option<u64>,

    pub limits: ContextLimits,
}

impl Default for AnalystConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: None,
            database_path: PathBuf::from("data/banking.db"),
            documents_dir: PathBuf::from("data/documents"),
            retrieval_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            python: DEFAULT_PYTHON.to_string(),
            sandbox_timeout_secs: DEFAULT_TIMEOUT_SECS,
            docker_image: None,
            run_timeout_secs: None,
            limits: ContextLimits::default(),
        }
    }
}

impl AnalystConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads a YAML file. Missing keys keep their defaults.
    pub fn from_yaml_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&raw)
    }

    pub fn from_yaml_str(raw: &str) -> Result<Self, ConfigError> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(raw)?)
    }

    /// Overrides values from `FINSIGHT_*` environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `FINSIGHT_MODEL`: Model name
    /// - `FINSIGHT_TEMPERATURE`: Sampling temperature
    /// - `FINSIGHT_DATABASE`: SQLite database path
    /// - `FINSIGHT_DOCUMENTS`: Document directory
    /// - `FINSIGHT_TOP_K`: Passages per search
    /// - `FINSIGHT_PYTHON`: Python executable
    /// - `FINSIGHT_SANDBOX_TIMEOUT_SECS`: Snippet timeout in seconds
    /// - `FINSIGHT_DOCKER_IMAGE`: Run snippets in this docker image
    /// - `FINSIGHT_RETRIEVAL_THRESHOLD`: Minimum passage similarity
    pub fn apply_env(self) -> Result<Self, ConfigError> {
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    /// Same as [`apply_env`](Self::apply_env) with an explicit lookup.
    pub fn apply_env_from<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(val) = lookup("FINSIGHT_MODEL") {
            self.model = val;
        }
        if let Some(val) = lookup("FINSIGHT_TEMPERATURE") {
            self.temperature = parse_env_value(&val, "FINSIGHT_TEMPERATURE")?;
        }
        if let Some(val) = lookup("FINSIGHT_DATABASE") {
            self.database_path = PathBuf::from(val);
        }
        if let Some(val) = lookup("FINSIGHT_DOCUMENTS") {
            self.documents_dir = PathBuf::from(val);
        }
        if let Some(val) = lookup("FINSIGHT_TOP_K") {
            self.limits.top_k = parse_env_value(&val, "FINSIGHT_TOP_K")?;
        }
        if let Some(val) = lookup("FINSIGHT_PYTHON") {
            self.python = val;
        }
        if let Some(val) = lookup("FINSIGHT_SANDBOX_TIMEOUT_SECS") {
            self.sandbox_timeout_secs = parse_env_value(&val, "FINSIGHT_SANDBOX_TIMEOUT_SECS")?;
        }
        if let Some(val) = lookup("FINSIGHT_DOCKER_IMAGE") {
            self.docker_image = if val.trim().is_empty() { None } else { Some(val) };
        }
        if let Some(val) = lookup("FINSIGHT_RETRIEVAL_THRESHOLD") {
            self.retrieval_threshold = parse_env_value(&val, "FINSIGHT_RETRIEVAL_THRESHOLD")?;
        }
        Ok(self)
    }

    /// Validates the configuration values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.model.trim().is_empty() {
            return Err(ConfigError::ValidationFailed(
                "model cannot be empty".to_string(),
            ));
        }

        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ConfigError::ValidationFailed(
                "temperature must be between 0.0 and 2.0".to_string(),
            ));
        }

        if !(0.0..1.0).contains(&self.retrieval_threshold) {
            return Err(ConfigError::ValidationFailed(
                "retrieval_threshold must be in [0.0, 1.0)".to_string(),
            ));
        }

        if self.python.trim().is_empty() {
            return Err(ConfigError::ValidationFailed(
                "python cannot be empty".to_string(),
            ));
        }

        if self.sandbox_timeout_secs == 0 {
            return Err(ConfigError::ValidationFailed(
                "sandbox_timeout_secs must be greater than 0".to_string(),
            ));
        }

        if self.run_timeout_secs == Some(0) {
            return Err(ConfigError::ValidationFailed(
                "run_timeout_secs must be greater than 0".to_string(),
            ));
        }

        self.limits.validate()
    }

    /// Sandbox settings derived from this configuration.
    pub fn sandbox_config(&self) -> SandboxConfig {
        let config = SandboxConfig::new(self.python.clone())
            .with_timeout(Duration::from_secs(self.sandbox_timeout_secs));
        match &self.docker_image {
            Some(image) => config.with_docker_image(image.clone()),
            None => config,
        }
    }

    /// Document index settings derived from this configuration.
    pub fn index_options(&self) -> IndexOptions {
        IndexOptions::default().with_threshold(self.retrieval_threshold)
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_limits(mut self, limits: ContextLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_run_timeout(mut self, seconds: u64) -> Self {
        self.run_timeout_secs = Some(seconds);
        self
    }
}

/// Parse an environment variable value into a type.
fn parse_env_value<T: std::str::FromStr>(value: &str, key: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("could not parse '{}'", value),
    })
}
