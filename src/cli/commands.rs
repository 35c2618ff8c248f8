//! CLI command definitions for finsight.
//!
//! Every command resolves its configuration the same way: defaults, then the
//! `--config` YAML file, then `FINSIGHT_*` environment variables, then flags.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::agent::stages::FAILURE_MARKER;
use crate::agent::{AnalystAgent, Completed, PipelineEvent, RunState};
use crate::config::AnalystConfig;
use crate::error::RetrievalError;
use crate::llm::{ChatClient, LlmGenerator, LlmProvider};
use crate::ports::QueryExecutor;
use crate::retrieval::DocumentIndex;
use crate::sandbox::PythonSandbox;
use crate::store::SqliteStore;
use crate::utils::truncate_chars;

/// Characters of document context shown in the reasoning view.
const REASONING_CONTEXT_CHARS: usize = 800;
/// Characters of SQL results shown in the reasoning view.
const REASONING_SQL_CHARS: usize = 600;
/// Characters of analysis shown in the reasoning view.
const REASONING_ANALYSIS_CHARS: usize = 800;

/// Multi-step financial analyst over a loan and transaction dataset.
#[derive(Parser)]
#[command(name = "finsight")]
#[command(about = "Answer financial questions from SQL data, documents and pandas analysis")]
#[command(version)]
#[command(
    long_about = "finsight answers natural-language questions about a banking dataset.\n\nEach question runs through five stages: plan, document search, SQL query, statistical analysis and synthesis.\n\nExample usage:\n  finsight ask \"What is the default rate by province?\" --show-reasoning"
)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,

    /// YAML configuration file.
    #[arg(short, long, global = true, env = "FINSIGHT_CONFIG")]
    pub config: Option<PathBuf>,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Answer a single question.
    Ask(AskArgs),

    /// Answer questions read line by line from standard input.
    Chat(ChatArgs),

    /// Build the document index and report what it contains.
    Index(IndexArgs),

    /// Execute a SQL query against the dataset.
    Sql(SqlArgs),
}

/// Flags shared by every command.
#[derive(clap::Args, Debug, Clone, Default)]
pub struct CommonArgs {
    /// LLM model to use.
    #[arg(short = 'm', long)]
    pub model: Option<String>,

    /// OpenRouter API key (can also be set via OPENROUTER_API_KEY or LITELLM_API_KEY env var).
    #[arg(long, env = "OPENROUTER_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// SQLite database path.
    #[arg(long)]
    pub database: Option<PathBuf>,

    /// Directory of .txt and .md documents.
    #[arg(long)]
    pub documents: Option<PathBuf>,

    /// Python executable used for analysis snippets.
    #[arg(long)]
    pub python: Option<String>,

    /// Run analysis snippets inside this docker image.
    #[arg(long)]
    pub docker_image: Option<String>,
}

/// Arguments for `finsight ask`.
#[derive(Parser, Debug)]
pub struct AskArgs {
    /// The question to answer.
    pub question: String,

    /// Print the whole run as JSON.
    #[arg(long)]
    pub json: bool,

    /// Print the intermediate steps before the answer.
    #[arg(long)]
    pub show_reasoning: bool,

    /// Fail the run if it takes longer than this many seconds.
    #[arg(long)]
    pub timeout: Option<u64>,

    #[command(flatten)]
    pub common: CommonArgs,
}

/// Arguments for `finsight chat`.
#[derive(Parser, Debug)]
pub struct ChatArgs {
    /// Print the intermediate steps before each answer.
    #[arg(long)]
    pub show_reasoning: bool,

    /// Per-question deadline in seconds.
    #[arg(long)]
    pub timeout: Option<u64>,

    #[command(flatten)]
    pub common: CommonArgs,
}

/// Arguments for `finsight index`.
#[derive(Parser, Debug)]
pub struct IndexArgs {
    /// Print statistics as JSON.
    #[arg(long)]
    pub json: bool,

    #[command(flatten)]
    pub common: CommonArgs,
}

/// Arguments for `finsight sql`.
#[derive(Parser, Debug)]
pub struct SqlArgs {
    /// The query to execute.
    pub query: String,

    /// Print rows as JSON records instead of a table.
    #[arg(long)]
    pub json: bool,

    #[command(flatten)]
    pub common: CommonArgs,
}

/// Parse CLI arguments and return the Cli struct.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Run the CLI by parsing arguments and executing the command.
pub async fn run() -> anyhow::Result<()> {
    run_with_cli(parse_cli()).await
}

/// Run the CLI with the parsed arguments.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    let config_path = cli.config.as_deref();
    match cli.command {
        Commands::Ask(args) => run_ask_command(args, config_path).await,
        Commands::Chat(args) => run_chat_command(args, config_path).await,
        Commands::Index(args) => run_index_command(args, config_path).await,
        Commands::Sql(args) => run_sql_command(args, config_path).await,
    }
}

// ============================================================================
// Setup
// ============================================================================

/// Resolves the configuration for one command invocation.
pub fn load_config(path: Option<&Path>, common: &CommonArgs) -> anyhow::Result<AnalystConfig> {
    let config = match path {
        Some(path) => AnalystConfig::from_yaml_file(path)?,
        None => AnalystConfig::default(),
    };
    let config = apply_flags(config.apply_env()?, common);
    config.validate()?;
    Ok(config)
}

fn apply_flags(mut config: AnalystConfig, common: &CommonArgs) -> AnalystConfig {
    if let Some(model) = &common.model {
        config.model = model.clone();
    }
    if let Some(database) = &common.database {
        config.database_path = database.clone();
    }
    if let Some(documents) = &common.documents {
        config.documents_dir = documents.clone();
    }
    if let Some(python) = &common.python {
        config.python = python.clone();
    }
    if let Some(image) = &common.docker_image {
        config.docker_image = Some(image.clone());
    }
    config
}

async fn build_llm_client(
    api_key: Option<String>,
    model: &str,
) -> anyhow::Result<Arc<dyn LlmProvider>> {
    let resolved_api_key = api_key
        .or_else(|| std::env::var("OPENROUTER_API_KEY").ok())
        .or_else(|| std::env::var("LITELLM_API_KEY").ok());

    if let Some(key) = resolved_api_key {
        info!(model = %model, "Using OpenRouter with specified API key");
        Ok(Arc::new(ChatClient::openrouter(key, model)?))
    } else {
        info!("Using LiteLLM client from environment");
        Ok(Arc::new(ChatClient::from_env().map_err(|e| {
            anyhow::anyhow!(
                "Failed to initialize LLM client: {}. Please provide --api-key or set \
                 OPENROUTER_API_KEY/LITELLM_API_KEY env var.",
                e
            )
        })?))
    }
}

/// Builds the document index off the async runtime. A missing document
/// directory yields an empty index.
async fn build_index(config: &AnalystConfig) -> anyhow::Result<DocumentIndex> {
    let dir = config.documents_dir.clone();
    let options = config.index_options();
    let built = tokio::task::spawn_blocking(move || DocumentIndex::build(&dir, &options)).await?;

    match built {
        Ok(index) => Ok(index),
        Err(RetrievalError::MissingCorpus(dir)) => {
            warn!(dir = %dir, "Document directory not found; document search will return nothing");
            Ok(DocumentIndex::empty())
        }
        Err(e) => Err(e.into()),
    }
}

async fn open_store(config: &AnalystConfig) -> anyhow::Result<SqliteStore> {
    let path = config.database_path.to_string_lossy();
    SqliteStore::open(&path).await.map_err(|e| {
        anyhow::anyhow!(
            "Failed to open database {}: {}",
            config.database_path.display(),
            e
        )
    })
}

async fn build_agent(config: &AnalystConfig, api_key: Option<String>) -> anyhow::Result<AnalystAgent> {
    let provider = build_llm_client(api_key, &config.model).await?;
    let mut generator =
        LlmGenerator::new(provider, config.model.clone()).with_temperature(config.temperature);
    if let Some(max_tokens) = config.max_tokens {
        generator = generator.with_max_tokens(max_tokens);
    }

    let store = open_store(config).await?;
    let index = build_index(config).await?;
    info!(
        documents = index.stats().documents,
        chunks = index.stats().chunks,
        "Document index ready"
    );
    let sandbox = PythonSandbox::new(config.sandbox_config());

    let agent = AnalystAgent::builder()
        .generator(Arc::new(generator))
        .tables(Arc::new(store))
        .retriever(Arc::new(index))
        .code_executor(Arc::new(sandbox))
        .limits(config.limits.clone())
        .build()?;
    Ok(agent)
}

// ============================================================================
// Commands
// ============================================================================

async fn run_ask_command(args: AskArgs, config_path: Option<&Path>) -> anyhow::Result<()> {
    let config = load_config(config_path, &args.common)?;
    let agent = build_agent(&config, args.common.api_key.clone()).await?;
    let deadline = args
        .timeout
        .or(config.run_timeout_secs)
        .map(Duration::from_secs);

    let (event_tx, mut event_rx) = mpsc::channel::<PipelineEvent>(32);
    let show_progress = !args.json;
    let printer = tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            if show_progress {
                print_progress(&event);
            }
        }
    });

    let outcome = agent
        .run_with_options(&args.question, Some(&event_tx), deadline)
        .await;
    drop(event_tx);
    let _ = printer.await;

    let state = outcome?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&state)?);
        return Ok(());
    }

    if args.show_reasoning {
        println!("{}", render_reasoning(&state));
    }
    println!("{}", state.final_answer());
    Ok(())
}

async fn run_chat_command(args: ChatArgs, config_path: Option<&Path>) -> anyhow::Result<()> {
    let config = load_config(config_path, &args.common)?;
    let agent = build_agent(&config, args.common.api_key.clone()).await?;
    let deadline = args
        .timeout
        .or(config.run_timeout_secs)
        .map(Duration::from_secs);

    println!("finsight chat. Ask a question, or type 'exit' to quit.");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stats = SessionStats::default();

    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let question = line.trim();
        if question.is_empty() {
            continue;
        }
        if matches!(question, "exit" | "quit") {
            break;
        }

        match agent.run_with_options(question, None, deadline).await {
            Ok(state) => {
                if let Some(duration) = state.metadata().duration_secs {
                    stats.record(duration);
                }
                if args.show_reasoning {
                    println!("{}", render_reasoning(&state));
                }
                println!("{}\n", state.final_answer());
            }
            Err(failure) => {
                println!("{}\n", error_notice(&failure.error.to_string()));
            }
        }
    }

    println!("{}", stats.summary());
    Ok(())
}

async fn run_index_command(args: IndexArgs, config_path: Option<&Path>) -> anyhow::Result<()> {
    let config = load_config(config_path, &args.common)?;
    let index = build_index(&config).await?;
    let stats = index.stats();

    if args.json {
        println!("{}", serde_json::to_string_pretty(stats)?);
    } else {
        println!("Documents directory: {}", config.documents_dir.display());
        println!("  Documents indexed: {}", stats.documents);
        println!("  Chunks:            {}", stats.chunks);
        println!("  Files skipped:     {}", stats.skipped.len());
        for source in &stats.sources {
            println!("  - {}", source);
        }
    }
    Ok(())
}

async fn run_sql_command(args: SqlArgs, config_path: Option<&Path>) -> anyhow::Result<()> {
    let config = load_config(config_path, &args.common)?;
    let store = open_store(&config).await?;

    match store.execute_query(&args.query).await {
        Ok(table) if args.json => {
            println!("{}", serde_json::to_string_pretty(&table.to_records())?);
        }
        Ok(table) => println!("{}", table.rendered()),
        Err(e) => println!("{}", e),
    }
    Ok(())
}

// ============================================================================
// Output helpers
// ============================================================================

fn print_progress(event: &PipelineEvent) {
    match event {
        PipelineEvent::StageStarted { stage, .. } => eprintln!("  -> {}...", stage),
        PipelineEvent::StageFailed { stage, error, .. } => {
            eprintln!("  !! {} failed: {}", stage, error)
        }
        PipelineEvent::RunCompleted { duration_secs, .. } => {
            eprintln!("  done in {:.2}s", duration_secs)
        }
        _ => {}
    }
}

/// The notice shown in place of an answer when a run fails.
pub fn error_notice(error: &str) -> String {
    format!(
        "I encountered an error: {}\n\nPlease try rephrasing your question.",
        error
    )
}

/// Renders the intermediate steps of a completed run, abbreviated.
pub fn render_reasoning(state: &RunState<Completed>) -> String {
    let mut out = String::new();

    out.push_str("### Step 1: Planning\n");
    out.push_str(state.analysis_plan());
    out.push_str("\n\n");

    let context = state.document_context();
    if !context.is_empty() && !context.starts_with("No relevant information") {
        out.push_str("### Step 2: Document Search\n");
        out.push_str(&abbreviate(
            context,
            REASONING_CONTEXT_CHARS,
            "\n\n... (truncated for brevity)",
        ));
        out.push_str("\n\n");
    }

    let sql = state.sql_results();
    if !sql.is_empty() {
        out.push_str("### Step 3: SQL Query & Results\n");
        out.push_str(&abbreviate(sql, REASONING_SQL_CHARS, "\n... (truncated)"));
        out.push_str("\n\n");
    }

    let analysis = state.analysis_results();
    if !analysis.is_empty() {
        out.push_str("### Step 4: Statistical Analysis\n");
        if analysis.contains(FAILURE_MARKER) {
            out.push_str("Analysis step used SQL results directly (fallback)");
        } else {
            out.push_str(&abbreviate(analysis, REASONING_ANALYSIS_CHARS, "..."));
        }
        out.push_str("\n\n");
    }

    out.push_str(&format!(
        "### Execution: {} steps in {:.2}s\n",
        state.messages().len(),
        state.metadata().duration_secs.unwrap_or_default()
    ));
    out
}

fn abbreviate(text: &str, max_chars: usize, suffix: &str) -> String {
    let head = truncate_chars(text, max_chars);
    if head.len() < text.len() {
        format!("{}{}", head, suffix)
    } else {
        head.to_string()
    }
}

/// Running totals for a chat session.
#[derive(Debug, Default)]
struct SessionStats {
    answered: usize,
    total_secs: f64,
}

impl SessionStats {
    fn record(&mut self, duration_secs: f64) {
        self.answered += 1;
        self.total_secs += duration_secs;
    }

    fn summary(&self) -> String {
        if self.answered == 0 {
            return "Session ended. No questions answered.".to_string();
        }
        format!(
            "Session ended. {} questions answered, average {:.2}s per question.",
            self.answered,
            self.total_secs / self.answered as f64
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_ask() {
        let cli = Cli::try_parse_from([
            "finsight",
            "ask",
            "What is the default rate?",
            "--json",
            "--timeout",
            "30",
            "--model",
            "openai/gpt-4o",
        ])
        .expect("valid arguments");

        match cli.command {
            Commands::Ask(args) => {
                assert_eq!(args.question, "What is the default rate?");
                assert!(args.json);
                assert!(!args.show_reasoning);
                assert_eq!(args.timeout, Some(30));
                assert_eq!(args.common.model.as_deref(), Some("openai/gpt-4o"));
            }
            _ => panic!("expected ask"),
        }
        assert_eq!(cli.log_level, "info");
    }

    #[test]
    fn test_cli_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "finsight",
            "sql",
            "SELECT 1",
            "--log-level",
            "debug",
            "--config",
            "finsight.yaml",
        ])
        .expect("valid arguments");
        assert_eq!(cli.log_level, "debug");
        assert_eq!(cli.config, Some(PathBuf::from("finsight.yaml")));
        assert!(matches!(cli.command, Commands::Sql(_)));
    }

    #[test]
    fn test_cli_requires_question() {
        assert!(Cli::try_parse_from(["finsight", "ask"]).is_err());
    }

    #[test]
    fn test_flags_override_config() {
        let common = CommonArgs {
            model: Some("anthropic/claude-3.5-sonnet".to_string()),
            database: Some(PathBuf::from("/tmp/bank.db")),
            docker_image: Some("python:3.11-slim".to_string()),
            ..CommonArgs::default()
        };
        let config = apply_flags(AnalystConfig::default(), &common);
        assert_eq!(config.model, "anthropic/claude-3.5-sonnet");
        assert_eq!(config.database_path, PathBuf::from("/tmp/bank.db"));
        assert_eq!(config.docker_image.as_deref(), Some("python:3.11-slim"));
        assert_eq!(config.python, AnalystConfig::default().python);
    }

    #[test]
    fn test_error_notice() {
        let notice = error_notice("Stage 'plan' failed: Rate limited: quota");
        assert!(notice.starts_with("I encountered an error: Stage 'plan' failed"));
        assert!(notice.ends_with("Please try rephrasing your question."));
    }

    #[test]
    fn test_abbreviate() {
        assert_eq!(abbreviate("short", 10, "..."), "short");
        assert_eq!(abbreviate("abcdefgh", 3, "..."), "abc...");
    }

    #[test]
    fn test_session_summary() {
        let mut stats = SessionStats::default();
        assert_eq!(stats.summary(), "Session ended. No questions answered.");
        stats.record(2.0);
        stats.record(4.0);
        assert_eq!(
            stats.summary(),
            "Session ended. 2 questions answered, average 3.00s per question."
        );
    }
}
