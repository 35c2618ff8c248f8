//! Analyst agent - runs the five stages in order over one query.
//!
//! # Example
//!
//! ```ignore
//! use finsight::agent::AnalystAgent;
//!
//! let agent = AnalystAgent::builder()
//!     .generator(generator)
//!     .tables(store)
//!     .retriever(index)
//!     .code_executor(sandbox)
//!     .build()?;
//!
//! let state = agent.run("What is the default rate by loan purpose?").await?;
//! println!("{}", state.final_answer());
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tracing::{error, info};
use uuid::Uuid;

use super::error::{AgentBuildError, RunError, RunFailure, Stage, StageError};
use super::events::PipelineEvent;
use super::stages::{compute, plan, query, retrieve, synthesize};
use super::state::{Completed, RunState, Started};
use crate::config::ContextLimits;
use crate::ports::{CodeExecutor, PassageRetriever, QueryExecutor, TextGenerator};

type EventSink<'a> = Option<&'a mpsc::Sender<PipelineEvent>>;

/// Runs queries through Plan, Retrieve, Query, Compute and Synthesize.
///
/// The agent holds no per-run state; concurrent runs on one agent share
/// only the ports.
pub struct AnalystAgent {
    generator: Arc<dyn TextGenerator>,
    tables: Arc<dyn QueryExecutor>,
    retriever: Arc<dyn PassageRetriever>,
    executor: Arc<dyn CodeExecutor>,
    limits: ContextLimits,
    model: String,
}

impl AnalystAgent {
    pub fn builder() -> AnalystAgentBuilder {
        AnalystAgentBuilder::new()
    }

    /// Model name recorded in each run's metadata.
    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn limits(&self) -> &ContextLimits {
        &self.limits
    }

    /// Answers one query.
    pub async fn run(&self, query: &str) -> Result<RunState<Completed>, RunFailure> {
        self.execute(query, None, None).await
    }

    /// Answers one query, emitting progress events on `event_tx`.
    pub async fn run_with_events(
        &self,
        query: &str,
        event_tx: &mpsc::Sender<PipelineEvent>,
    ) -> Result<RunState<Completed>, RunFailure> {
        self.execute(query, Some(event_tx), None).await
    }

    /// Answers one query, failing with [`RunError::DeadlineExceeded`] when
    /// the whole run takes longer than `deadline`.
    pub async fn run_with_deadline(
        &self,
        query: &str,
        deadline: Duration,
    ) -> Result<RunState<Completed>, RunFailure> {
        self.execute(query, None, Some(deadline)).await
    }

    /// Deadline and events together.
    pub async fn run_with_options(
        &self,
        query: &str,
        event_tx: Option<&mpsc::Sender<PipelineEvent>>,
        deadline: Option<Duration>,
    ) -> Result<RunState<Completed>, RunFailure> {
        self.execute(query, event_tx, deadline).await
    }

    async fn execute(
        &self,
        query: &str,
        events: EventSink<'_>,
        deadline: Option<Duration>,
    ) -> Result<RunState<Completed>, RunFailure> {
        let state = RunState::new(query, self.model.clone());
        let run_id = state.run_id();
        let mut metadata = state.metadata().clone();
        let start = Instant::now();

        info!(run_id = %run_id, model = %self.model, "Processing query: {}", query);

        let outcome = match deadline {
            None => self.drive(state, events).await.map_err(RunError::from),
            Some(budget) => match tokio::time::timeout(budget, self.drive(state, events)).await {
                Ok(result) => result.map_err(RunError::from),
                Err(_) => Err(RunError::DeadlineExceeded { budget }),
            },
        };

        let duration_secs = start.elapsed().as_secs_f64();

        match outcome {
            Ok(mut completed) => {
                let meta = completed.metadata_mut();
                meta.duration_secs = Some(duration_secs);
                meta.success = Some(true);

                info!(
                    run_id = %run_id,
                    duration_secs = %format!("{:.2}", duration_secs),
                    "Query processing completed"
                );
                send_event(events, PipelineEvent::run_completed(run_id, duration_secs)).await;
                Ok(completed)
            }
            Err(err) => {
                metadata.success = Some(false);
                metadata.error = Some(err.to_string());

                error!(run_id = %run_id, error = %err, "Query processing failed");
                send_event(events, PipelineEvent::run_failed(run_id, err.to_string())).await;
                Err(RunFailure {
                    run_id,
                    query: query.to_string(),
                    metadata,
                    error: err,
                })
            }
        }
    }

    async fn drive(
        &self,
        state: RunState<Started>,
        events: EventSink<'_>,
    ) -> Result<RunState<Completed>, StageError> {
        let run_id = state.run_id();
        let generator = self.generator.as_ref();

        begin(events, run_id, Stage::Plan).await;
        let state = finish(events, run_id, Stage::Plan, plan::run(state, generator).await).await?;

        begin(events, run_id, Stage::Retrieve).await;
        let result = retrieve::run(state, generator, self.retriever.as_ref(), &self.limits).await;
        let state = finish(events, run_id, Stage::Retrieve, result).await?;

        begin(events, run_id, Stage::Query).await;
        let result = query::run(state, generator, self.tables.as_ref(), &self.limits).await;
        let state = finish(events, run_id, Stage::Query, result).await?;

        begin(events, run_id, Stage::Compute).await;
        let state = compute::run(
            state,
            generator,
            self.tables.as_ref(),
            self.executor.as_ref(),
            &self.limits,
        )
        .await;
        let state = finish(events, run_id, Stage::Compute, Ok(state)).await?;

        begin(events, run_id, Stage::Synthesize).await;
        let result = synthesize::run(state, generator, &self.limits).await;
        finish(events, run_id, Stage::Synthesize, result).await
    }
}

async fn begin(events: EventSink<'_>, run_id: Uuid, stage: Stage) {
    info!(run_id = %run_id, stage = %stage, "Stage started");
    send_event(events, PipelineEvent::stage_started(run_id, stage)).await;
}

async fn finish<T>(
    events: EventSink<'_>,
    run_id: Uuid,
    stage: Stage,
    result: Result<T, StageError>,
) -> Result<T, StageError> {
    match &result {
        Ok(_) => {
            info!(run_id = %run_id, stage = %stage, "Stage completed");
            send_event(events, PipelineEvent::stage_completed(run_id, stage)).await;
        }
        Err(e) => {
            error!(run_id = %run_id, stage = %stage, error = %e.source, "Stage failed");
            send_event(
                events,
                PipelineEvent::stage_failed(run_id, stage, e.source.to_string()),
            )
            .await;
        }
    }
    result
}

/// Sends an event; a dropped receiver is not an error.
async fn send_event(events: EventSink<'_>, event: PipelineEvent) {
    if let Some(tx) = events {
        let _ = tx.send(event).await;
    }
}

/// Builder for [`AnalystAgent`].
pub struct AnalystAgentBuilder {
    generator: Option<Arc<dyn TextGenerator>>,
    tables: Option<Arc<dyn QueryExecutor>>,
    retriever: Option<Arc<dyn PassageRetriever>>,
    executor: Option<Arc<dyn CodeExecutor>>,
    limits: ContextLimits,
    model: Option<String>,
}

impl AnalystAgentBuilder {
    pub fn new() -> Self {
        Self {
            generator: None,
            tables: None,
            retriever: None,
            executor: None,
            limits: ContextLimits::default(),
            model: None,
        }
    }

    /// Sets the text generator used by every stage.
    pub fn generator(mut self, generator: Arc<dyn TextGenerator>) -> Self {
        self.generator = Some(generator);
        self
    }

    /// Sets the structured store queried by Query and Compute.
    pub fn tables(mut self, tables: Arc<dyn QueryExecutor>) -> Self {
        self.tables = Some(tables);
        self
    }

    pub fn retriever(mut self, retriever: Arc<dyn PassageRetriever>) -> Self {
        self.retriever = Some(retriever);
        self
    }

    pub fn code_executor(mut self, executor: Arc<dyn CodeExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    pub fn limits(mut self, limits: ContextLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Overrides the model name recorded in run metadata. Defaults to the
    /// generator's own model name.
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn build(self) -> Result<AnalystAgent, AgentBuildError> {
        let generator = self.generator.ok_or_else(|| {
            AgentBuildError::ConfigurationError("text generator is required".to_string())
        })?;
        let tables = self.tables.ok_or_else(|| {
            AgentBuildError::ConfigurationError("query executor is required".to_string())
        })?;
        let retriever = self.retriever.ok_or_else(|| {
            AgentBuildError::ConfigurationError("passage retriever is required".to_string())
        })?;
        let executor = self.executor.ok_or_else(|| {
            AgentBuildError::ConfigurationError("code executor is required".to_string())
        })?;
        self.limits.validate()?;

        let model = self
            .model
            .unwrap_or_else(|| generator.model_name().to_string());

        Ok(AnalystAgent {
            generator,
            tables,
            retriever,
            executor,
            limits: self.limits,
            model,
        })
    }
}

impl Default for AnalystAgentBuilder {
    fn default() -> Self {
        Self::new()
    }
}
