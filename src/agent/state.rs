//! Per-run state threaded through the five stages.
//!
//! [`RunState`] carries its pipeline phase as a type parameter. Each stage
//! consumes the state of the previous phase and returns the next one
//! through a single transition that writes that stage's field and appends
//! its step record. Field readers exist only on phases where the field has
//! been written, so a stage cannot read a later stage's output and no field
//! can be written twice.

use std::fmt;
use std::marker::PhantomData;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

mod sealed {
    pub trait Sealed {}
}

/// A pipeline phase marker.
pub trait Phase: sealed::Sealed + Send + Sync + 'static {}

macro_rules! phases {
    ($($(#[$doc:meta])* $name:ident),* $(,)?) => {
        $(
            $(#[$doc])*
            #[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
            pub struct $name;
            impl sealed::Sealed for $name {}
            impl Phase for $name {}
        )*
    };
}

phases!(
    /// Created; nothing produced yet.
    Started,
    /// The analysis plan is written.
    Planned,
    /// Document context is written.
    Retrieved,
    /// SQL results are written.
    Queried,
    /// Analysis results are written.
    Computed,
    /// The final answer is written.
    Completed,
);

/// Phases at or after planning.
pub trait HasPlan: Phase {}
impl HasPlan for Planned {}
impl HasPlan for Retrieved {}
impl HasPlan for Queried {}
impl HasPlan for Computed {}
impl HasPlan for Completed {}

/// Phases at or after document retrieval.
pub trait HasDocumentContext: Phase {}
impl HasDocumentContext for Retrieved {}
impl HasDocumentContext for Queried {}
impl HasDocumentContext for Computed {}
impl HasDocumentContext for Completed {}

/// Phases at or after the SQL query.
pub trait HasSqlResults: Phase {}
impl HasSqlResults for Queried {}
impl HasSqlResults for Computed {}
impl HasSqlResults for Completed {}

/// Phases at or after the analysis.
pub trait HasAnalysis: Phase {}
impl HasAnalysis for Computed {}
impl HasAnalysis for Completed {}

/// Which stage produced a step record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    Planning,
    DocumentSearch,
    SqlExecution,
    Analysis,
    FinalAnswer,
}

impl Step {
    pub fn as_str(&self) -> &'static str {
        match self {
            Step::Planning => "planning",
            Step::DocumentSearch => "document_search",
            Step::SqlExecution => "sql_execution",
            Step::Analysis => "analysis",
            Step::FinalAnswer => "final_answer",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry in the run's audit trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    pub role: String,
    pub step: Step,
    pub content: String,
}

impl StepRecord {
    fn assistant(step: Step, content: String) -> Self {
        Self {
            role: "assistant".to_string(),
            step,
            content,
        }
    }
}

/// Identity and outcome of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunMetadata {
    pub start_time: DateTime<Utc>,
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_secs: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RunMetadata {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            start_time: Utc::now(),
            model: model.into(),
            duration_secs: None,
            success: None,
            error: None,
        }
    }
}

/// The record threaded through all stages of one run.
#[derive(Debug, Clone, Serialize)]
#[serde(bound = "")]
pub struct RunState<P: Phase> {
    run_id: Uuid,
    query: String,
    messages: Vec<StepRecord>,
    analysis_plan: String,
    document_context: String,
    sql_results: String,
    analysis_results: String,
    final_answer: String,
    metadata: RunMetadata,
    #[serde(skip)]
    phase: PhantomData<P>,
}

impl RunState<Started> {
    /// Creates the state for a new run with a fresh run id.
    pub fn new(query: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            query: query.into(),
            messages: Vec::new(),
            analysis_plan: String::new(),
            document_context: String::new(),
            sql_results: String::new(),
            analysis_results: String::new(),
            final_answer: String::new(),
            metadata: RunMetadata::new(model),
            phase: PhantomData,
        }
    }

    pub(crate) fn record_plan(mut self, plan: String, message: String) -> RunState<Planned> {
        self.analysis_plan = plan;
        self.advance(Step::Planning, message)
    }
}

impl RunState<Planned> {
    pub(crate) fn record_document_context(
        mut self,
        context: String,
        message: String,
    ) -> RunState<Retrieved> {
        self.document_context = context;
        self.advance(Step::DocumentSearch, message)
    }
}

impl RunState<Retrieved> {
    pub(crate) fn record_sql_results(mut self, results: String, message: String) -> RunState<Queried> {
        self.sql_results = results;
        self.advance(Step::SqlExecution, message)
    }
}

impl RunState<Queried> {
    pub(crate) fn record_analysis(mut self, analysis: String, message: String) -> RunState<Computed> {
        self.analysis_results = analysis;
        self.advance(Step::Analysis, message)
    }
}

impl RunState<Computed> {
    /// The answer text is both the field and the step record content.
    pub(crate) fn record_final_answer(mut self, answer: String) -> RunState<Completed> {
        self.final_answer = answer.clone();
        self.advance(Step::FinalAnswer, answer)
    }
}

impl<P: Phase> RunState<P> {
    fn advance<Q: Phase>(mut self, step: Step, message: String) -> RunState<Q> {
        self.messages.push(StepRecord::assistant(step, message));
        RunState {
            run_id: self.run_id,
            query: self.query,
            messages: self.messages,
            analysis_plan: self.analysis_plan,
            document_context: self.document_context,
            sql_results: self.sql_results,
            analysis_results: self.analysis_results,
            final_answer: self.final_answer,
            metadata: self.metadata,
            phase: PhantomData,
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    /// Step records in the order the stages ran.
    pub fn messages(&self) -> &[StepRecord] {
        &self.messages
    }

    pub fn metadata(&self) -> &RunMetadata {
        &self.metadata
    }

    pub(crate) fn metadata_mut(&mut self) -> &mut RunMetadata {
        &mut self.metadata
    }
}

impl<P: HasPlan> RunState<P> {
    pub fn analysis_plan(&self) -> &str {
        &self.analysis_plan
    }
}

impl<P: HasDocumentContext> RunState<P> {
    pub fn document_context(&self) -> &str {
        &self.document_context
    }
}

impl<P: HasSqlResults> RunState<P> {
    pub fn sql_results(&self) -> &str {
        &self.sql_results
    }
}

impl<P: HasAnalysis> RunState<P> {
    pub fn analysis_results(&self) -> &str {
        &self.analysis_results
    }
}

impl RunState<Completed> {
    pub fn final_answer(&self) -> &str {
        &self.final_answer
    }
}
