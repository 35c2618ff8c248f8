//! End-to-end pipeline runs over mock ports.
//!
//! Every external service is replaced by a hand-written mock, so these tests
//! need no network, no Python and no database file.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;

use finsight::agent::stages::{DIRECT_FALLBACK_PREFIX, NO_DOCUMENTS_FOUND, SKIPPED_FALLBACK_PREFIX};
use finsight::agent::{AnalystAgent, PipelineEvent, RunError, Stage, Step};
use finsight::error::{ExecutionError, LlmError, QueryError, RetrievalError};
use finsight::ports::{
    BoundTables, CellValue, CodeExecutor, Passage, PassageRetriever, QueryExecutor, TabularResult,
    TextGenerator,
};
use finsight::prompts::{ANALYST_ROLE, PLANNER_ROLE, PRESENTER_ROLE, RESEARCHER_ROLE, SQL_ROLE};
use finsight::store::SqliteStore;
use finsight::utils::truncate_chars;
use finsight::ContextLimits;

const QUERY: &str = "What is the average loan amount by loan type?";
const PLAN: &str = "1. Group loans by loan_type\n2. Average the amount\n3. Compare types";
const SQL: &str = "SELECT loan_type, AVG(amount) FROM loans GROUP BY loan_type";
const ANSWER: &str = "**Mortgages carry the largest average balance.**";

// ============================================================================
// Mock ports
// ============================================================================

/// Generator that answers by system role and records every prompt.
struct MockGenerator {
    calls: Mutex<Vec<(String, String)>>,
    call_count: AtomicUsize,
    fail_role: Option<&'static str>,
    echo_query: bool,
}

impl MockGenerator {
    fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            call_count: AtomicUsize::new(0),
            fail_role: None,
            echo_query: false,
        }
    }

    /// Plans and answers name the question found in the prompt, and every
    /// call yields once so concurrent runs interleave.
    fn echoing() -> Self {
        Self {
            echo_query: true,
            ..Self::new()
        }
    }

    fn failing_for(role: &'static str) -> Self {
        Self {
            fail_role: Some(role),
            ..Self::new()
        }
    }

    fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().expect("lock not poisoned").clone()
    }

    fn prompt_for(&self, role: &str) -> String {
        self.calls()
            .into_iter()
            .find(|(system, _)| system == role)
            .map(|(_, user)| user)
            .expect("role should have been prompted")
    }
}

#[async_trait]
impl TextGenerator for MockGenerator {
    async fn generate(&self, system_role: &str, user_prompt: &str) -> Result<String, LlmError> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        self.calls
            .lock()
            .expect("lock not poisoned")
            .push((system_role.to_string(), user_prompt.to_string()));

        if self.echo_query {
            tokio::task::yield_now().await;
            match system_role {
                PLANNER_ROLE => {
                    return Ok(format!("Plan for: {}", line_after(user_prompt, "User query: ")))
                }
                PRESENTER_ROLE => {
                    return Ok(format!("Answer to: {}", line_after(user_prompt, "User asked: ")))
                }
                _ => {}
            }
        }

        if self.fail_role == Some(system_role) {
            return Err(LlmError::ApiError {
                code: 503,
                message: "service unavailable".to_string(),
            });
        }

        let response = match system_role {
            PLANNER_ROLE => PLAN.to_string(),
            RESEARCHER_ROLE => "  average loan amount policy  ".to_string(),
            SQL_ROLE => format!("```sql\n{}\n```", SQL),
            ANALYST_ROLE => "```python\nresult = loans_df.groupby('loan_type')['amount'].mean().to_string()\n```".to_string(),
            PRESENTER_ROLE => ANSWER.to_string(),
            other => panic!("unexpected system role: {}", other),
        };
        Ok(response)
    }

    fn model_name(&self) -> &str {
        "mock-model"
    }
}

/// Tabular port returning a fixed number of rows for every query.
struct MockTables {
    rows: usize,
    queries: Mutex<Vec<String>>,
    fail_table_loads: bool,
}

impl MockTables {
    fn with_rows(rows: usize) -> Self {
        Self {
            rows,
            queries: Mutex::new(Vec::new()),
            fail_table_loads: false,
        }
    }

    fn failing_table_loads(rows: usize) -> Self {
        Self {
            fail_table_loads: true,
            ..Self::with_rows(rows)
        }
    }
}

#[async_trait]
impl QueryExecutor for MockTables {
    async fn execute_query(&self, query: &str) -> Result<TabularResult, QueryError> {
        self.queries
            .lock()
            .expect("lock not poisoned")
            .push(query.to_string());
        if self.fail_table_loads && query.starts_with("SELECT *") {
            return Err(QueryError::EmptyQuery);
        }

        let rows = (0..self.rows)
            .map(|i| {
                vec![
                    CellValue::Text(format!("Type{:03}", i)),
                    CellValue::Real(10_000.0 + i as f64 * 1_250.5),
                ]
            })
            .collect();
        Ok(TabularResult::new(
            vec!["loan_type".to_string(), "AVG(amount)".to_string()],
            rows,
            100,
        ))
    }
}

/// Retriever returning a fixed list of passages.
struct MockRetriever {
    passages: Vec<Passage>,
    fail: bool,
}

impl MockRetriever {
    fn with(passages: Vec<Passage>) -> Self {
        Self {
            passages,
            fail: false,
        }
    }

    fn empty() -> Self {
        Self::with(Vec::new())
    }

    fn failing() -> Self {
        Self {
            passages: Vec::new(),
            fail: true,
        }
    }
}

#[async_trait]
impl PassageRetriever for MockRetriever {
    async fn retrieve(&self, _query: &str, k: usize) -> Result<Vec<Passage>, RetrievalError> {
        if self.fail {
            return Err(RetrievalError::MissingCorpus("data/documents".to_string()));
        }
        Ok(self.passages.iter().take(k).cloned().collect())
    }
}

/// Code executor with a scripted outcome.
enum ExecutorOutcome {
    Output(&'static str),
    Fail(fn() -> ExecutionError),
}

struct MockExecutor {
    outcome: ExecutorOutcome,
    bound: Mutex<Vec<String>>,
}

impl MockExecutor {
    fn output(text: &'static str) -> Self {
        Self {
            outcome: ExecutorOutcome::Output(text),
            bound: Mutex::new(Vec::new()),
        }
    }

    fn failing(error: fn() -> ExecutionError) -> Self {
        Self {
            outcome: ExecutorOutcome::Fail(error),
            bound: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl CodeExecutor for MockExecutor {
    async fn execute(&self, snippet: &str, tables: &BoundTables) -> Result<String, ExecutionError> {
        assert!(!snippet.contains("```"), "snippet should be unfenced");
        *self.bound.lock().expect("lock not poisoned") = tables.keys().cloned().collect();
        match &self.outcome {
            ExecutorOutcome::Output(text) => Ok(text.to_string()),
            ExecutorOutcome::Fail(make) => Err(make()),
        }
    }
}

fn default_passages() -> Vec<Passage> {
    vec![
        Passage::new("Q2_2024_Risk_Report.txt", "Mortgage balances grew 12% in Q2."),
        Passage::new("Lending_Policy.md", "Auto loans are capped at $75,000."),
    ]
}

fn build_agent(
    generator: Arc<MockGenerator>,
    tables: Arc<MockTables>,
    retriever: MockRetriever,
    executor: Arc<MockExecutor>,
) -> AnalystAgent {
    AnalystAgent::builder()
        .generator(generator)
        .tables(tables)
        .retriever(Arc::new(retriever))
        .code_executor(executor)
        .build()
        .expect("agent should build")
}

// ============================================================================
// Scenarios
// ============================================================================

#[tokio::test]
async fn test_average_loan_amount_by_type() {
    let generator = Arc::new(MockGenerator::new());
    let tables = Arc::new(MockTables::with_rows(5));
    let executor = Arc::new(MockExecutor::output("Mortgage: $410,000 average"));
    let agent = build_agent(
        generator.clone(),
        tables.clone(),
        MockRetriever::with(default_passages()),
        executor.clone(),
    );

    let state = agent.run(QUERY).await.expect("run should succeed");

    assert!(state.sql_results().contains("Returned 5 rows"));
    assert!(!state.final_answer().is_empty());
    assert_eq!(state.final_answer(), ANSWER);
    assert_eq!(state.messages().len(), 5);
    assert_eq!(state.analysis_plan(), PLAN);
    assert_eq!(state.analysis_results(), "Mortgage: $410,000 average");
    assert_eq!(state.metadata().success, Some(true));
    assert_eq!(state.metadata().model, "mock-model");

    // The fenced query reached the store unfenced.
    let queries = tables.queries.lock().expect("lock not poisoned").clone();
    assert_eq!(queries[0], SQL);

    let bound = executor.bound.lock().expect("lock not poisoned").clone();
    assert_eq!(bound, vec!["loans_df".to_string(), "transactions_df".to_string()]);
}

#[tokio::test]
async fn test_empty_retrieval_uses_sentinel() {
    let generator = Arc::new(MockGenerator::new());
    let agent = build_agent(
        generator,
        Arc::new(MockTables::with_rows(5)),
        MockRetriever::empty(),
        Arc::new(MockExecutor::output("ok")),
    );

    let state = agent.run(QUERY).await.expect("run should succeed");

    assert_eq!(state.document_context(), "No relevant information found in documents.");
    assert_eq!(state.document_context(), NO_DOCUMENTS_FOUND);
    assert_eq!(state.metadata().success, Some(true));
    assert!(state.messages()[1]
        .content
        .ends_with("No matching context in internal documents."));
}

#[tokio::test]
async fn test_code_execution_failure_falls_back_to_sql() {
    let generator = Arc::new(MockGenerator::new());
    let agent = build_agent(
        generator,
        Arc::new(MockTables::with_rows(40)),
        MockRetriever::with(default_passages()),
        Arc::new(MockExecutor::failing(|| {
            ExecutionError::Failed("ZeroDivisionError: division by zero".to_string())
        })),
    );

    let state = agent.run(QUERY).await.expect("run should succeed");

    assert!(state.sql_results().chars().count() > 500);
    assert!(state.analysis_results().starts_with(DIRECT_FALLBACK_PREFIX));
    assert_eq!(
        state.analysis_results(),
        format!(
            "{}{}",
            DIRECT_FALLBACK_PREFIX,
            truncate_chars(state.sql_results(), 500)
        )
    );
}

// ============================================================================
// Properties
// ============================================================================

#[tokio::test]
async fn test_stages_run_in_fixed_order() {
    let generator = Arc::new(MockGenerator::new());
    let agent = build_agent(
        generator.clone(),
        Arc::new(MockTables::with_rows(3)),
        MockRetriever::with(default_passages()),
        Arc::new(MockExecutor::output("ok")),
    );

    let (tx, mut rx) = mpsc::channel(32);
    let state = agent.run_with_events(QUERY, &tx).await.expect("run should succeed");
    drop(tx);

    let roles: Vec<String> = generator.calls().into_iter().map(|(role, _)| role).collect();
    assert_eq!(
        roles,
        vec![PLANNER_ROLE, RESEARCHER_ROLE, SQL_ROLE, ANALYST_ROLE, PRESENTER_ROLE]
    );

    let steps: Vec<Step> = state.messages().iter().map(|m| m.step).collect();
    assert_eq!(
        steps,
        vec![
            Step::Planning,
            Step::DocumentSearch,
            Step::SqlExecution,
            Step::Analysis,
            Step::FinalAnswer
        ]
    );

    let mut completed = Vec::new();
    while let Some(event) = rx.recv().await {
        if let PipelineEvent::StageCompleted { stage, .. } = event {
            completed.push(stage);
        }
    }
    assert_eq!(completed, Stage::ALL.to_vec());
}

#[tokio::test]
async fn test_later_prompts_see_earlier_outputs() {
    let generator = Arc::new(MockGenerator::new());
    let agent = build_agent(
        generator.clone(),
        Arc::new(MockTables::with_rows(3)),
        MockRetriever::with(default_passages()),
        Arc::new(MockExecutor::output("Mortgage leads")),
    );

    let state = agent.run(QUERY).await.expect("run should succeed");

    assert!(generator.prompt_for(RESEARCHER_ROLE).contains(PLAN));
    assert!(generator.prompt_for(SQL_ROLE).contains(PLAN));
    assert!(generator.prompt_for(ANALYST_ROLE).contains("Returned 3 rows"));

    let synthesis = generator.prompt_for(PRESENTER_ROLE);
    assert!(synthesis.contains(QUERY));
    assert!(synthesis.contains("--- Source: Q2_2024_Risk_Report.txt ---"));
    assert!(synthesis.contains("Mortgage leads"));

    // The search string is trimmed before retrieval and logging.
    assert!(state.messages()[1]
        .content
        .starts_with("**Document Search:** average loan amount policy\n\n"));
}

#[tokio::test]
async fn test_synthesis_inputs_are_truncated() {
    let generator = Arc::new(MockGenerator::new());
    let limits = ContextLimits {
        excerpt_chars: 5_000,
        ..ContextLimits::default()
    };
    let agent = AnalystAgent::builder()
        .generator(generator.clone())
        .tables(Arc::new(MockTables::with_rows(80)))
        .retriever(Arc::new(MockRetriever::with(vec![Passage::new(
            "Outlook.md",
            "é".repeat(3_000),
        )])))
        .code_executor(Arc::new(MockExecutor::output("ok")))
        .limits(limits)
        .build()
        .expect("agent should build");

    let state = agent.run(QUERY).await.expect("run should succeed");
    assert!(state.document_context().chars().count() > 2_000);
    assert!(state.sql_results().chars().count() > 1_000);

    let synthesis = generator.prompt_for(PRESENTER_ROLE);
    let documents = section(
        &synthesis,
        "CONTEXT FROM INTERNAL DOCUMENTS:\n",
        "\n\nSQL RESULTS:\n",
    );
    assert_eq!(documents, truncate_chars(state.document_context(), 2_000));

    let sql = section(&synthesis, "SQL RESULTS:\n", "\n\nSTATISTICAL ANALYSIS:\n");
    assert_eq!(sql, truncate_chars(state.sql_results(), 1_000));

    // The analysis prompt sees the same 1000-character slice.
    assert!(generator
        .prompt_for(ANALYST_ROLE)
        .contains(truncate_chars(state.sql_results(), 1_000)));
}

#[tokio::test]
async fn test_plan_failure_is_fatal() {
    let generator = Arc::new(MockGenerator::failing_for(PLANNER_ROLE));
    let agent = build_agent(
        generator.clone(),
        Arc::new(MockTables::with_rows(5)),
        MockRetriever::with(default_passages()),
        Arc::new(MockExecutor::output("ok")),
    );

    let failure = agent.run(QUERY).await.expect_err("plan failure must fail the run");

    assert_eq!(failure.error.stage(), Some(Stage::Plan));
    assert_eq!(failure.metadata.success, Some(false));
    assert!(failure
        .metadata
        .error
        .as_deref()
        .is_some_and(|e| e.contains("service unavailable")));
    assert_eq!(generator.call_count.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_generation_failure_is_fatal_outside_compute() {
    for (role, stage) in [
        (RESEARCHER_ROLE, Stage::Retrieve),
        (SQL_ROLE, Stage::Query),
        (PRESENTER_ROLE, Stage::Synthesize),
    ] {
        let agent = build_agent(
            Arc::new(MockGenerator::failing_for(role)),
            Arc::new(MockTables::with_rows(5)),
            MockRetriever::with(default_passages()),
            Arc::new(MockExecutor::output("ok")),
        );
        let failure = agent.run(QUERY).await.expect_err("run should fail");
        match failure.error {
            RunError::Stage(e) => assert_eq!(e.stage, stage),
            other => panic!("unexpected error: {}", other),
        }
    }
}

#[tokio::test]
async fn test_compute_absorbs_every_failure() {
    let cases: Vec<(MockExecutor, &str)> = vec![
        (
            MockExecutor::output("Error in analysis: KeyError 'loan_amount'"),
            DIRECT_FALLBACK_PREFIX,
        ),
        (
            MockExecutor::failing(|| ExecutionError::MissingOutput {
                variable: "result".to_string(),
            }),
            DIRECT_FALLBACK_PREFIX,
        ),
        (
            MockExecutor::failing(|| ExecutionError::Timeout { seconds: 60 }),
            SKIPPED_FALLBACK_PREFIX,
        ),
        (
            MockExecutor::failing(|| ExecutionError::Unavailable("python3 not found".to_string())),
            SKIPPED_FALLBACK_PREFIX,
        ),
    ];

    for (executor, prefix) in cases {
        let agent = build_agent(
            Arc::new(MockGenerator::new()),
            Arc::new(MockTables::with_rows(5)),
            MockRetriever::with(default_passages()),
            Arc::new(executor),
        );
        let state = agent.run(QUERY).await.expect("compute failures are absorbed");
        assert_eq!(
            state.analysis_results(),
            format!("{}{}", prefix, truncate_chars(state.sql_results(), 500))
        );
        assert_eq!(state.metadata().success, Some(true));
    }
}

#[tokio::test]
async fn test_compute_generation_and_table_failures_are_absorbed() {
    let agent = build_agent(
        Arc::new(MockGenerator::failing_for(ANALYST_ROLE)),
        Arc::new(MockTables::with_rows(5)),
        MockRetriever::with(default_passages()),
        Arc::new(MockExecutor::output("unused")),
    );
    let state = agent.run(QUERY).await.expect("run should succeed");
    assert!(state.analysis_results().starts_with(SKIPPED_FALLBACK_PREFIX));

    let agent = build_agent(
        Arc::new(MockGenerator::new()),
        Arc::new(MockTables::failing_table_loads(5)),
        MockRetriever::with(default_passages()),
        Arc::new(MockExecutor::output("unused")),
    );
    let state = agent.run(QUERY).await.expect("run should succeed");
    assert!(state.analysis_results().starts_with(SKIPPED_FALLBACK_PREFIX));
}

#[tokio::test]
async fn test_retrieval_failure_becomes_context_text() {
    let agent = build_agent(
        Arc::new(MockGenerator::new()),
        Arc::new(MockTables::with_rows(5)),
        MockRetriever::failing(),
        Arc::new(MockExecutor::output("ok")),
    );
    let state = agent.run(QUERY).await.expect("run should succeed");
    assert!(state
        .document_context()
        .starts_with("Error searching documents: "));
}

#[tokio::test]
async fn test_concurrent_runs_keep_independent_state() {
    let generator = Arc::new(MockGenerator::echoing());
    let agent = build_agent(
        generator.clone(),
        Arc::new(MockTables::with_rows(5)),
        MockRetriever::with(default_passages()),
        Arc::new(MockExecutor::output("Mortgage: $410,000 average")),
    );

    let first_query = "What is the default rate by province?";
    let second_query = "How many fraudulent transactions were there in March?";
    let (first, second) = tokio::join!(agent.run(first_query), agent.run(second_query));
    let first = first.expect("first run should succeed");
    let second = second.expect("second run should succeed");

    // Both plans were requested before either run moved on.
    let calls = generator.calls();
    assert_eq!(calls[0].0, PLANNER_ROLE);
    assert_eq!(calls[1].0, PLANNER_ROLE);
    assert_eq!(calls.len(), 10);

    assert_ne!(first.run_id(), second.run_id());
    assert_eq!(first.messages().len(), 5);
    assert_eq!(second.messages().len(), 5);

    assert_eq!(first.query(), first_query);
    assert_eq!(first.analysis_plan(), format!("Plan for: {}", first_query));
    assert_eq!(first.final_answer(), format!("Answer to: {}", first_query));
    assert_eq!(second.query(), second_query);
    assert_eq!(second.analysis_plan(), format!("Plan for: {}", second_query));
    assert_eq!(second.final_answer(), format!("Answer to: {}", second_query));

    assert_eq!(first.metadata().success, Some(true));
    assert_eq!(second.metadata().success, Some(true));
}

#[tokio::test]
async fn test_runs_against_sqlite_store() {
    let store = SqliteStore::in_memory().await.expect("in-memory store");
    store
        .execute_batch(
            r#"
            INSERT INTO loans VALUES
                ('L000001', '2024-01-15', 'Auto', 25000.0, 5.5, 60, 700, 'ON', 34, 72000.0, 'Full-time', 0, 0),
                ('L000002', '2024-02-11', 'Mortgage', 410000.0, 4.2, 300, 760, 'BC', 41, 140000.0, 'Full-time', 0, 0),
                ('L000003', '2024-03-09', 'Personal', 12000.0, 9.9, 36, 610, 'AB', 29, 48000.0, 'Part-time', 1, 120),
                ('L000004', '2024-04-22', 'Business', 90000.0, 7.1, 84, 690, 'QC', 52, 110000.0, 'Self-employed', 0, 0),
                ('L000005', '2024-05-30', 'Line of Credit', 15000.0, 8.4, 12, 655, 'ON', 37, 61000.0, 'Full-time', 0, 15);
            "#,
        )
        .await
        .expect("seed data");

    let agent = AnalystAgent::builder()
        .generator(Arc::new(MockGenerator::new()))
        .tables(Arc::new(store))
        .retriever(Arc::new(MockRetriever::empty()))
        .code_executor(Arc::new(MockExecutor::output("ok")))
        .build()
        .expect("agent should build");

    let state = agent.run(QUERY).await.expect("run should succeed");
    assert!(state
        .sql_results()
        .starts_with("Query executed successfully. Returned 5 rows."));
    assert!(state.sql_results().contains("Mortgage"));
}

fn line_after<'a>(text: &'a str, prefix: &str) -> &'a str {
    text.lines()
        .find_map(|line| line.strip_prefix(prefix))
        .expect("prompt should carry the question")
}

fn section<'a>(text: &'a str, start: &str, end: &str) -> &'a str {
    let from = text.find(start).expect("start marker") + start.len();
    let to = text[from..].find(end).expect("end marker") + from;
    &text[from..to]
}
