//! Prompt builders for each pipeline stage.
//!
//! Builders take already-truncated inputs; deciding how much of a prior
//! stage's output goes into a prompt is the stage's job.

use crate::store::{describe_table, LOANS_COLUMNS, TRANSACTIONS_COLUMNS};

/// A system role plus user prompt pair for one generation call.
#[derive(Debug, Clone, PartialEq)]
pub struct StagePrompt {
    pub system: &'static str,
    pub user: String,
}

impl StagePrompt {
    fn new(system: &'static str, user: String) -> Self {
        Self { system, user }
    }
}

pub const PLANNER_ROLE: &str = "You are an expert financial analyst.";
pub const RESEARCHER_ROLE: &str = "You are a research assistant.";
pub const SQL_ROLE: &str = "You are a SQL expert. Return only valid SQL queries.";
pub const ANALYST_ROLE: &str = "You are a Python data analysis expert.";
pub const PRESENTER_ROLE: &str =
    "You are a senior financial analyst presenting findings to business stakeholders.";

/// Schema listing shared by the query and analysis prompts.
fn schema_lines(loans_name: &str, transactions_name: &str, suffix: &str) -> String {
    format!(
        "- {}{}\n- {}{}",
        describe_table(loans_name, LOANS_COLUMNS),
        suffix,
        describe_table(transactions_name, TRANSACTIONS_COLUMNS),
        suffix,
    )
}

pub fn build_plan_prompt(query: &str) -> StagePrompt {
    let user = format!(
        r#"You are a financial data analyst planning how to answer this question.

User query: {query}

Create a step-by-step analysis plan. Include:
1. What data tables/columns to query (loans, transactions tables available)
2. What calculations/statistics to compute
3. What insights to look for
4. What context from documents might be relevant

Be specific and actionable. Keep it concise (3-5 steps)."#
    );
    StagePrompt::new(PLANNER_ROLE, user)
}

pub fn build_search_prompt(query: &str, plan: &str) -> StagePrompt {
    let user = format!(
        r#"Based on this query: {query}

And this analysis plan: {plan}

What should we search for in our internal risk reports, lending policies, and economic outlooks?
Provide a concise search query (3-7 words) to find relevant context about WHY trends might have occurred."#
    );
    StagePrompt::new(RESEARCHER_ROLE, user)
}

pub fn build_sql_prompt(plan: &str) -> StagePrompt {
    let schema = schema_lines("loans", "transactions", "");
    let user = format!(
        r#"Based on this analysis plan:
{plan}

Available tables and columns:
{schema}

Write a SQL query to get the necessary data.
IMPORTANT:
- Use proper date formatting: BETWEEN '2024-01-01' AND '2024-12-31'
- Include aggregations where appropriate (AVG, COUNT, SUM)
- Keep it focused on the user's question

Provide ONLY the SQL query, nothing else."#
    );
    StagePrompt::new(SQL_ROLE, user)
}

/// `sql_excerpt` is the leading part of the query stage's output.
pub fn build_analysis_prompt(sql_excerpt: &str, plan: &str) -> StagePrompt {
    let loans = format!("DataFrame with columns: {}", LOANS_COLUMNS.join(", "));
    let transactions = format!("DataFrame with columns: {}", TRANSACTIONS_COLUMNS.join(", "));
    let user = format!(
        r#"Based on these SQL results:
{sql_excerpt}

And this plan:
{plan}

Write Python code using pandas and numpy to compute relevant statistics, trends, or comparisons.
You have access to:
- loans_df: {loans}
- transactions_df: {transactions}

CRITICAL - Use EXACT column names:
- For loans: 'defaulted' (not 'default_status'), 'amount' (not 'loan_amount')
- For transactions: 'amount' (not 'payment_amount')

IMPORTANT:
- Store the final result in a variable called 'result'
- Make 'result' a clear, formatted string with key findings
- Include percentages, comparisons, trends
- Keep it concise but informative
- If SQL results already answer the question, just summarize them

Provide ONLY Python code, nothing else."#
    );
    StagePrompt::new(ANALYST_ROLE, user)
}

/// Everything the final answer is written from. Text fields are expected to
/// be truncated by the caller.
#[derive(Debug, Clone, Copy)]
pub struct SynthesisInputs<'a> {
    pub query: &'a str,
    pub plan: &'a str,
    pub document_context: &'a str,
    pub sql_results: &'a str,
    pub analysis: &'a str,
}

pub fn build_synthesis_prompt(inputs: SynthesisInputs<'_>) -> StagePrompt {
    let SynthesisInputs {
        query,
        plan,
        document_context,
        sql_results,
        analysis,
    } = inputs;
    let user = format!(
        r#"User asked: {query}

You have gathered the following information:

ANALYSIS PLAN:
{plan}

CONTEXT FROM INTERNAL DOCUMENTS:
{document_context}

SQL RESULTS:
{sql_results}

STATISTICAL ANALYSIS:
{analysis}

Now provide a comprehensive answer that:
1. **Directly answers the user's question** (lead with the answer)
2. **Highlights key findings** with specific numbers
3. **Explains WHY** using context from internal documents
4. **Provides actionable insights** or recommendations

Format:
- Use clear paragraphs
- Bold key findings
- Be conversational but professional
- Cite document sources when using their context (e.g., "According to our Q2 2024 Risk Report...")

Keep it concise (200-300 words) but comprehensive."#
    );
    StagePrompt::new(PRESENTER_ROLE, user)
}
