//! LLM prompts for the five analysis stages.
//!
//! Each builder returns a [`StagePrompt`]: the fixed system role for the
//! stage and the user prompt with the stage inputs filled in.
//!
//! ```no_run
//! use finsight::prompts::{build_plan_prompt, build_sql_prompt};
//!
//! let plan = build_plan_prompt("What was the default rate in Q2 2024?");
//! let sql = build_sql_prompt("1. Filter loans to Q2 2024 ...");
//! assert_eq!(plan.system, "You are an expert financial analyst.");
//! ```

pub mod stages;

pub use stages::{
    build_analysis_prompt, build_plan_prompt, build_search_prompt, build_sql_prompt,
    build_synthesis_prompt, StagePrompt, SynthesisInputs, ANALYST_ROLE, PLANNER_ROLE,
    PRESENTER_ROLE, RESEARCHER_ROLE, SQL_ROLE,
};
