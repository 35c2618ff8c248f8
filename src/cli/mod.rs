//! Command-line interface for finsight.
//!
//! Provides commands for answering questions, interactive chat, document
//! indexing and direct SQL access.

mod commands;

pub use commands::{
    error_notice, load_config, parse_cli, render_reasoning, run, run_with_cli, Cli, Commands,
    CommonArgs,
};
