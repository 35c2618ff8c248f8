//! Sandboxed execution of generated analysis code.
//!
//! Best effort only: a local interpreter subprocess, or a throwaway docker
//! container when an image is configured. Either way the snippet sees the
//! bound tables as pandas DataFrames and must bind `result`.

pub mod config;
pub mod harness;
pub mod python;

pub use config::{SandboxConfig, DEFAULT_PYTHON, DEFAULT_TIMEOUT_SECS};
pub use python::{interpret_output, PythonSandbox};
