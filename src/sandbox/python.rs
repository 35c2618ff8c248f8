//! Subprocess executor for generated pandas snippets.

use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, warn};
use uuid::Uuid;

use super::config::SandboxConfig;
use super::harness::{
    harness_source, tagged_value, ERROR_TAG, EXIT_FAILED, EXIT_MISSING_OUTPUT, HARNESS_FILE,
    MANIFEST_FILE, RESULT_TAG, SNIPPET_FILE,
};
use crate::error::ExecutionError;
use crate::ports::{BoundTables, CellValue, CodeExecutor, OUTPUT_VARIABLE};

/// Mount point of the work directory inside the container.
const CONTAINER_WORKDIR: &str = "/sandbox";

/// Executes snippets in a fresh Python process per call.
///
/// Each call gets its own temporary work directory, removed afterwards, so
/// concurrent runs never share files.
#[derive(Debug, Clone, Default)]
pub struct PythonSandbox {
    config: SandboxConfig,
}

#[derive(Serialize)]
struct Manifest<'a> {
    output: &'a str,
    tables: std::collections::BTreeMap<&'a str, String>,
}

#[derive(Serialize)]
struct TableFile<'a> {
    columns: &'a [String],
    rows: &'a [Vec<CellValue>],
}

impl PythonSandbox {
    pub fn new(config: SandboxConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    /// Program and arguments that run the harness over `workdir`.
    pub fn command_for(&self, workdir: &Path, container_name: &str) -> (String, Vec<String>) {
        match &self.config.docker_image {
            None => (
                self.config.python.clone(),
                vec![
                    workdir.join(HARNESS_FILE).display().to_string(),
                    workdir.display().to_string(),
                ],
            ),
            Some(image) => ("docker".to_string(), self.docker_run_args(image, workdir, container_name)),
        }
    }

    fn docker_run_args(&self, image: &str, workdir: &Path, container_name: &str) -> Vec<String> {
        let mut args = vec![
            "run".to_string(),
            "--rm".to_string(),
            "--name".to_string(),
            container_name.to_string(),
        ];

        let gb = self.config.memory_limit / (1024 * 1024 * 1024);
        if gb > 0 && self.config.memory_limit % (1024 * 1024 * 1024) == 0 {
            args.push(format!("--memory={}g", gb));
        } else {
            args.push(format!("--memory={}m", self.config.memory_limit / (1024 * 1024)));
        }
        if self.config.cpu_limit > 0.0 {
            args.push(format!("--cpus={}", self.config.cpu_limit));
        }

        args.extend([
            format!("--network={}", self.config.network_mode),
            "-v".to_string(),
            format!("{}:{}:ro", workdir.display(), CONTAINER_WORKDIR),
            image.to_string(),
            self.config.python.clone(),
            format!("{}/{}", CONTAINER_WORKDIR, HARNESS_FILE),
            CONTAINER_WORKDIR.to_string(),
        ]);

        args
    }

    async fn write_workdir(
        &self,
        workdir: &Path,
        snippet: &str,
        tables: &BoundTables,
    ) -> Result<(), ExecutionError> {
        let mut manifest = Manifest {
            output: OUTPUT_VARIABLE,
            tables: Default::default(),
        };

        for (name, table) in tables {
            let file_name = format!("{}.json", name);
            let payload = serde_json::to_vec(&TableFile {
                columns: &table.columns,
                rows: &table.rows,
            })?;
            tokio::fs::write(workdir.join(&file_name), payload).await?;
            manifest.tables.insert(name.as_str(), file_name);
        }

        tokio::fs::write(workdir.join(MANIFEST_FILE), serde_json::to_vec(&manifest)?).await?;
        tokio::fs::write(workdir.join(SNIPPET_FILE), snippet).await?;
        tokio::fs::write(workdir.join(HARNESS_FILE), harness_source()).await?;
        Ok(())
    }

    async fn remove_container(&self, name: &str) {
        let result = tokio::process::Command::new("docker")
            .args(["rm", "-f", name])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await;
        if let Err(e) = result {
            warn!("Failed to remove container {}: {}", name, e);
        }
    }
}

#[async_trait]
impl CodeExecutor for PythonSandbox {
    async fn execute(&self, snippet: &str, tables: &BoundTables) -> Result<String, ExecutionError> {
        let workdir = tempfile::Builder::new().prefix("finsight-sandbox-").tempdir()?;
        self.write_workdir(workdir.path(), snippet, tables).await?;

        let container_name = format!("finsight-sandbox-{}", Uuid::new_v4());
        let (program, args) = self.command_for(workdir.path(), &container_name);
        debug!(program = %program, tables = tables.len(), "Running analysis snippet");

        let child = tokio::process::Command::new(&program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ExecutionError::Unavailable(format!("failed to start {}: {}", program, e)))?;

        let output = match tokio::time::timeout(self.config.timeout, child.wait_with_output()).await {
            Ok(result) => result?,
            Err(_) => {
                if self.config.uses_docker() {
                    self.remove_container(&container_name).await;
                }
                return Err(ExecutionError::Timeout {
                    seconds: self.config.timeout.as_secs(),
                });
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        interpret_output(output.status.code(), &stdout, &stderr)
    }
}

/// Maps the harness exit status and output onto the port's result.
pub fn interpret_output(
    exit_code: Option<i32>,
    stdout: &str,
    stderr: &str,
) -> Result<String, ExecutionError> {
    match exit_code {
        Some(0) => tagged_value(stdout, RESULT_TAG).ok_or_else(|| ExecutionError::MissingOutput {
            variable: OUTPUT_VARIABLE.to_string(),
        }),
        Some(EXIT_FAILED) => Err(ExecutionError::Failed(
            tagged_value(stdout, ERROR_TAG).unwrap_or_else(|| last_line(stderr)),
        )),
        Some(EXIT_MISSING_OUTPUT) => Err(ExecutionError::MissingOutput {
            variable: OUTPUT_VARIABLE.to_string(),
        }),
        Some(code) => Err(ExecutionError::Unavailable(format!(
            "interpreter exited with status {}: {}",
            code,
            last_line(stderr)
        ))),
        None => Err(ExecutionError::Unavailable(
            "interpreter terminated by signal".to_string(),
        )),
    }
}

fn last_line(text: &str) -> String {
    text.lines()
        .rev()
        .find(|line| !line.trim().is_empty())
        .unwrap_or("")
        .trim()
        .to_string()
}
