//! Configuration for the analysis sandbox.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default interpreter used when no container image is configured.
pub const DEFAULT_PYTHON: &str = "python3";

/// Default wall-clock limit for one snippet.
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// How generated analysis code is run.
///
/// Without an image the snippet runs in a local interpreter subprocess.
/// With an image it runs inside `docker run --rm` with the work directory
/// mounted read-only and networking disabled by default.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxConfig {
    /// Python executable (local) or command inside the container.
    pub python: String,
    /// Timeout for one execution.
    pub timeout: Duration,
    /// Docker image with pandas and numpy installed.
    pub docker_image: Option<String>,
    /// Memory limit in bytes (docker only).
    pub memory_limit: u64,
    /// CPU limit in cores, 0 for unlimited (docker only).
    pub cpu_limit: f64,
    /// Network mode ("none", "bridge", "host"; docker only).
    pub network_mode: String,
}

impl SandboxConfig {
    pub fn new(python: impl Into<String>) -> Self {
        Self {
            python: python.into(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            docker_image: None,
            memory_limit: 1024 * 1024 * 1024, // 1GB
            cpu_limit: 0.0,
            network_mode: "none".to_string(),
        }
    }

    /// Runs snippets inside the given docker image.
    pub fn with_docker_image(mut self, image: impl Into<String>) -> Self {
        self.docker_image = Some(image.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the memory limit in MB.
    pub fn with_memory_mb(mut self, mb: u64) -> Self {
        self.memory_limit = mb * 1024 * 1024;
        self
    }

    pub fn with_cpu_limit(mut self, cores: f64) -> Self {
        self.cpu_limit = cores;
        self
    }

    pub fn with_network(mut self, mode: impl Into<String>) -> Self {
        self.network_mode = mode.into();
        self
    }

    pub fn uses_docker(&self) -> bool {
        self.docker_image.is_some()
    }
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self::new(DEFAULT_PYTHON)
    }
}
