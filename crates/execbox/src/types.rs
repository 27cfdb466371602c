use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::Language;
use crate::runner::ValidationError;

/// Wall-clock budget for a sandboxed process, measured from sandbox start
pub const WALL_TIME_LIMIT: Duration = Duration::from_secs(30);

/// Memory ceiling for a sandbox in bytes (256 MiB, swap disabled)
pub const MEMORY_LIMIT_BYTES: i64 = 256 * 1024 * 1024;

/// CFS scheduler period in microseconds
pub const CPU_PERIOD_MICROS: i64 = 100_000;

/// CFS quota per period in microseconds (half of one core)
pub const CPU_QUOTA_MICROS: i64 = 50_000;

/// Maximum number of processes and threads inside a sandbox
pub const PIDS_LIMIT: i64 = 256;

/// Per-stream capture ceiling; anything past it is dropped
pub const MAX_STREAM_BYTES: usize = 1024 * 1024;

/// Bound on reading streams once the process has exited or been killed
pub const STREAM_READ_GRACE: Duration = Duration::from_secs(5);

/// Bound on sandbox removal during teardown
pub const TEARDOWN_GRACE: Duration = Duration::from_secs(10);

/// Exit code recorded when the process was killed at the deadline
///
/// Container exit codes are always in `0..=255`, so this never collides with
/// a natural exit.
pub const TIMEOUT_EXIT_CODE: i64 = -1;

/// Resource ceilings applied to every sandbox
///
/// These are fixed policy. Nothing in an execution request can raise them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SandboxLimits {
    /// Memory ceiling in bytes
    pub memory_bytes: i64,
    /// CFS period in microseconds
    pub cpu_period: i64,
    /// CFS quota in microseconds per period
    pub cpu_quota: i64,
    /// Maximum number of processes/threads
    pub pids: i64,
    /// Wall clock limit
    pub wall_time: Duration,
}

impl SandboxLimits {
    /// The fraction of one CPU core the sandbox may use
    pub fn cpu_share(&self) -> f64 {
        self.cpu_quota as f64 / self.cpu_period as f64
    }
}

impl Default for SandboxLimits {
    fn default() -> Self {
        Self {
            memory_bytes: MEMORY_LIMIT_BYTES,
            cpu_period: CPU_PERIOD_MICROS,
            cpu_quota: CPU_QUOTA_MICROS,
            pids: PIDS_LIMIT,
            wall_time: WALL_TIME_LIMIT,
        }
    }
}

/// A host directory bound into the sandbox
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountConfig {
    /// Source path on the host
    pub source: PathBuf,

    /// Target path in the sandbox
    pub target: String,

    /// Whether the mount is read-write
    pub writable: bool,
}

impl MountConfig {
    /// Render the mount in the engine's `source:target:mode` bind syntax
    pub fn bind(&self) -> String {
        let mode = if self.writable { "rw" } else { "ro" };
        format!("{}:{}:{mode}", self.source.display(), self.target)
    }
}

/// An execution request as received from the ingress
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRequest {
    /// Source code to run
    pub code: String,

    /// Language tag (e.g., "python")
    pub language: String,

    /// Text fed to the program as standard input
    #[serde(default)]
    pub input: Option<String>,
}

impl ExecutionRequest {
    pub fn new(code: impl Into<String>, language: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            language: language.into(),
            input: None,
        }
    }

    /// Attach standard input
    pub fn with_input(mut self, input: impl Into<String>) -> Self {
        self.input = Some(input.into());
        self
    }
}

/// A validated request that has been assigned its identity
///
/// Everything here is fixed at acceptance; the sandbox run only adds the
/// outcome fields when the final [`Execution`] is assembled.
#[derive(Debug, Clone)]
pub struct PendingExecution {
    pub id: String,
    pub code: String,
    pub language: Language,
    pub input: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl PendingExecution {
    /// Validate a request and assign it a fresh identifier
    ///
    /// An empty input string is treated as no input.
    pub fn accept(request: ExecutionRequest) -> Result<Self, ValidationError> {
        if request.code.is_empty() {
            return Err(ValidationError::EmptyCode);
        }
        let language: Language = request.language.parse()?;

        Ok(Self {
            id: new_execution_id(),
            code: request.code,
            language,
            input: request.input.filter(|input| !input.is_empty()),
            created_at: Utc::now(),
        })
    }
}

/// Generate a new, never reused execution identifier
pub fn new_execution_id() -> String {
    format!("exec_{}", Uuid::new_v4())
}

/// Terminal outcome of an execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    /// The process exited on its own before the deadline
    Completed,

    /// The process was killed at the wall-clock deadline
    TimedOut,
}

/// The final record of one execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Execution {
    pub id: String,
    pub code: String,
    pub language: Language,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<String>,

    /// Captured standard output
    pub output: String,

    /// Captured standard error
    pub error: String,

    /// Process exit code, or [`TIMEOUT_EXIT_CODE`]
    pub exit_code: i64,

    pub status: ExecutionStatus,

    pub created_at: DateTime<Utc>,

    /// Seconds from sandbox start until the process was gone and its
    /// streams were read
    pub duration: f64,
}

impl Execution {
    /// Check if the program ran to completion and exited with code 0
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == ExecutionStatus::Completed && self.exit_code == 0
    }

    #[must_use]
    pub fn timed_out(&self) -> bool {
        self.status == ExecutionStatus::TimedOut
    }
}
