//! Sandbox provisioning
//!
//! This module stages per-execution workspaces, derives launch descriptors,
//! and drives sandbox instances on the container engine through the
//! [`SandboxRuntime`] seam.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, warn};

pub use crate::sandbox::docker::DockerRuntime;
pub use crate::sandbox::spec::{SandboxSpec, sandbox_name, shell_quote};
pub use crate::sandbox::workspace::{StagingError, Workspace};
use crate::types::{MAX_STREAM_BYTES, TEARDOWN_GRACE};

mod docker;
mod spec;
mod workspace;

/// Errors reported by the container engine or while talking to it
#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("failed to connect to container engine: {0}")]
    Connect(String),

    #[error("failed to pull image {image}: {message}")]
    ImagePull { image: String, message: String },

    #[error("image {0} is not available on the engine")]
    ImageMissing(String),

    #[error("failed to create sandbox {name}: {message}")]
    CreateFailed { name: String, message: String },

    #[error("failed to start sandbox {name}: {message}")]
    StartFailed { name: String, message: String },

    #[error("failed to observe exit of sandbox {name}: {message}")]
    WaitFailed { name: String, message: String },

    #[error("failed to kill sandbox {name}: {message}")]
    KillFailed { name: String, message: String },

    #[error("failed to read streams of sandbox {name}: {message}")]
    StreamsFailed { name: String, message: String },

    #[error("timed out reading streams of sandbox {0}")]
    StreamReadTimeout(String),

    #[error("failed to remove sandbox {name}: {message}")]
    RemoveFailed { name: String, message: String },

    #[error("timed out removing sandbox {0}")]
    RemoveTimeout(String),
}

/// Reference to one sandbox instance
///
/// The name is derived from the execution id before the sandbox exists, so a
/// handle can be used to remove a sandbox whose creation failed halfway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SandboxHandle {
    pub name: String,
    /// Engine-assigned id, known once creation succeeded
    pub id: Option<String>,
}

impl SandboxHandle {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id: None,
        }
    }
}

/// Result of waiting for a sandbox under a deadline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// The process exited with this code
    Exited(i64),

    /// The deadline passed while the process was still running
    DeadlineElapsed,
}

/// Captured output of a sandbox
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Streams {
    pub stdout: String,
    pub stderr: String,

    /// Whether either stream hit [`MAX_STREAM_BYTES`]
    pub truncated: bool,
}

/// Accumulates stream chunks up to a per-stream ceiling
#[derive(Debug)]
pub struct StreamCollector {
    stdout: Vec<u8>,
    stderr: Vec<u8>,
    limit: usize,
    truncated: bool,
}

impl StreamCollector {
    pub fn new() -> Self {
        Self::with_limit(MAX_STREAM_BYTES)
    }

    pub fn with_limit(limit: usize) -> Self {
        Self {
            stdout: Vec::new(),
            stderr: Vec::new(),
            limit,
            truncated: false,
        }
    }

    pub fn push_stdout(&mut self, chunk: &[u8]) {
        self.truncated |= append_capped(&mut self.stdout, chunk, self.limit);
    }

    pub fn push_stderr(&mut self, chunk: &[u8]) {
        self.truncated |= append_capped(&mut self.stderr, chunk, self.limit);
    }

    /// Decode the collected bytes, replacing invalid UTF-8
    pub fn finish(self) -> Streams {
        Streams {
            stdout: String::from_utf8_lossy(&self.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&self.stderr).into_owned(),
            truncated: self.truncated,
        }
    }
}

impl Default for StreamCollector {
    fn default() -> Self {
        Self::new()
    }
}

/// Append as much of `chunk` as fits; returns true if anything was dropped
fn append_capped(buffer: &mut Vec<u8>, chunk: &[u8], limit: usize) -> bool {
    let room = limit.saturating_sub(buffer.len());
    let take = room.min(chunk.len());
    buffer.extend_from_slice(&chunk[..take]);
    take < chunk.len()
}

/// The provisioning substrate that sandbox instances run on
///
/// One implementation value is shared by all concurrent executions; every
/// method acts on a single sandbox identified by its handle.
#[async_trait]
pub trait SandboxRuntime: Send + Sync + std::fmt::Debug {
    /// Make sure an image can be used to create sandboxes
    async fn ensure_image(&self, _image: &str) -> Result<(), SandboxError> {
        Ok(())
    }

    /// Create (but do not start) the sandbox described by `spec`
    async fn create(&self, spec: &SandboxSpec) -> Result<SandboxHandle, SandboxError>;

    async fn start(&self, handle: &SandboxHandle) -> Result<(), SandboxError>;

    /// Wait until the sandboxed process exits and return its exit code
    async fn wait(&self, handle: &SandboxHandle) -> Result<i64, SandboxError>;

    /// Wait for exit, giving up once `deadline` is reached
    async fn await_exit(
        &self,
        handle: &SandboxHandle,
        deadline: Instant,
    ) -> Result<WaitOutcome, SandboxError> {
        match tokio::time::timeout_at(deadline, self.wait(handle)).await {
            Ok(exit) => exit.map(WaitOutcome::Exited),
            Err(_) => Ok(WaitOutcome::DeadlineElapsed),
        }
    }

    /// Forcibly terminate the sandboxed process
    async fn kill(&self, handle: &SandboxHandle) -> Result<(), SandboxError>;

    async fn read_streams(&self, handle: &SandboxHandle) -> Result<Streams, SandboxError>;

    /// Remove the sandbox, killing it if still running
    ///
    /// Must be idempotent: removing a sandbox that does not exist succeeds.
    async fn remove(&self, handle: &SandboxHandle) -> Result<(), SandboxError>;
}

/// Ownership of one sandbox instance until it is removed
///
/// Call [`release()`](Self::release) on every path. If a lease is dropped
/// unreleased (a panic, a cancelled task), removal is attempted in a
/// background task on the current runtime.
#[derive(Debug)]
pub struct SandboxLease {
    runtime: Arc<dyn SandboxRuntime>,
    handle: SandboxHandle,
    released: bool,
}

impl SandboxLease {
    pub fn new(runtime: Arc<dyn SandboxRuntime>, handle: SandboxHandle) -> Self {
        Self {
            runtime,
            handle,
            released: false,
        }
    }

    pub fn handle(&self) -> &SandboxHandle {
        &self.handle
    }

    /// Remove the sandbox, bounded by [`TEARDOWN_GRACE`]
    pub async fn release(mut self) -> Result<(), SandboxError> {
        self.released = true;
        match tokio::time::timeout(TEARDOWN_GRACE, self.runtime.remove(&self.handle)).await {
            Ok(Ok(())) => {
                debug!(sandbox = %self.handle.name, "sandbox removed");
                Ok(())
            }
            Ok(Err(e)) => Err(e),
            Err(_) => Err(SandboxError::RemoveTimeout(self.handle.name.clone())),
        }
    }
}

impl Drop for SandboxLease {
    fn drop(&mut self) {
        if self.released {
            return;
        }

        warn!(
            sandbox = %self.handle.name,
            "sandbox lease dropped without release, scheduling best-effort removal"
        );

        let Ok(rt) = tokio::runtime::Handle::try_current() else {
            warn!(sandbox = %self.handle.name, "no async runtime available, sandbox may leak");
            return;
        };
        let runtime = self.runtime.clone();
        let handle = self.handle.clone();
        rt.spawn(async move {
            match runtime.remove(&handle).await {
                Ok(()) => debug!(sandbox = %handle.name, "best-effort removal succeeded"),
                Err(e) => warn!(sandbox = %handle.name, error = %e, "best-effort removal failed"),
            }
        });
    }
}
