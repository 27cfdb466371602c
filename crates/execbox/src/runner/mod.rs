//! Execution runner for execbox
//!
//! Accepts requests and carries each one through staging, sandbox
//! supervision, teardown and result assembly.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, error, info, instrument};

pub use crate::runner::assemble::assemble;
pub use crate::runner::supervisor::{Outcome, SandboxState, Supervised, supervise};

mod assemble;
mod supervisor;

use crate::{
    config::{Config, ImagePolicy, UnsupportedLanguage},
    sandbox::{DockerRuntime, SandboxError, SandboxLease, SandboxRuntime, SandboxSpec, StagingError, Workspace},
    types::{Execution, ExecutionRequest, PendingExecution},
};

/// Errors that reject a request before any resource is touched
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("code must not be empty")]
    EmptyCode,

    #[error(transparent)]
    UnsupportedLanguage(#[from] UnsupportedLanguage),
}

/// Errors that occur while executing a request
#[derive(Debug, Error)]
pub enum ExecuteError {
    #[error("invalid request: {0}")]
    Validation(#[from] ValidationError),

    #[error("staging error: {0}")]
    Staging(#[from] StagingError),

    #[error("sandbox error: {0}")]
    Sandbox(#[from] SandboxError),
}

impl ExecuteError {
    /// HTTP status an ingress layer should report for this error
    ///
    /// Client mistakes map to 400, local filesystem failures to 500, and
    /// container engine failures to 502.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Validation(_) => 400,
            Self::Staging(_) => 500,
            Self::Sandbox(_) => 502,
        }
    }
}

/// High-level runner for code execution
///
/// Cloning is cheap; clones share the sandbox runtime.
#[derive(Debug, Clone)]
pub struct Runner {
    config: Config,
    runtime: Arc<dyn SandboxRuntime>,
}

impl Runner {
    /// Create a runner on top of an existing sandbox runtime
    pub fn new(config: Config, runtime: Arc<dyn SandboxRuntime>) -> Self {
        Self { config, runtime }
    }

    /// Connect to the Docker engine named by the config
    ///
    /// With [`ImagePolicy::Prefetch`] every language image is pulled before
    /// this returns.
    #[instrument(skip(config))]
    pub async fn connect(config: Config) -> Result<Self, SandboxError> {
        let docker = DockerRuntime::connect(&config)?;
        docker.ping().await?;

        if config.image_policy == ImagePolicy::Prefetch {
            info!("prefetching sandbox images");
            docker.prefetch_images().await?;
        }

        Ok(Self::new(config, Arc::new(docker)))
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Get the shared sandbox runtime
    pub fn runtime(&self) -> &Arc<dyn SandboxRuntime> {
        &self.runtime
    }

    /// Validate and run a request
    ///
    /// Returns the complete record, possibly a timed out one, or exactly one
    /// typed error.
    pub async fn execute(&self, request: ExecutionRequest) -> Result<Execution, ExecuteError> {
        let pending = PendingExecution::accept(request)?;
        self.execute_pending(pending).await
    }

    /// Run an already accepted request
    ///
    /// Sandbox and workspace are torn down before this returns, on every path.
    /// A record is only returned once both are gone; a supervision error
    /// takes precedence over a teardown error.
    #[instrument(skip(self, pending), fields(id = %pending.id, language = %pending.language))]
    pub async fn execute_pending(&self, pending: PendingExecution) -> Result<Execution, ExecuteError> {
        let workspace = Workspace::stage(
            &self.config.workspace_root(),
            &pending.id,
            pending.language,
            &pending.code,
            pending.input.as_deref(),
        )
        .await?;

        let spec = SandboxSpec::build(&pending.id, pending.language, &workspace);
        // Leased before create so a half-created sandbox is still removed
        let lease = SandboxLease::new(self.runtime.clone(), spec.handle());

        let supervised = supervise(self.runtime.as_ref(), &spec).await;

        // Both steps always run; the first failure decides the result.
        let released = lease.release().await;
        if let Err(ref e) = released {
            error!(sandbox = %spec.name, error = %e, "sandbox teardown failed");
        }
        let removed = workspace.remove().await;
        if let Err(ref e) = removed {
            error!(error = %e, "workspace teardown failed");
        }

        let supervised = supervised?;
        released?;
        removed?;

        let execution = assemble(pending, supervised);
        debug!(
            status = ?execution.status,
            exit_code = execution.exit_code,
            duration = execution.duration,
            "execution complete"
        );
        Ok(execution)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_are_distinct() {
        let validation = ExecuteError::from(ValidationError::EmptyCode);
        let staging = ExecuteError::from(StagingError::CreateDir {
            path: "/nowhere".into(),
            source: std::io::Error::other("disk full"),
        });
        let sandbox = ExecuteError::from(SandboxError::ImageMissing("python:3.9-slim".to_owned()));

        assert_eq!(validation.status_code(), 400);
        assert_eq!(staging.status_code(), 500);
        assert_eq!(sandbox.status_code(), 502);
    }

    #[test]
    fn unsupported_language_message_is_transparent() {
        let err = ValidationError::from(UnsupportedLanguage("cobol".to_owned()));
        assert_eq!(err.to_string(), UnsupportedLanguage("cobol".to_owned()).to_string());
    }
}
