//! A library for running untrusted code in containers.
//!
//! execbox takes a source file, a language tag and optional standard input,
//! runs the program once inside a throwaway Docker container, and returns
//! its captured output, exit code and timing.
//!
//! # Features
//!
//! - **Fixed language registry**: Python, JavaScript, Go, Ruby and Java, each with its own image and invocation.
//! - **Isolated sandboxes**: No networking, 256 MiB memory, half a CPU core, a bounded process count.
//! - **Wall-clock deadline**: Programs are killed after 30 seconds and reported as timed out.
//! - **Guaranteed teardown**: Workspaces and sandboxes are removed on every exit path.
//! - **Pluggable runtime**: The container engine sits behind the [`SandboxRuntime`] trait.

pub use config::{Config, ConfigError, EXAMPLE_CONFIG, ImagePolicy, Language, UnsupportedLanguage};
pub use runner::{ExecuteError, Runner, ValidationError};
pub use sandbox::{
    DockerRuntime, SandboxError, SandboxHandle, SandboxLease, SandboxRuntime, SandboxSpec,
    StagingError, Streams, WaitOutcome, Workspace,
};
pub use types::{
    Execution, ExecutionRequest, ExecutionStatus, MountConfig, PendingExecution, SandboxLimits,
    TIMEOUT_EXIT_CODE, WALL_TIME_LIMIT,
};

pub mod config;
pub mod runner;
pub mod sandbox;
pub mod types;
