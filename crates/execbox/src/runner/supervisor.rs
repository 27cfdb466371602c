//! Sandbox supervision
//!
//! Drives one sandbox from creation to a terminal state under the wall-clock
//! deadline. Teardown is not done here; the caller releases the sandbox and
//! the workspace once supervision returns, whatever the result.

use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, instrument, warn};

use crate::sandbox::{SandboxError, SandboxRuntime, SandboxSpec, Streams, WaitOutcome};
use crate::types::STREAM_READ_GRACE;

/// Lifecycle state of a supervised sandbox
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SandboxState {
    Created,
    Started,
    Completed,
    TimedOut,
    RuntimeError,
}

impl SandboxState {
    /// Whether no further transition is possible
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::TimedOut | Self::RuntimeError)
    }

    pub fn can_transition_to(self, next: SandboxState) -> bool {
        use SandboxState::*;
        matches!(
            (self, next),
            (Created, Started)
                | (Created, RuntimeError)
                | (Started, Completed)
                | (Started, TimedOut)
                | (Started, RuntimeError)
        )
    }
}

/// How the sandboxed process ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Completed { exit_code: i64 },
    TimedOut,
}

/// Everything supervision observed about one sandbox
#[derive(Debug, Clone)]
pub struct Supervised {
    pub outcome: Outcome,
    pub streams: Streams,
    /// From sandbox start until the streams were read
    pub duration: Duration,
}

/// Tracks the state machine so every step is logged and checked
#[derive(Debug)]
struct Lifecycle<'a> {
    sandbox: &'a str,
    state: SandboxState,
}

impl<'a> Lifecycle<'a> {
    fn new(sandbox: &'a str) -> Self {
        Self {
            sandbox,
            state: SandboxState::Created,
        }
    }

    fn advance(&mut self, next: SandboxState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "invalid sandbox transition {:?} -> {next:?}",
            self.state
        );
        debug!(sandbox = self.sandbox, from = ?self.state, to = ?next, "sandbox transition");
        self.state = next;
    }

    fn fail(&mut self, error: SandboxError) -> SandboxError {
        warn!(sandbox = self.sandbox, from = ?self.state, error = %error, "sandbox runtime error");
        self.advance(SandboxState::RuntimeError);
        error
    }
}

/// Run the sandbox described by `spec` to a terminal state
///
/// Returns the outcome with captured streams, or the runtime error that
/// stopped the sandbox. A deadline expiry is an outcome, not an error.
#[instrument(skip(runtime, spec), fields(sandbox = %spec.name))]
pub async fn supervise(
    runtime: &dyn SandboxRuntime,
    spec: &SandboxSpec,
) -> Result<Supervised, SandboxError> {
    let mut lifecycle = Lifecycle::new(&spec.name);

    // Created before the call returns: a failed create still goes to
    // RuntimeError, and the name-based handle is enough for removal.
    let handle = runtime
        .create(spec)
        .await
        .map_err(|e| lifecycle.fail(e))?;

    let started_at = Instant::now();
    runtime
        .start(&handle)
        .await
        .map_err(|e| lifecycle.fail(e))?;
    lifecycle.advance(SandboxState::Started);

    let deadline = started_at + spec.limits.wall_time;
    let outcome = match runtime
        .await_exit(&handle, deadline)
        .await
        .map_err(|e| lifecycle.fail(e))?
    {
        WaitOutcome::Exited(exit_code) => Outcome::Completed { exit_code },
        WaitOutcome::DeadlineElapsed => {
            warn!(limit = ?spec.limits.wall_time, "deadline elapsed, killing sandbox");
            // Removal during teardown kills it anyway
            if let Err(e) = runtime.kill(&handle).await {
                warn!(error = %e, "failed to kill timed out sandbox");
            }
            Outcome::TimedOut
        }
    };

    let streams = match tokio::time::timeout(STREAM_READ_GRACE, runtime.read_streams(&handle)).await
    {
        Ok(Ok(streams)) => streams,
        Ok(Err(e)) if outcome == Outcome::TimedOut => {
            warn!(error = %e, "could not read streams of timed out sandbox");
            Streams::default()
        }
        Err(_) if outcome == Outcome::TimedOut => {
            warn!("reading streams of timed out sandbox took too long");
            Streams::default()
        }
        Ok(Err(e)) => return Err(lifecycle.fail(e)),
        Err(_) => return Err(lifecycle.fail(SandboxError::StreamReadTimeout(spec.name.clone()))),
    };

    let duration = started_at.elapsed();
    lifecycle.advance(match outcome {
        Outcome::Completed { .. } => SandboxState::Completed,
        Outcome::TimedOut => SandboxState::TimedOut,
    });

    debug!(?outcome, ?duration, "supervision finished");

    Ok(Supervised {
        outcome,
        streams,
        duration,
    })
}
