use crate::runner::supervisor::{Outcome, Supervised};
use crate::types::{Execution, ExecutionStatus, PendingExecution, TIMEOUT_EXIT_CODE};

/// Build the final record from the accepted request and what supervision saw
pub fn assemble(pending: PendingExecution, supervised: Supervised) -> Execution {
    let (status, exit_code) = match supervised.outcome {
        Outcome::Completed { exit_code } => (ExecutionStatus::Completed, exit_code),
        Outcome::TimedOut => (ExecutionStatus::TimedOut, TIMEOUT_EXIT_CODE),
    };

    Execution {
        id: pending.id,
        code: pending.code,
        language: pending.language,
        input: pending.input,
        output: supervised.streams.stdout,
        error: supervised.streams.stderr,
        exit_code,
        status,
        created_at: pending.created_at,
        duration: supervised.duration.as_secs_f64(),
    }
}
