use execbox::types::{ExecutionRequest, ExecutionStatus, TIMEOUT_EXIT_CODE, WALL_TIME_LIMIT};

use super::{fixture_source, test_runner};

#[tokio::test]
#[ignore = "requires docker"]
async fn test_run_hello_world() {
    let runner = test_runner().await;

    let execution = runner
        .execute(ExecutionRequest::new(fixture_source("hello.py"), "python"))
        .await
        .expect("Execution failed");

    assert_eq!(execution.status, ExecutionStatus::Completed);
    assert_eq!(execution.output, "hi\n");
    assert_eq!(execution.error, "");
    assert_eq!(execution.exit_code, 0);
}

#[tokio::test]
#[ignore = "requires docker"]
async fn test_run_with_stdin() {
    let runner = test_runner().await;

    let request = ExecutionRequest::new(fixture_source("echo.py"), "python").with_input("x");
    let execution = runner.execute(request).await.expect("Execution failed");

    assert!(execution.is_success());
    assert!(execution.output.contains('x'));
}

#[tokio::test]
#[ignore = "requires docker"]
async fn test_nonzero_exit_code() {
    let runner = test_runner().await;

    let execution = runner
        .execute(ExecutionRequest::new(fixture_source("exit3.py"), "python"))
        .await
        .expect("Execution failed");

    assert_eq!(execution.status, ExecutionStatus::Completed);
    assert_eq!(execution.exit_code, 3);
    assert_eq!(execution.error, "bye\n");
}

#[tokio::test]
#[ignore = "requires docker"]
async fn test_network_is_blocked() {
    let runner = test_runner().await;

    let execution = runner
        .execute(ExecutionRequest::new(fixture_source("network.py"), "python"))
        .await
        .expect("Execution failed");

    assert_eq!(execution.output.trim(), "blocked");
}

#[tokio::test]
#[ignore = "requires docker"]
async fn test_wall_time_limit() {
    let runner = test_runner().await;

    let execution = runner
        .execute(ExecutionRequest::new(fixture_source("sleep.py"), "python"))
        .await
        .expect("Execution failed");

    assert_eq!(execution.status, ExecutionStatus::TimedOut);
    assert_eq!(execution.exit_code, TIMEOUT_EXIT_CODE);
    assert!(execution.duration >= WALL_TIME_LIMIT.as_secs_f64());
    assert!(execution.output.contains("started"));
}

#[tokio::test]
#[ignore = "requires docker"]
async fn test_concurrent_runs() {
    let runner = test_runner().await;

    let (a, b) = tokio::join!(
        runner.execute(ExecutionRequest::new(fixture_source("hello.py"), "python")),
        runner.execute(ExecutionRequest::new(fixture_source("hello.py"), "python")),
    );
    let (a, b) = (a.expect("first run failed"), b.expect("second run failed"));

    assert_ne!(a.id, b.id);
    assert_eq!(a.output, "hi\n");
    assert_eq!(b.output, "hi\n");
}
