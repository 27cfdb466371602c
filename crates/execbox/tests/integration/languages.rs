use execbox::types::ExecutionRequest;

use super::{fixture_source, test_runner};

async fn assert_prints(fixture: &str, language: &str, input: Option<&str>, expected: &str) {
    let runner = test_runner().await;
    let mut request = ExecutionRequest::new(fixture_source(fixture), language);
    if let Some(input) = input {
        request = request.with_input(input);
    }

    let execution = runner.execute(request).await.expect("Execution failed");
    assert!(
        execution.is_success(),
        "{language} failed with {}: {}",
        execution.exit_code,
        execution.error
    );
    assert_eq!(execution.output.trim(), expected);
}

#[tokio::test]
#[ignore = "requires docker"]
async fn test_javascript() {
    assert_prints("hello.js", "javascript", None, "hello from node").await;
}

#[tokio::test]
#[ignore = "requires docker"]
async fn test_go() {
    assert_prints("hello.go", "go", None, "hello from go").await;
}

#[tokio::test]
#[ignore = "requires docker"]
async fn test_ruby() {
    assert_prints("hello.rb", "ruby", None, "hello from ruby").await;
}

#[tokio::test]
#[ignore = "requires docker"]
async fn test_java() {
    assert_prints("hello.java", "java", None, "hello from java").await;
}

#[tokio::test]
#[ignore = "requires docker"]
async fn test_java_with_stdin() {
    assert_prints("sum.java", "java", Some("2 40\n"), "42").await;
}
