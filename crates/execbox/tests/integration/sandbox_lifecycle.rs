use std::sync::Arc;

use execbox::config::{Config, Language};
use execbox::sandbox::{DockerRuntime, SandboxLease, SandboxRuntime, SandboxSpec, Workspace};

#[tokio::test]
#[ignore = "requires docker"]
async fn test_remove_is_idempotent() {
    let runtime = DockerRuntime::connect(&Config::default()).expect("Failed to connect");
    let root = tempfile::tempdir().unwrap();
    let workspace = Workspace::stage(root.path(), "exec_idempotent", Language::Python, "pass", None)
        .await
        .unwrap();
    let spec = SandboxSpec::build("exec_idempotent", Language::Python, &workspace);

    let handle = runtime.create(&spec).await.expect("Failed to create sandbox");
    runtime.remove(&handle).await.expect("first remove failed");
    runtime.remove(&handle).await.expect("second remove failed");

    workspace.remove().await.unwrap();
}

#[tokio::test]
#[ignore = "requires docker"]
async fn test_lease_removes_running_sandbox() {
    let runtime: Arc<dyn SandboxRuntime> =
        Arc::new(DockerRuntime::connect(&Config::default()).expect("Failed to connect"));
    let root = tempfile::tempdir().unwrap();
    let workspace = Workspace::stage(
        root.path(),
        "exec_lease",
        Language::Python,
        "import time\ntime.sleep(60)",
        None,
    )
    .await
    .unwrap();
    let spec = SandboxSpec::build("exec_lease", Language::Python, &workspace);

    let lease = SandboxLease::new(runtime.clone(), spec.handle());
    let handle = runtime.create(&spec).await.expect("Failed to create sandbox");
    runtime.start(&handle).await.expect("Failed to start sandbox");

    lease.release().await.expect("Failed to release sandbox");
    // Gone: creating under the same name succeeds again
    let again = runtime.create(&spec).await.expect("name should be free");
    runtime.remove(&again).await.unwrap();

    workspace.remove().await.unwrap();
}
