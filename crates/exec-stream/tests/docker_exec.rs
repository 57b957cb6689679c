//! Tests against a real Docker daemon
//!
//! Run with `cargo test --features docker-tests`. A container named by
//! `EXEC_STREAM_TEST_CONTAINER` (default `exec-stream-test`) must be running
//! an image with a POSIX shell, e.g.
//! `docker run -d --name exec-stream-test alpine sleep infinity`.

#![cfg(feature = "docker-tests")]

use exec_stream::{DockerRuntime, ExecCoordinator, ExecOptions, ExecRequest, StdinOption};
use std::sync::Arc;

fn test_container() -> exec_stream::Container<DockerRuntime> {
    let name = std::env::var("EXEC_STREAM_TEST_CONTAINER")
        .unwrap_or_else(|_| "exec-stream-test".to_string());
    let runtime = DockerRuntime::connect_local().expect("Failed to connect to Docker");
    ExecCoordinator::new(Arc::new(runtime)).container(name)
}

#[tokio::test]
async fn test_docker_echo() {
    let container = test_container();

    let result = container.output(["echo", "-n", "hi"]).await.unwrap();

    assert_eq!(result.stdout_lossy().as_deref(), Some("hi"));
    assert_eq!(result.stderr_lossy().as_deref(), Some(""));
    assert_eq!(result.status.exit_code, Some(0));
}

#[tokio::test]
async fn test_docker_stderr_and_exit_code() {
    let container = test_container();

    let request = ExecRequest::builder(["sh", "-c", "echo oops >&2; exit 7"])
        .stdout(true)
        .stderr(true)
        .build()
        .unwrap();
    let result = container.exec(request).await.unwrap().into_result().unwrap();

    assert_eq!(result.stdout_lossy().as_deref(), Some(""));
    assert_eq!(result.stderr_lossy().as_deref(), Some("oops\n"));
    assert_eq!(result.status.exit_code, Some(7));
}

#[tokio::test]
async fn test_docker_tee_round_trip() {
    let container = test_container();

    let options = ExecOptions {
        stdin: Some(StdinOption::Text("hello".to_string())),
        stdout: true,
        ..Default::default()
    };
    let result = container
        .exec_with(["tee"], options)
        .await
        .unwrap()
        .into_result()
        .unwrap();

    assert_eq!(result.stdout_lossy().as_deref(), Some("hello"));
}

#[tokio::test]
async fn test_docker_detached() {
    let container = test_container();

    let result = container
        .exec_with(["touch", "/tmp/exec-stream-marker"], ExecOptions::default())
        .await
        .unwrap()
        .into_result()
        .unwrap();

    assert!(result.stdout.is_none());
    assert!(result.stderr.is_none());
}
