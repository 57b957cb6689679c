//! End-to-end exec scenarios against a scripted runtime

mod common;

use common::container;
use exec_stream::testing::ScriptedRuntime;
use exec_stream::{Error, ExecOptions, ExecRequest, StdinOption};
use serde_json::json;

#[smol_potat::test]
async fn test_stdout_capture() {
    let (container, runtime) = container(ScriptedRuntime::new().stdout("hi"));

    let request = ExecRequest::builder(["echo", "-n", "hi"])
        .stdout(true)
        .build()
        .unwrap();
    let result = container.exec(request).await.unwrap().into_result().unwrap();

    assert_eq!(result.stdout_lossy().as_deref(), Some("hi"));
    assert!(result.stderr.is_none());
    assert_eq!(result.status.exit_code, Some(0));
    assert!(result.status.retries.is_none());
    assert!(result.error.is_none());

    let created = runtime.created();
    assert_eq!(created[0].cmd, vec!["echo", "-n", "hi"]);
    assert!(created[0].attach_stdout);
    assert!(!created[0].attach_stdin);
    assert!(!runtime.started()[0].detach);
}

#[smol_potat::test]
async fn test_stdin_round_trip_through_tee() {
    let (container, _) = container(ScriptedRuntime::new().echo_stdin());

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

    assert_eq!(result.stdout.as_deref(), Some(&b"hello"[..]));
    assert_eq!(result.status.exit_code, Some(0));
}

#[smol_potat::test]
async fn test_stdin_from_channel_is_forwarded_in_order() {
    let (container, _) = container(ScriptedRuntime::new().echo_stdin());
    let (tx, rx) = async_channel::unbounded();
    for chunk in ["one ", "two ", "three"] {
        tx.send(chunk.as_bytes().to_vec()).await.unwrap();
    }
    drop(tx);

    let request = ExecRequest::builder(["cat"])
        .stdin(rx)
        .stdout(true)
        .build()
        .unwrap();
    let result = container.exec(request).await.unwrap().into_result().unwrap();

    assert_eq!(result.stdout_lossy().as_deref(), Some("one two three"));
}

#[smol_potat::test]
async fn test_detached_exec_reports_only_status() {
    let (container, runtime) = container(ScriptedRuntime::new());

    let result = container
        .exec_with(["touch", "/tmp/marker"], ExecOptions::default())
        .await
        .unwrap()
        .into_result()
        .unwrap();

    assert!(runtime.started()[0].detach);
    assert_eq!(
        serde_json::to_value(&result).unwrap(),
        json!({ "inspect": { "ExitCode": 0 } })
    );
}

#[smol_potat::test]
async fn test_live_without_streams_never_reaches_runtime() {
    let (container, runtime) = container(ScriptedRuntime::new());

    let options = ExecOptions {
        live: true,
        ..Default::default()
    };
    let err = container.exec_with(["sh"], options).await.unwrap_err();

    assert!(err.is_configuration());
    assert_eq!(runtime.create_calls(), 0);
    assert_eq!(runtime.start_calls(), 0);
}

#[smol_potat::test]
async fn test_empty_command_is_rejected() {
    let (container, runtime) = container(ScriptedRuntime::new());

    let err = container
        .exec_with(Vec::<String>::new(), ExecOptions::default())
        .await
        .unwrap_err();

    assert!(err.is_configuration());
    assert_eq!(runtime.create_calls(), 0);
}

#[smol_potat::test]
async fn test_exit_code_retry_is_bounded() {
    let (container, runtime) = container(ScriptedRuntime::new().exit_codes([None; 20]));

    let request = ExecRequest::builder(["sleep", "1"]).stdout(true).build().unwrap();
    let result = container.exec(request).await.unwrap().into_result().unwrap();

    assert_eq!(result.status.exit_code, None);
    assert_eq!(result.status.retries, Some(10));
    assert_eq!(runtime.inspect_calls(), 11);
    assert_eq!(
        serde_json::to_value(&result).unwrap()["inspect"],
        json!({ "ExitCode": null, "retries": 10 })
    );
}

#[smol_potat::test]
async fn test_late_exit_code_counts_retries() {
    let (container, runtime) = container(ScriptedRuntime::new().exit_codes([None, None, Some(3)]));

    let request = ExecRequest::builder(["false"]).stderr(true).build().unwrap();
    let result = container.exec(request).await.unwrap().into_result().unwrap();

    assert_eq!(result.status.exit_code, Some(3));
    assert_eq!(result.status.retries, Some(2));
    assert_eq!(runtime.inspect_calls(), 3);
    assert!(!result.success());
}

#[smol_potat::test]
async fn test_stream_error_keeps_partial_output() {
    let (container, runtime) = container(
        ScriptedRuntime::new()
            .stdout("abc")
            .fail_stream("connection reset by peer"),
    );

    let request = ExecRequest::builder(["yes"]).stdout(true).build().unwrap();
    let result = container.exec(request).await.unwrap().into_result().unwrap();

    assert_eq!(result.stdout.as_deref(), Some(&b"abc"[..]));
    match &result.error {
        Some(Error::Stream(e)) => assert!(e.to_string().contains("connection reset")),
        other => panic!("expected a stream error, got {other:?}"),
    }
    // The status is still resolved after a stream failure
    assert_eq!(runtime.inspect_calls(), 1);
    assert_eq!(result.status.exit_code, Some(0));
}

#[smol_potat::test]
async fn test_stdin_only_exec_completes_once() {
    // Stdin exhaustion and the end of the stream both race to complete
    let (container, runtime) = container(ScriptedRuntime::new());

    let request = ExecRequest::builder(["sh", "-c", "cat > /dev/null"])
        .stdin("data")
        .build()
        .unwrap();
    let result = container.exec(request).await.unwrap().into_result().unwrap();

    assert!(result.stdout.is_none());
    assert!(result.stderr.is_none());
    assert!(result.error.is_none());
    assert_eq!(runtime.inspect_calls(), 1);
    assert_eq!(runtime.stdin_written(), b"data");
}

#[smol_potat::test]
async fn test_inspect_failure_is_an_error() {
    let (container, _) = container(ScriptedRuntime::new().stdout("done").fail_inspect("daemon went away"));

    let request = ExecRequest::builder(["true"]).stdout(true).build().unwrap();
    let err = container.exec(request).await.unwrap_err();

    assert!(matches!(err, Error::Inspect { .. }));
    assert!(err.to_string().contains("daemon went away"));
}

#[smol_potat::test]
async fn test_env_and_working_dir_reach_create() {
    let (container, runtime) = container(ScriptedRuntime::new());

    let request = ExecRequest::builder(["env"])
        .env("RUST_LOG", "debug")
        .working_dir("/srv")
        .stdout(true)
        .build()
        .unwrap();
    container.exec(request).await.unwrap();

    let created = runtime.created();
    assert_eq!(created[0].env, vec!["RUST_LOG=debug"]);
    assert_eq!(created[0].working_dir.as_deref(), Some("/srv"));
}
