//! Shared helpers for exec-stream integration tests

#![allow(dead_code)]

use exec_stream::testing::ScriptedRuntime;
use exec_stream::{Container, ExecCoordinator, RetryPolicy};
use std::sync::Arc;
use std::time::Duration;

/// Container id used by every scripted test
pub const CONTAINER: &str = "scripted-container";

/// A retry policy with the default budget and a negligible delay
pub fn fast_policy() -> RetryPolicy {
    RetryPolicy::new(10, Duration::from_millis(1))
}

/// Wrap a scripted runtime in a container handle
pub fn container(runtime: ScriptedRuntime) -> (Container<ScriptedRuntime>, Arc<ScriptedRuntime>) {
    let runtime = Arc::new(runtime);
    let container = ExecCoordinator::new(Arc::clone(&runtime))
        .with_retry_policy(fast_policy())
        .container(CONTAINER);
    (container, runtime)
}
