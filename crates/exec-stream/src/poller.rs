//! Exit status polling

use crate::config::RetryPolicy;
use crate::error::{Error, Result};
use crate::result::ExitStatus;
use crate::runtime::{ExecHandle, ExecRuntime};
use async_io::Timer;
use tracing::{debug, warn};

/// Resolves the final status of an exec whose stream has completed.
///
/// The runtime may still report the exec as running right after its stream
/// closed. Until an exit code is committed the poller inspects again, up to
/// [`RetryPolicy::max_retries`] extra times.
pub struct ExitStatusPoller<'a, R: ?Sized> {
    runtime: &'a R,
    policy: RetryPolicy,
}

impl<'a, R: ExecRuntime + ?Sized> ExitStatusPoller<'a, R> {
    /// Create a poller
    pub fn new(runtime: &'a R, policy: RetryPolicy) -> Self {
        Self { runtime, policy }
    }

    /// Inspect the exec until its exit code is committed or the budget runs out.
    ///
    /// Running out of budget is not an error: the status is returned with no
    /// exit code and `retries` equal to the budget.
    pub async fn resolve(&self, exec: &ExecHandle) -> Result<ExitStatus> {
        let mut retries = 0u32;
        loop {
            let inspect = self
                .runtime
                .inspect_exec(exec)
                .await
                .map_err(|source| Error::Inspect {
                    exec_id: exec.id().to_string(),
                    source,
                })?;

            let committed = inspect.exit_code.is_some();
            if committed || retries >= self.policy.max_retries {
                if retries > 0 {
                    warn!(
                        "exec {} did not report an exit code immediately, needed {} extra inspect calls",
                        exec, retries
                    );
                }
                if !committed {
                    warn!("exec {} still has no exit code after {} retries", exec, retries);
                }
                return Ok(ExitStatus {
                    exit_code: inspect.exit_code,
                    retries: (retries > 0).then_some(retries),
                });
            }

            retries += 1;
            debug!(
                "exec {} has no exit code yet (running: {:?}), retry {}/{}",
                exec, inspect.running, retries, self.policy.max_retries
            );
            Timer::after(self.policy.delay()).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedRuntime;
    use std::time::Duration;

    fn fast_policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy::new(max_retries, Duration::from_millis(1))
    }

    #[smol_potat::test]
    async fn test_committed_code_returns_immediately() {
        let runtime = ScriptedRuntime::new().exit_codes([Some(3)]);
        let exec = ExecHandle::new("exec-1");

        let status = ExitStatusPoller::new(&runtime, fast_policy(10))
            .resolve(&exec)
            .await
            .unwrap();

        assert_eq!(status.exit_code, Some(3));
        assert_eq!(status.retries, None);
        assert_eq!(runtime.inspect_calls(), 1);
    }

    #[smol_potat::test]
    async fn test_retries_until_code_committed() {
        let runtime = ScriptedRuntime::new().exit_codes([None, None, None, Some(0)]);
        let exec = ExecHandle::new("exec-1");

        let status = ExitStatusPoller::new(&runtime, fast_policy(10))
            .resolve(&exec)
            .await
            .unwrap();

        assert_eq!(status.exit_code, Some(0));
        assert_eq!(status.retries, Some(3));
        assert_eq!(runtime.inspect_calls(), 4);
    }

    #[smol_potat::test]
    async fn test_exhausted_budget_is_not_an_error() {
        let runtime = ScriptedRuntime::new().exit_codes(std::iter::repeat(None).take(20));
        let exec = ExecHandle::new("exec-1");

        let status = ExitStatusPoller::new(&runtime, fast_policy(10))
            .resolve(&exec)
            .await
            .unwrap();

        assert!(status.is_pending());
        assert_eq!(status.retries(), 10);
        assert_eq!(runtime.inspect_calls(), 11);
    }

    #[smol_potat::test]
    async fn test_inspect_failure_is_reported() {
        let runtime = ScriptedRuntime::new().fail_inspect("daemon went away");
        let exec = ExecHandle::new("exec-1");

        let err = ExitStatusPoller::new(&runtime, fast_policy(10))
            .resolve(&exec)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Inspect { .. }));
        assert!(err.to_string().contains("daemon went away"));
    }
}
