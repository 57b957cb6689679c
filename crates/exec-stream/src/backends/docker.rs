//! Docker Engine runtime
//!
//! Talks to the Docker Engine API through bollard. Bollard already splits the
//! attached connection into typed log chunks, so they are framed again here to
//! present the same multiplexed byte stream every runtime produces. Bollard
//! needs a tokio reactor; drive the coordinator from a tokio runtime when
//! using this backend.

use crate::demux::{StreamKind, encode_frame};
use crate::error::RuntimeError;
use crate::runtime::{
    AttachedStream, BoxWriter, CreateExecSpec, ExecHandle, ExecInspect, ExecRuntime,
    StartExecSpec,
};
use async_trait::async_trait;
use bollard::Docker;
use bollard::container::LogOutput;
use bollard::exec::{CreateExecOptions, StartExecOptions, StartExecResults};
use futures::stream::TryStreamExt;
use std::io;
use tokio_util::compat::TokioAsyncWriteCompatExt;
use tracing::debug;

/// Runtime backed by a Docker daemon
#[derive(Debug, Clone)]
pub struct DockerRuntime {
    docker: Docker,
}

impl DockerRuntime {
    /// Wrap an existing client
    pub fn new(docker: Docker) -> Self {
        Self { docker }
    }

    /// Connect using the local defaults (`DOCKER_HOST` or the local socket)
    pub fn connect_local() -> Result<Self, bollard::errors::Error> {
        Ok(Self::new(Docker::connect_with_local_defaults()?))
    }

    /// The underlying client
    pub fn client(&self) -> &Docker {
        &self.docker
    }
}

fn frame(chunk: LogOutput) -> Vec<u8> {
    match chunk {
        LogOutput::StdOut { message } | LogOutput::Console { message } => {
            encode_frame(StreamKind::Stdout, &message)
        }
        LogOutput::StdErr { message } => encode_frame(StreamKind::Stderr, &message),
        LogOutput::StdIn { message } => encode_frame(StreamKind::Stdin, &message),
    }
}

#[async_trait]
impl ExecRuntime for DockerRuntime {
    async fn create_exec(
        &self,
        container: &str,
        spec: &CreateExecSpec,
    ) -> Result<ExecHandle, RuntimeError> {
        let options = CreateExecOptions {
            cmd: Some(spec.cmd.clone()),
            attach_stdin: Some(spec.attach_stdin),
            attach_stdout: Some(spec.attach_stdout),
            attach_stderr: Some(spec.attach_stderr),
            env: (!spec.env.is_empty()).then(|| spec.env.clone()),
            working_dir: spec.working_dir.clone(),
            ..Default::default()
        };
        let created = self.docker.create_exec(container, options).await?;
        Ok(ExecHandle::new(created.id))
    }

    async fn start_exec(
        &self,
        exec: &ExecHandle,
        spec: &StartExecSpec,
    ) -> Result<AttachedStream, RuntimeError> {
        let options = StartExecOptions {
            detach: spec.detach,
            tty: false,
            output_capacity: None,
        };

        match self.docker.start_exec(exec.id(), Some(options)).await? {
            StartExecResults::Attached { output, input } => {
                let output = output
                    .map_ok(frame)
                    .map_err(io::Error::other)
                    .into_async_read();
                let input = spec
                    .stdin
                    .then(|| Box::pin(input.compat_write()) as BoxWriter);
                Ok(AttachedStream::new(Box::pin(output), input))
            }
            StartExecResults::Detached => {
                debug!("exec {} started detached", exec);
                Ok(AttachedStream::empty())
            }
        }
    }

    async fn inspect_exec(&self, exec: &ExecHandle) -> Result<ExecInspect, RuntimeError> {
        let inspect = self.docker.inspect_exec(exec.id()).await?;
        Ok(ExecInspect {
            exit_code: inspect.exit_code,
            running: inspect.running,
        })
    }
}
