//! Process runner backed by `tokio::process`.

use crate::deployment::ports::{
    CommandOutput, CommandRunner, EngineCommand, EngineError, EngineResult,
};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::process::Stdio;

/// Runs the engine binary as a child process.
///
/// Children are killed when their timeout elapses, so a hung engine call
/// never outlives the caller's deadline.
#[derive(Debug, Clone)]
pub struct TokioCommandRunner {
    binary: String,
    host: Option<String>,
}

impl TokioCommandRunner {
    /// Creates a runner for `binary`, resolved through `PATH`.
    #[must_use]
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            host: None,
        }
    }

    /// Points the engine client at a non-default daemon via `DOCKER_HOST`.
    #[must_use]
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }
}

#[async_trait]
impl CommandRunner for TokioCommandRunner {
    async fn run(&self, command: EngineCommand) -> EngineResult<CommandOutput> {
        let mut process = tokio::process::Command::new(&self.binary);
        process
            .args(&command.args)
            .stdin(Stdio::null())
            .kill_on_drop(true);
        if let Some(host) = &self.host {
            process.env("DOCKER_HOST", host);
        }

        tracing::debug!(
            operation = %command.operation,
            binary = %self.binary,
            args = ?command.args,
            "running container engine command"
        );

        let output = tokio::time::timeout(command.timeout, process.output())
            .await
            .map_err(|_| EngineError::TimedOut {
                operation: command.operation,
                timeout: command.timeout,
            })?
            .map_err(|err| match err.kind() {
                ErrorKind::NotFound => EngineError::Unavailable(format!(
                    "engine binary `{}` not found",
                    self.binary
                )),
                _ => EngineError::Unavailable(format!(
                    "failed to spawn `{}`: {err}",
                    self.binary
                )),
            })?;

        Ok(CommandOutput {
            ok: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code: output.status.code(),
        })
    }
}
