//! [`ContainerEngine`] implementation over the Docker CLI.

use super::parse::{parse_inspection, parse_stats, parse_summaries};
use crate::deployment::{
    domain::EngineContainerId,
    ports::{
        CommandOutput, CommandRunner, ContainerEngine, ContainerInspection, ContainerSpec,
        ContainerStats, EngineCommand, EngineContainerSummary, EngineError, EngineOperation,
        EngineResult, MANAGED_LABEL,
    },
};
use async_trait::async_trait;
use std::time::Duration;

const NOT_FOUND_MARKERS: [&str; 2] = ["No such container", "No such object"];
const UNAVAILABLE_MARKERS: [&str; 3] = [
    "Cannot connect to the Docker daemon",
    "error during connect",
    "Is the docker daemon running",
];

/// Hard timeouts applied to engine calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineTimeouts {
    /// Timeout for create, start and restart.
    pub create: Duration,
    /// Timeout for stop and remove.
    pub stop: Duration,
    /// Timeout for inspect, logs, stats and list.
    pub query: Duration,
}

impl EngineTimeouts {
    /// Returns the timeout that applies to `operation`.
    #[must_use]
    pub const fn for_operation(self, operation: EngineOperation) -> Duration {
        match operation {
            EngineOperation::Create | EngineOperation::Start | EngineOperation::Restart => {
                self.create
            }
            EngineOperation::Stop | EngineOperation::Remove => self.stop,
            EngineOperation::Inspect
            | EngineOperation::Logs
            | EngineOperation::Stats
            | EngineOperation::List => self.query,
        }
    }
}

impl Default for EngineTimeouts {
    fn default() -> Self {
        Self {
            create: Duration::from_secs(60),
            stop: Duration::from_secs(30),
            query: Duration::from_secs(10),
        }
    }
}

/// Container engine driving the Docker CLI through a [`CommandRunner`].
#[derive(Debug, Clone)]
pub struct DockerCliEngine<R> {
    runner: R,
    timeouts: EngineTimeouts,
    publish_host: String,
}

impl<R: CommandRunner> DockerCliEngine<R> {
    /// Creates an engine adapter that publishes ports on `127.0.0.1`.
    #[must_use]
    pub fn new(runner: R, timeouts: EngineTimeouts) -> Self {
        Self {
            runner,
            timeouts,
            publish_host: String::from("127.0.0.1"),
        }
    }

    /// Publishes container ports on `host` instead of loopback.
    #[must_use]
    pub fn with_publish_host(mut self, host: impl Into<String>) -> Self {
        self.publish_host = host.into();
        self
    }

    async fn execute(
        &self,
        operation: EngineOperation,
        target: &str,
        args: Vec<String>,
    ) -> EngineResult<CommandOutput> {
        let output = self
            .runner
            .run(EngineCommand {
                operation,
                args,
                timeout: self.timeouts.for_operation(operation),
            })
            .await?;
        if output.ok {
            return Ok(output);
        }
        Err(classify_failure(operation, target, &output))
    }

    fn create_args(&self, spec: &ContainerSpec) -> Vec<String> {
        let mut args = vec![
            String::from("create"),
            String::from("--name"),
            spec.name.as_str().to_owned(),
            String::from("--publish"),
            format!(
                "{}:{}:{}",
                self.publish_host, spec.host_port, spec.container_port
            ),
        ];
        for (key, value) in &spec.labels {
            args.push(String::from("--label"));
            args.push(format!("{key}={value}"));
        }
        for (key, value) in &spec.environment {
            args.push(String::from("--env"));
            args.push(format!("{key}={value}"));
        }
        if let Some(mount) = &spec.mount {
            args.push(String::from("--volume"));
            args.push(format!("{}:{}", mount.source.display(), mount.target));
        }
        args.push(spec.image.clone());
        args
    }
}

fn classify_failure(operation: EngineOperation, target: &str, output: &CommandOutput) -> EngineError {
    let stderr = output.stderr.trim();
    if NOT_FOUND_MARKERS.iter().any(|marker| stderr.contains(marker)) {
        return EngineError::NotFound(target.to_owned());
    }
    if UNAVAILABLE_MARKERS.iter().any(|marker| stderr.contains(marker)) {
        return EngineError::Unavailable(stderr.to_owned());
    }
    EngineError::CommandFailed {
        operation,
        exit_code: output.exit_code,
        stderr: stderr.to_owned(),
    }
}

fn id_args(command: &str, container: &EngineContainerId) -> Vec<String> {
    vec![command.to_owned(), container.as_str().to_owned()]
}

#[async_trait]
impl<R: CommandRunner> ContainerEngine for DockerCliEngine<R> {
    async fn create(&self, spec: &ContainerSpec) -> EngineResult<EngineContainerId> {
        let output = self
            .execute(
                EngineOperation::Create,
                spec.name.as_str(),
                self.create_args(spec),
            )
            .await?;
        let id_line = output.stdout.lines().next_back().unwrap_or_default();
        EngineContainerId::new(id_line).map_err(|err| EngineError::MalformedOutput {
            operation: EngineOperation::Create,
            reason: err.to_string(),
        })
    }

    async fn start(&self, container: &EngineContainerId) -> EngineResult<()> {
        self.execute(
            EngineOperation::Start,
            container.as_str(),
            id_args("start", container),
        )
        .await?;
        Ok(())
    }

    async fn stop(&self, container: &EngineContainerId) -> EngineResult<()> {
        self.execute(
            EngineOperation::Stop,
            container.as_str(),
            id_args("stop", container),
        )
        .await?;
        Ok(())
    }

    async fn restart(&self, container: &EngineContainerId) -> EngineResult<()> {
        self.execute(
            EngineOperation::Restart,
            container.as_str(),
            id_args("restart", container),
        )
        .await?;
        Ok(())
    }

    async fn remove(&self, container: &EngineContainerId, force: bool) -> EngineResult<()> {
        let mut args = vec![String::from("rm")];
        if force {
            args.push(String::from("--force"));
        }
        args.push(container.as_str().to_owned());
        self.execute(EngineOperation::Remove, container.as_str(), args)
            .await?;
        Ok(())
    }

    async fn inspect(&self, container: &EngineContainerId) -> EngineResult<ContainerInspection> {
        let args = vec![
            String::from("inspect"),
            String::from("--format"),
            String::from("{{json .State}}"),
            container.as_str().to_owned(),
        ];
        let output = self
            .execute(EngineOperation::Inspect, container.as_str(), args)
            .await?;
        parse_inspection(&output.stdout)
    }

    async fn logs(&self, container: &EngineContainerId, tail: Option<u32>) -> EngineResult<String> {
        let mut args = vec![String::from("logs")];
        if let Some(lines) = tail {
            args.push(String::from("--tail"));
            args.push(lines.to_string());
        }
        args.push(container.as_str().to_owned());
        let output = self
            .execute(EngineOperation::Logs, container.as_str(), args)
            .await?;

        // The engine replays the container's stderr on its own stderr.
        let mut combined = output.stdout;
        if !output.stderr.trim().is_empty() {
            if !combined.is_empty() && !combined.ends_with('\n') {
                combined.push('\n');
            }
            combined.push_str(&output.stderr);
        }
        Ok(combined)
    }

    async fn stats(&self, container: &EngineContainerId) -> EngineResult<ContainerStats> {
        let args = vec![
            String::from("stats"),
            String::from("--no-stream"),
            String::from("--format"),
            String::from("{{json .}}"),
            container.as_str().to_owned(),
        ];
        let output = self
            .execute(EngineOperation::Stats, container.as_str(), args)
            .await?;
        parse_stats(&output.stdout)
    }

    async fn list_managed(&self) -> EngineResult<Vec<EngineContainerSummary>> {
        let args = vec![
            String::from("ps"),
            String::from("--all"),
            String::from("--no-trunc"),
            String::from("--filter"),
            format!("label={MANAGED_LABEL}=true"),
            String::from("--format"),
            String::from("{{json .}}"),
        ];
        let output = self.execute(EngineOperation::List, "", args).await?;
        parse_summaries(&output.stdout)
    }
}
