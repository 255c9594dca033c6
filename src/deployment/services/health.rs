//! Container health classification and readiness polling.
//!
//! The checker only observes. It never writes container or project state;
//! the orchestrator acts on what it reports.

use crate::deployment::{
    domain::{ContainerRecord, EngineContainerId, HealthReport},
    ports::{
        ContainerEngine, ContainerInspection, ContainerStats, EngineContainerState, EngineError,
        ProbeStatus,
    },
};
use mockable::Clock;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Polling and classification parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HealthSettings {
    /// Delay between readiness polls.
    pub interval: Duration,
    /// How long a started container may take to become healthy.
    pub readiness_timeout: Duration,
    /// Memory usage, in percent of the limit, at which a running container
    /// counts as unhealthy.
    pub memory_pressure_percent: f64,
}

impl Default for HealthSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(2),
            readiness_timeout: Duration::from_secs(30),
            memory_pressure_percent: 95.0,
        }
    }
}

/// Result of waiting for a started container to become ready.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadinessOutcome {
    /// The container reported healthy.
    Ready(HealthReport),
    /// The process ended before becoming healthy.
    Exited(String),
    /// The readiness window elapsed; carries the last observation.
    TimedOut(String),
    /// The poll was cancelled by a competing lifecycle operation.
    Cancelled,
}

/// A health report plus whether the process has ended for good.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Assessment {
    pub(crate) report: HealthReport,
    pub(crate) ended: bool,
}

/// Classifies container health from engine observations.
#[derive(Debug)]
pub struct HealthChecker<E, C> {
    engine: Arc<E>,
    clock: Arc<C>,
    settings: HealthSettings,
}

impl<E, C> HealthChecker<E, C>
where
    E: ContainerEngine,
    C: Clock + Send + Sync,
{
    /// Creates a health checker.
    #[must_use]
    pub const fn new(engine: Arc<E>, clock: Arc<C>, settings: HealthSettings) -> Self {
        Self {
            engine,
            clock,
            settings,
        }
    }

    /// Returns the polling parameters.
    #[must_use]
    pub const fn settings(&self) -> HealthSettings {
        self.settings
    }

    /// Checks a container once.
    ///
    /// An unreachable engine yields an `unknown` report, which callers must
    /// not act on.
    pub async fn check(&self, record: &ContainerRecord) -> HealthReport {
        self.assess(record).await.report
    }

    pub(crate) async fn assess(&self, record: &ContainerRecord) -> Assessment {
        let Some(engine_id) = record.engine_id() else {
            return Assessment {
                report: HealthReport::unknown(self.clock.utc(), "container was never created"),
                ended: false,
            };
        };

        match self.engine.inspect(engine_id).await {
            Ok(inspection) => {
                let stats = self.sample_stats(engine_id, &inspection).await;
                self.classify(&inspection, stats.as_ref())
            }
            Err(EngineError::NotFound(_)) => Assessment {
                report: HealthReport::unhealthy(
                    self.clock.utc(),
                    "container process no longer exists",
                ),
                ended: true,
            },
            Err(err) => Assessment {
                report: HealthReport::unknown(self.clock.utc(), err.to_string()),
                ended: false,
            },
        }
    }

    /// Samples resource usage of a running container; other states have
    /// nothing to sample.
    pub(crate) async fn sample_stats(
        &self,
        engine_id: &EngineContainerId,
        inspection: &ContainerInspection,
    ) -> Option<ContainerStats> {
        if inspection.state != EngineContainerState::Running {
            return None;
        }
        match self.engine.stats(engine_id).await {
            Ok(stats) => Some(stats),
            Err(err) => {
                tracing::debug!(
                    container_id = %engine_id,
                    error = %err,
                    "resource sampling failed; judging health without it"
                );
                None
            }
        }
    }

    /// Classifies an inspection, with optional resource usage.
    pub(crate) fn classify(
        &self,
        inspection: &ContainerInspection,
        stats: Option<&ContainerStats>,
    ) -> Assessment {
        let now = self.clock.utc();
        let state = inspection.state;

        if state.has_ended() {
            let mut message = inspection.exit_code.map_or_else(
                || format!("container process {state}"),
                |code| format!("container process exited with code {code}"),
            );
            if inspection.oom_killed {
                message.push_str(" (out of memory)");
            }
            if let Some(error) = &inspection.error {
                message.push_str(": ");
                message.push_str(error);
            }
            return Assessment {
                report: HealthReport::unhealthy(now, message),
                ended: true,
            };
        }

        let report = match (state, inspection.probe) {
            (EngineContainerState::Running, Some(ProbeStatus::Unhealthy)) => {
                HealthReport::unhealthy(now, "health probe failing")
            }
            (EngineContainerState::Running, Some(ProbeStatus::Starting)) => {
                HealthReport::unhealthy(now, "health probe has not passed yet")
            }
            (EngineContainerState::Running, _) => match stats {
                Some(usage) if usage.memory_percent >= self.settings.memory_pressure_percent => {
                    HealthReport::unhealthy(
                        now,
                        format!("memory usage at {:.1}% of limit", usage.memory_percent),
                    )
                }
                _ => HealthReport::healthy(now),
            },
            (other, _) => HealthReport::unhealthy(now, format!("container process is {other}")),
        };
        Assessment {
            report,
            ended: false,
        }
    }

    /// Polls until the container is healthy, its process ends, the
    /// readiness window elapses, or `cancel` fires.
    pub async fn wait_until_ready(
        &self,
        record: &ContainerRecord,
        cancel: &CancellationToken,
    ) -> ReadinessOutcome {
        let deadline = Instant::now() + self.settings.readiness_timeout;
        let mut ticker = tokio::time::interval(self.settings.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut last_observation = String::from("no health check completed");

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => return ReadinessOutcome::Cancelled,
                () = tokio::time::sleep_until(deadline) => {
                    return ReadinessOutcome::TimedOut(format!(
                        "not ready within {}s: {last_observation}",
                        self.settings.readiness_timeout.as_secs()
                    ));
                }
                _ = ticker.tick() => {
                    let assessment = tokio::select! {
                        biased;
                        () = cancel.cancelled() => return ReadinessOutcome::Cancelled,
                        () = tokio::time::sleep_until(deadline) => {
                            return ReadinessOutcome::TimedOut(format!(
                                "not ready within {}s: health check still in flight",
                                self.settings.readiness_timeout.as_secs()
                            ));
                        }
                        checked = self.assess(record) => checked,
                    };
                    let message = assessment
                        .report
                        .message()
                        .unwrap_or_default()
                        .to_owned();
                    if assessment.report.is_healthy() {
                        return ReadinessOutcome::Ready(assessment.report);
                    }
                    if assessment.ended {
                        return ReadinessOutcome::Exited(message);
                    }
                    tracing::debug!(
                        project_id = %record.project_id(),
                        status = assessment.report.status().as_str(),
                        message = %message,
                        "container not ready yet"
                    );
                    last_observation = message;
                }
            }
        }
    }
}
