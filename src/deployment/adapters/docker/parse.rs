//! Parsers for the JSON the Docker CLI emits through `--format '{{json .}}'`.

use crate::deployment::{
    domain::EngineContainerId,
    ports::{
        ContainerInspection, ContainerStats, EngineContainerState, EngineContainerSummary,
        EngineError, EngineOperation, EngineResult, ProbeStatus,
    },
};
use chrono::{DateTime, Datelike, Utc};
use serde::Deserialize;
use std::collections::BTreeMap;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawState {
    status: String,
    #[serde(default)]
    exit_code: Option<i64>,
    #[serde(default, rename = "OOMKilled")]
    oom_killed: bool,
    #[serde(default)]
    started_at: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    health: Option<RawHealth>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawHealth {
    status: String,
}

#[derive(Debug, Deserialize)]
struct RawStats {
    #[serde(rename = "CPUPerc", default)]
    cpu_percent: String,
    #[serde(rename = "MemPerc", default)]
    memory_percent: String,
    #[serde(rename = "MemUsage", default)]
    memory_usage: String,
}

#[derive(Debug, Deserialize)]
struct RawSummary {
    #[serde(rename = "ID")]
    id: String,
    #[serde(rename = "Names", default)]
    names: String,
    #[serde(rename = "State", default)]
    state: String,
    #[serde(rename = "Ports", default)]
    ports: String,
    #[serde(rename = "Labels", default)]
    labels: String,
}

fn malformed(operation: EngineOperation, reason: impl ToString) -> EngineError {
    EngineError::MalformedOutput {
        operation,
        reason: reason.to_string(),
    }
}

/// Parses `docker inspect --format '{{json .State}}'` output.
pub(super) fn parse_inspection(stdout: &str) -> EngineResult<ContainerInspection> {
    let raw: RawState = serde_json::from_str(stdout.trim())
        .map_err(|err| malformed(EngineOperation::Inspect, err))?;

    let state = EngineContainerState::parse(&raw.status);
    Ok(ContainerInspection {
        state,
        exit_code: raw.exit_code.filter(|_| state.has_ended()),
        oom_killed: raw.oom_killed,
        started_at: raw.started_at.as_deref().and_then(parse_engine_timestamp),
        probe: raw.health.and_then(|health| parse_probe(&health.status)),
        error: raw.error.filter(|error| !error.trim().is_empty()),
    })
}

/// Parses `docker stats --no-stream --format '{{json .}}'` output.
pub(super) fn parse_stats(stdout: &str) -> EngineResult<ContainerStats> {
    let line = stdout
        .lines()
        .find(|line| !line.trim().is_empty())
        .ok_or_else(|| malformed(EngineOperation::Stats, "empty output"))?;
    let raw: RawStats =
        serde_json::from_str(line.trim()).map_err(|err| malformed(EngineOperation::Stats, err))?;

    Ok(ContainerStats {
        cpu_percent: parse_percent(&raw.cpu_percent)?,
        memory_percent: parse_percent(&raw.memory_percent)?,
        memory_usage: raw.memory_usage,
    })
}

/// Parses `docker ps --format '{{json .}}'` output, one container per line.
pub(super) fn parse_summaries(stdout: &str) -> EngineResult<Vec<EngineContainerSummary>> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| {
            let raw: RawSummary =
                serde_json::from_str(line).map_err(|err| malformed(EngineOperation::List, err))?;
            let id =
                EngineContainerId::new(raw.id).map_err(|err| malformed(EngineOperation::List, err))?;
            Ok(EngineContainerSummary {
                id,
                name: raw.names,
                state: EngineContainerState::parse(&raw.state),
                ports: raw.ports,
                labels: parse_labels(&raw.labels),
            })
        })
        .collect()
}

/// Parses the `a=b,c=d` label list `docker ps` prints.
fn parse_labels(raw: &str) -> BTreeMap<String, String> {
    raw.split(',')
        .filter_map(|pair| pair.split_once('='))
        .map(|(key, value)| (key.trim().to_owned(), value.trim().to_owned()))
        .filter(|(key, _)| !key.is_empty())
        .collect()
}

fn parse_probe(status: &str) -> Option<ProbeStatus> {
    match status.trim().to_ascii_lowercase().as_str() {
        "starting" => Some(ProbeStatus::Starting),
        "healthy" => Some(ProbeStatus::Healthy),
        "unhealthy" => Some(ProbeStatus::Unhealthy),
        _ => None,
    }
}

fn parse_percent(raw: &str) -> EngineResult<f64> {
    let trimmed = raw.trim().trim_end_matches('%').trim();
    // Stopped containers report `--`.
    if trimmed.is_empty() || trimmed == "--" {
        return Ok(0.0);
    }
    trimmed
        .parse::<f64>()
        .map_err(|err| malformed(EngineOperation::Stats, format!("{raw:?}: {err}")))
}

/// Engines report never-started containers with the zero timestamp.
fn parse_engine_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw.trim())
        .ok()
        .map(|timestamp| timestamp.with_timezone(&Utc))
        .filter(|timestamp| timestamp.year() > 1)
}
