//! Environment-driven configuration for the orchestrator and reaper.
//!
//! Every setting has a default except `DATABASE_URL`, which only the reaper
//! binary requires. Parsing goes through [`OrchestratorConfig::from_lookup`]
//! so tests can supply values without touching the process environment.

use crate::deployment::{
    adapters::docker::EngineTimeouts,
    domain::PortRange,
    services::{HealthSettings, OrchestratorSettings, PreviewUrlSettings},
};
use std::net::{IpAddr, Ipv4Addr};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

const ENGINE_BINARY: &str = "PAVILION_ENGINE_BINARY";
const ENGINE_HOST: &str = "PAVILION_ENGINE_HOST";
const PORT_RANGE_START: &str = "PAVILION_PORT_RANGE_START";
const PORT_RANGE_END: &str = "PAVILION_PORT_RANGE_END";
const PORT_BIND_HOST: &str = "PAVILION_PORT_BIND_HOST";
const CREATE_TIMEOUT: &str = "PAVILION_CREATE_TIMEOUT_SECS";
const STOP_TIMEOUT: &str = "PAVILION_STOP_TIMEOUT_SECS";
const QUERY_TIMEOUT: &str = "PAVILION_QUERY_TIMEOUT_SECS";
const HEALTH_INTERVAL: &str = "PAVILION_HEALTH_INTERVAL_MS";
const READINESS_TIMEOUT: &str = "PAVILION_READINESS_TIMEOUT_SECS";
const MEMORY_PRESSURE: &str = "PAVILION_MEMORY_PRESSURE_PERCENT";
const PREVIEW_SCHEME: &str = "PAVILION_PREVIEW_SCHEME";
const PREVIEW_HOST: &str = "PAVILION_PREVIEW_HOST";
const PREVIEW_DOMAIN: &str = "PAVILION_PREVIEW_DOMAIN";
const CONTAINER_PREFIX: &str = "PAVILION_CONTAINER_PREFIX";
const REAP_INTERVAL: &str = "PAVILION_REAP_INTERVAL_SECS";
const STALE_STARTING_GRACE: &str = "PAVILION_STALE_STARTING_GRACE_SECS";
const DATABASE_URL: &str = "DATABASE_URL";

const DEFAULT_REAP_INTERVAL: Duration = Duration::from_secs(300);

/// Errors raised while reading configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// A variable was set to a value that cannot be used.
    #[error("invalid value {value:?} for {key}: {reason}")]
    Invalid {
        /// Environment variable name.
        key: &'static str,
        /// Offending value.
        value: String,
        /// Why the value was rejected.
        reason: String,
    },

    /// A required variable was not set.
    #[error("{0} must be set")]
    Missing(&'static str),
}

/// How to reach the container engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Engine CLI binary.
    pub binary: String,
    /// Engine endpoint, exported to the CLI as `DOCKER_HOST`.
    pub host: Option<String>,
    /// Per-operation command timeouts.
    pub timeouts: EngineTimeouts,
}

/// Complete runtime configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct OrchestratorConfig {
    /// Container engine access.
    pub engine: EngineConfig,
    /// Address port probes bind to.
    pub port_bind_host: IpAddr,
    /// Orchestrator tunables.
    pub orchestrator: OrchestratorSettings,
    /// Period of the orphan sweep.
    pub reap_interval: Duration,
    /// Database connection string, when set.
    pub database_url: Option<String>,
}

impl OrchestratorConfig {
    /// Reads configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when a variable cannot be parsed.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads configuration through `lookup`, which returns a variable's
    /// value or `None` when unset.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when a value cannot be parsed or the
    /// port range is empty.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let env = Lookup(&lookup);
        let default_timeouts = EngineTimeouts::default();
        let default_health = HealthSettings::default();
        let default_preview = PreviewUrlSettings::default();
        let defaults = OrchestratorSettings::default();

        let engine = EngineConfig {
            binary: env.string(ENGINE_BINARY).unwrap_or_else(|| String::from("docker")),
            host: env.string(ENGINE_HOST),
            timeouts: EngineTimeouts {
                create: env.seconds(CREATE_TIMEOUT, default_timeouts.create)?,
                stop: env.seconds(STOP_TIMEOUT, default_timeouts.stop)?,
                query: env.seconds(QUERY_TIMEOUT, default_timeouts.query)?,
            },
        };

        let start = env.parsed(PORT_RANGE_START, defaults.port_range.start())?;
        let end = env.parsed(PORT_RANGE_END, defaults.port_range.end())?;
        let port_range = PortRange::new(start, end).map_err(|err| ConfigError::Invalid {
            key: PORT_RANGE_END,
            value: end.to_string(),
            reason: err.to_string(),
        })?;

        let memory_pressure_percent =
            env.parsed(MEMORY_PRESSURE, default_health.memory_pressure_percent)?;
        if !(memory_pressure_percent > 0.0 && memory_pressure_percent <= 100.0) {
            return Err(ConfigError::Invalid {
                key: MEMORY_PRESSURE,
                value: memory_pressure_percent.to_string(),
                reason: String::from("must be within (0, 100]"),
            });
        }

        let health = HealthSettings {
            interval: env.millis(HEALTH_INTERVAL, default_health.interval)?,
            readiness_timeout: env.seconds(READINESS_TIMEOUT, default_health.readiness_timeout)?,
            memory_pressure_percent,
        };

        let preview = PreviewUrlSettings {
            scheme: env.string(PREVIEW_SCHEME).unwrap_or(default_preview.scheme),
            host: env.string(PREVIEW_HOST).unwrap_or(default_preview.host),
            domain: env.string(PREVIEW_DOMAIN),
        };

        let orchestrator = OrchestratorSettings {
            port_range,
            container_prefix: env
                .string(CONTAINER_PREFIX)
                .unwrap_or(defaults.container_prefix),
            preview,
            health,
            stale_starting_grace: env.seconds(STALE_STARTING_GRACE, defaults.stale_starting_grace)?,
        };

        Ok(Self {
            engine,
            port_bind_host: env.parsed(PORT_BIND_HOST, IpAddr::V4(Ipv4Addr::LOCALHOST))?,
            orchestrator,
            reap_interval: env.seconds(REAP_INTERVAL, DEFAULT_REAP_INTERVAL)?,
            database_url: env.string(DATABASE_URL),
        })
    }

    /// Returns how long a `starting` row may sit untouched before a reaper
    /// running outside the deploying process treats it as abandoned.
    ///
    /// The window covers a full launch in another process: the create and
    /// start commands, the readiness window, one health check overrunning
    /// it, and the configured grace.
    #[must_use]
    pub fn stale_starting_window(&self) -> Duration {
        let timeouts = self.engine.timeouts;
        let settings = &self.orchestrator;
        timeouts
            .create
            .saturating_mul(2)
            .saturating_add(settings.health.readiness_timeout)
            .saturating_add(timeouts.query)
            .saturating_add(settings.stale_starting_grace)
    }

    /// Returns the database URL.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Missing`] when `DATABASE_URL` is unset.
    pub fn require_database_url(&self) -> Result<&str, ConfigError> {
        self.database_url
            .as_deref()
            .ok_or(ConfigError::Missing(DATABASE_URL))
    }
}

struct Lookup<'a, F>(&'a F);

impl<F> Lookup<'_, F>
where
    F: Fn(&str) -> Option<String>,
{
    /// Returns a trimmed, non-empty value.
    fn string(&self, key: &str) -> Option<String> {
        (self.0)(key)
            .map(|value| value.trim().to_owned())
            .filter(|value| !value.is_empty())
    }

    fn parsed<T>(&self, key: &'static str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        let Some(raw) = self.string(key) else {
            return Ok(default);
        };
        raw.parse().map_err(|err: T::Err| ConfigError::Invalid {
            key,
            reason: err.to_string(),
            value: raw,
        })
    }

    fn seconds(&self, key: &'static str, default: Duration) -> Result<Duration, ConfigError> {
        self.positive(key, default.as_secs()).map(Duration::from_secs)
    }

    fn millis(&self, key: &'static str, default: Duration) -> Result<Duration, ConfigError> {
        let default_millis = u64::try_from(default.as_millis()).unwrap_or(u64::MAX);
        self.positive(key, default_millis).map(Duration::from_millis)
    }

    fn positive(&self, key: &'static str, default: u64) -> Result<u64, ConfigError> {
        let value = self.parsed(key, default)?;
        if value == 0 {
            return Err(ConfigError::Invalid {
                key,
                value: value.to_string(),
                reason: String::from("must be greater than zero"),
            });
        }
        Ok(value)
    }
}
