//! Container health classification and data freshness.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Health classification of a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    /// The engine could not be reached; the state must not be acted upon.
    Unknown,
    /// The process is running and any health probe passes.
    Healthy,
    /// The process is not running, its probe fails, or it is under
    /// resource pressure.
    Unhealthy,
}

impl HealthStatus {
    /// Returns the canonical storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Healthy => "healthy",
            Self::Unhealthy => "unhealthy",
        }
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Timestamped health classification for a container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthReport {
    status: HealthStatus,
    checked_at: DateTime<Utc>,
    message: Option<String>,
}

impl HealthReport {
    /// Creates a health report.
    #[must_use]
    pub const fn new(status: HealthStatus, checked_at: DateTime<Utc>) -> Self {
        Self {
            status,
            checked_at,
            message: None,
        }
    }

    /// Creates an `unknown` report with the reason the engine was unreachable.
    #[must_use]
    pub fn unknown(checked_at: DateTime<Utc>, message: impl Into<String>) -> Self {
        Self::new(HealthStatus::Unknown, checked_at).with_message(message)
    }

    /// Creates a `healthy` report.
    #[must_use]
    pub const fn healthy(checked_at: DateTime<Utc>) -> Self {
        Self::new(HealthStatus::Healthy, checked_at)
    }

    /// Creates an `unhealthy` report with details.
    #[must_use]
    pub fn unhealthy(checked_at: DateTime<Utc>, message: impl Into<String>) -> Self {
        Self::new(HealthStatus::Unhealthy, checked_at).with_message(message)
    }

    /// Adds an explanatory message.
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        let normalized = message.into().trim().to_owned();
        if !normalized.is_empty() {
            self.message = Some(normalized);
        }
        self
    }

    /// Returns the health status.
    #[must_use]
    pub const fn status(&self) -> HealthStatus {
        self.status
    }

    /// Returns whether the container is classified healthy.
    #[must_use]
    pub const fn is_healthy(&self) -> bool {
        matches!(self.status, HealthStatus::Healthy)
    }

    /// Returns the check timestamp.
    #[must_use]
    pub const fn checked_at(&self) -> DateTime<Utc> {
        self.checked_at
    }

    /// Returns an optional detail message.
    #[must_use]
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }
}

/// Whether observed data came from the engine or from cached state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Freshness {
    /// Data was read from the engine during this call.
    Live,
    /// The engine was unreachable; data is the last persisted state and may
    /// be outdated.
    Stale {
        /// Why the engine could not be consulted.
        reason: String,
    },
}

impl Freshness {
    /// Creates a stale marker with a reason.
    #[must_use]
    pub fn stale(reason: impl Into<String>) -> Self {
        Self::Stale {
            reason: reason.into(),
        }
    }

    /// Returns whether the data may be outdated.
    #[must_use]
    pub const fn is_stale(&self) -> bool {
        matches!(self, Self::Stale { .. })
    }
}
