//! Project aggregate as seen by the deployment orchestrator.

use super::{DeploymentDomainError, ParseProjectStatusError, ProjectId, Subdomain};
use chrono::{DateTime, Utc};
use mockable::Clock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Generation and deployment outcome of a project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    /// Project exists but has never been built or deployed.
    Draft,
    /// Project is being generated or deployed.
    Building,
    /// Project preview is live.
    Ready,
    /// Generation or deployment failed.
    Error,
}

impl ProjectStatus {
    /// Returns the canonical storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Building => "building",
            Self::Ready => "ready",
            Self::Error => "error",
        }
    }

    /// Returns whether transition to `target` is allowed.
    ///
    /// Same-state transitions are not transitions; callers treat them as
    /// no-ops.
    #[must_use]
    pub const fn can_transition_to(self, target: Self) -> bool {
        matches!(
            (self, target),
            (Self::Draft, Self::Building | Self::Error)
                | (Self::Building, Self::Ready | Self::Error)
                | (Self::Ready, Self::Building | Self::Error)
                | (Self::Error, Self::Building)
        )
    }
}

impl fmt::Display for ProjectStatus {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

impl ProjectStatus {
    fn from_name(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "draft" => Some(Self::Draft),
            "building" => Some(Self::Building),
            "ready" => Some(Self::Ready),
            "error" => Some(Self::Error),
            _ => None,
        }
    }
}

impl TryFrom<&str> for ProjectStatus {
    type Error = ParseProjectStatusError;

    fn try_from(value: &str) -> Result<Self, ParseProjectStatusError> {
        Self::from_name(value).ok_or_else(|| ParseProjectStatusError(value.to_owned()))
    }
}

/// Opaque key/value settings owned by the generation subsystem.
///
/// The orchestrator only reads these (framework, AI model, chat id).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProjectSettings(BTreeMap<String, String>);

impl ProjectSettings {
    /// Creates settings from key/value pairs.
    #[must_use]
    pub fn new(entries: impl IntoIterator<Item = (String, String)>) -> Self {
        Self(entries.into_iter().collect())
    }

    /// Returns the value for `key`, if present.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Iterates all settings in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(key, value)| (key.as_str(), value.as_str()))
    }
}

/// Project aggregate root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    id: ProjectId,
    status: ProjectStatus,
    settings: ProjectSettings,
    subdomain: Option<Subdomain>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// Parameter object for reconstructing a persisted project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedProjectData {
    /// Persisted project identifier.
    pub id: ProjectId,
    /// Persisted project status.
    pub status: ProjectStatus,
    /// Persisted settings bag.
    pub settings: ProjectSettings,
    /// Persisted preview subdomain, if any.
    pub subdomain: Option<Subdomain>,
    /// Persisted creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Persisted update timestamp.
    pub updated_at: DateTime<Utc>,
}

impl Project {
    /// Creates a new draft project.
    #[must_use]
    pub fn new(settings: ProjectSettings, clock: &impl Clock) -> Self {
        let timestamp = clock.utc();
        Self {
            id: ProjectId::new(),
            status: ProjectStatus::Draft,
            settings,
            subdomain: None,
            created_at: timestamp,
            updated_at: timestamp,
        }
    }

    /// Sets the preview subdomain.
    #[must_use]
    pub fn with_subdomain(mut self, subdomain: Subdomain) -> Self {
        self.subdomain = Some(subdomain);
        self
    }

    /// Reconstructs a project from persistence.
    #[must_use]
    pub fn from_persisted(data: PersistedProjectData) -> Self {
        Self {
            id: data.id,
            status: data.status,
            settings: data.settings,
            subdomain: data.subdomain,
            created_at: data.created_at,
            updated_at: data.updated_at,
        }
    }

    /// Returns the project identifier.
    #[must_use]
    pub const fn id(&self) -> ProjectId {
        self.id
    }

    /// Returns the project status.
    #[must_use]
    pub const fn status(&self) -> ProjectStatus {
        self.status
    }

    /// Returns the settings bag.
    #[must_use]
    pub const fn settings(&self) -> &ProjectSettings {
        &self.settings
    }

    /// Returns the preview subdomain, if any.
    #[must_use]
    pub const fn subdomain(&self) -> Option<&Subdomain> {
        self.subdomain.as_ref()
    }

    /// Returns the creation timestamp.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns the latest update timestamp.
    #[must_use]
    pub const fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Moves the project to `target`.
    ///
    /// Returns `Ok(false)` without touching the project when it is already in
    /// `target`, and `Ok(true)` when the status changed.
    ///
    /// # Errors
    ///
    /// Returns [`DeploymentDomainError::InvalidProjectTransition`] when the
    /// state machine forbids the move.
    pub fn transition_to(
        &mut self,
        target: ProjectStatus,
        clock: &impl Clock,
    ) -> Result<bool, DeploymentDomainError> {
        if self.status == target {
            return Ok(false);
        }
        if !self.status.can_transition_to(target) {
            return Err(DeploymentDomainError::InvalidProjectTransition {
                from: self.status.as_str().to_owned(),
                to: target.as_str().to_owned(),
            });
        }
        self.status = target;
        self.updated_at = clock.utc();
        Ok(true)
    }
}
