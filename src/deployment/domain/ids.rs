//! Identifier and validated-name types for projects and containers.

use super::DeploymentDomainError;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Maximum length of a DNS label.
const MAX_SUBDOMAIN_LENGTH: usize = 63;

/// Maximum container name length accepted by Docker-compatible engines.
const MAX_CONTAINER_NAME_LENGTH: usize = 128;

/// Number of UUID hex characters used in generated container names.
const SHORT_ID_LENGTH: usize = 8;

macro_rules! uuid_identifier {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Creates a new random identifier.
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Creates an identifier from an existing UUID.
            #[must_use]
            pub const fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Returns the wrapped UUID.
            #[must_use]
            pub const fn into_inner(self) -> Uuid {
                self.0
            }

            /// Returns the first eight hex characters, for use in names.
            #[must_use]
            pub fn short(&self) -> String {
                self.0.simple().to_string().chars().take(SHORT_ID_LENGTH).collect()
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl AsRef<Uuid> for $name {
            fn as_ref(&self) -> &Uuid {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(formatter, "{}", self.0)
            }
        }
    };
}

uuid_identifier!(
    /// Unique identifier for a project.
    ProjectId
);

uuid_identifier!(
    /// Unique identifier for a persisted container record.
    ContainerRecordId
);

/// Identifier assigned by the container engine once creation succeeds.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EngineContainerId(String);

impl EngineContainerId {
    /// Creates an engine container identifier.
    ///
    /// # Errors
    ///
    /// Returns [`DeploymentDomainError::EmptyEngineContainerId`] when the
    /// value is empty after trimming.
    pub fn new(value: impl Into<String>) -> Result<Self, DeploymentDomainError> {
        let normalized = value.into().trim().to_owned();
        if normalized.is_empty() {
            return Err(DeploymentDomainError::EmptyEngineContainerId);
        }
        Ok(Self(normalized))
    }

    /// Wraps an identifier the crate generated itself and knows is non-empty.
    pub(crate) fn from_trusted(value: String) -> Self {
        debug_assert!(!value.trim().is_empty());
        Self(value)
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns whether `other` names the same container.
    ///
    /// Engines report both full and abbreviated identifiers, so a prefix
    /// match in either direction counts.
    #[must_use]
    pub fn matches(&self, other: &Self) -> bool {
        self.0.starts_with(other.as_str()) || other.0.starts_with(self.as_str())
    }
}

impl AsRef<str> for EngineContainerId {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl fmt::Display for EngineContainerId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Validated engine-facing container name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContainerName(String);

impl ContainerName {
    /// Creates a validated container name.
    ///
    /// The input is trimmed and lowercased. Only characters in
    /// `[a-z0-9_.-]` are accepted.
    ///
    /// # Errors
    ///
    /// Returns [`DeploymentDomainError`] when validation fails.
    pub fn new(value: impl Into<String>) -> Result<Self, DeploymentDomainError> {
        let normalized = value.into().trim().to_ascii_lowercase();

        if normalized.is_empty() {
            return Err(DeploymentDomainError::EmptyContainerName);
        }

        let is_valid = normalized.len() <= MAX_CONTAINER_NAME_LENGTH
            && normalized.chars().all(|character| {
                character.is_ascii_lowercase()
                    || character.is_ascii_digit()
                    || matches!(character, '-' | '_' | '.')
            });
        if !is_valid {
            return Err(DeploymentDomainError::InvalidContainerName(normalized));
        }

        Ok(Self(normalized))
    }

    /// Builds the canonical name for a container record.
    ///
    /// # Errors
    ///
    /// Returns [`DeploymentDomainError`] when `prefix` contains characters
    /// that are not valid in a container name.
    pub fn for_record(
        prefix: &str,
        project_id: ProjectId,
        record_id: ContainerRecordId,
    ) -> Result<Self, DeploymentDomainError> {
        Self::new(format!(
            "{prefix}-{}-{}",
            project_id.short(),
            record_id.short()
        ))
    }

    /// Returns the container name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for ContainerName {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl fmt::Display for ContainerName {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Validated preview subdomain (a single DNS label).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Subdomain(String);

impl Subdomain {
    /// Creates a validated subdomain.
    ///
    /// # Errors
    ///
    /// Returns [`DeploymentDomainError::InvalidSubdomain`] when the value is
    /// not a lowercase DNS label.
    pub fn new(value: impl Into<String>) -> Result<Self, DeploymentDomainError> {
        let normalized = value.into().trim().to_ascii_lowercase();

        let has_valid_chars = normalized
            .chars()
            .all(|character| character.is_ascii_lowercase() || character.is_ascii_digit() || character == '-');
        let is_valid = !normalized.is_empty()
            && normalized.len() <= MAX_SUBDOMAIN_LENGTH
            && has_valid_chars
            && !normalized.starts_with('-')
            && !normalized.ends_with('-');

        if !is_valid {
            return Err(DeploymentDomainError::InvalidSubdomain(normalized));
        }
        Ok(Self(normalized))
    }

    /// Returns the subdomain as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Subdomain {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}
