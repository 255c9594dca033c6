//! Error types for deployment domain validation and parsing.

use super::ContainerRecordId;
use thiserror::Error;

/// Errors returned while constructing or mutating deployment domain values.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DeploymentDomainError {
    /// The engine container identifier is empty after trimming.
    #[error("engine container identifier must not be empty")]
    EmptyEngineContainerId,

    /// The container name is empty after trimming.
    #[error("container name must not be empty")]
    EmptyContainerName,

    /// The container name contains characters the engine rejects.
    #[error(
        "container name '{0}' contains invalid characters (only lowercase alphanumeric, '-', '_' and '.' allowed)"
    )]
    InvalidContainerName(String),

    /// The subdomain is not a valid DNS label.
    #[error("subdomain '{0}' is not a valid DNS label")]
    InvalidSubdomain(String),

    /// The port range is empty or inverted.
    #[error("invalid port range {start}-{end}")]
    InvalidPortRange {
        /// First port of the range.
        start: u16,
        /// Last port of the range.
        end: u16,
    },

    /// Transitioning between two container states is invalid.
    #[error("invalid container status transition: {from} -> {to}")]
    InvalidContainerTransition {
        /// Current container status.
        from: String,
        /// Requested target container status.
        to: String,
    },

    /// Transitioning between two project states is invalid.
    #[error("invalid project status transition: {from} -> {to}")]
    InvalidProjectTransition {
        /// Current project status.
        from: String,
        /// Requested target project status.
        to: String,
    },

    /// The container record already carries a different engine identifier.
    #[error("container record {0} already has an engine container identifier")]
    EngineIdAlreadyAssigned(ContainerRecordId),
}

/// Error returned while parsing container status from persistence.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown container status: {0}")]
pub struct ParseContainerStatusError(pub String);

/// Error returned while parsing project status from persistence.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown project status: {0}")]
pub struct ParseProjectStatusError(pub String);

