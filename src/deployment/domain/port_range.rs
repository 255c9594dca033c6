//! Allocatable host port range.

use super::DeploymentDomainError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Inclusive range of host ports available to preview containers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PortRange {
    start: u16,
    end: u16,
}

impl PortRange {
    /// Creates a validated inclusive port range.
    ///
    /// # Errors
    ///
    /// Returns [`DeploymentDomainError::InvalidPortRange`] when `start` is
    /// zero or greater than `end`.
    pub const fn new(start: u16, end: u16) -> Result<Self, DeploymentDomainError> {
        if start == 0 || start > end {
            return Err(DeploymentDomainError::InvalidPortRange { start, end });
        }
        Ok(Self { start, end })
    }

    /// Returns the first port of the range.
    #[must_use]
    pub const fn start(self) -> u16 {
        self.start
    }

    /// Returns the last port of the range.
    #[must_use]
    pub const fn end(self) -> u16 {
        self.end
    }

    /// Returns whether `port` lies within the range.
    #[must_use]
    pub const fn contains(self, port: u16) -> bool {
        port >= self.start && port <= self.end
    }

    /// Iterates the range in ascending order.
    pub fn iter(self) -> impl Iterator<Item = u16> {
        self.start..=self.end
    }
}

impl Default for PortRange {
    fn default() -> Self {
        Self {
            start: 3000,
            end: 9000,
        }
    }
}

impl fmt::Display for PortRange {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}-{}", self.start, self.end)
    }
}
