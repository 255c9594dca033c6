//! Build artifact port, fed by the generation pipeline.

use crate::deployment::domain::{EnvironmentVars, Project, ProjectId};
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

/// Host directory mounted into the preview container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindMount {
    /// Host path.
    pub source: PathBuf,
    /// Path inside the container.
    pub target: String,
}

/// What the orchestrator needs to run a project's preview.
///
/// Produced by the generation pipeline and passed through opaquely.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildArtifacts {
    /// Image to run.
    pub image: String,
    /// Port the application listens on inside the container.
    pub container_port: u16,
    /// Environment passed to the process.
    pub environment: EnvironmentVars,
    /// Optional bind mount of generated sources.
    pub mount: Option<BindMount>,
}

impl BuildArtifacts {
    /// Creates artifacts for an image listening on `container_port`.
    #[must_use]
    pub fn new(image: impl Into<String>, container_port: u16) -> Self {
        Self {
            image: image.into(),
            container_port,
            environment: EnvironmentVars::new(),
            mount: None,
        }
    }

    /// Adds an environment variable.
    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.environment.insert(key.into(), value.into());
        self
    }

    /// Sets the bind mount.
    #[must_use]
    pub fn with_mount(mut self, source: impl Into<PathBuf>, target: impl Into<String>) -> Self {
        self.mount = Some(BindMount {
            source: source.into(),
            target: target.into(),
        });
        self
    }
}

/// Errors returned by artifact sources.
#[derive(Debug, Clone, Error)]
pub enum ArtifactError {
    /// No artifacts have been produced for the project yet.
    #[error("no build artifacts available for project {0}")]
    NotBuilt(ProjectId),

    /// Artifact lookup failed.
    #[error("artifact source error: {0}")]
    Lookup(Arc<dyn std::error::Error + Send + Sync>),
}

impl ArtifactError {
    /// Wraps an artifact source failure.
    pub fn lookup(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Lookup(Arc::new(err))
    }
}

/// Supplies build artifacts for a project.
#[async_trait]
pub trait BuildArtifactSource: Send + Sync {
    /// Returns the artifacts to deploy for `project`.
    async fn artifacts_for(&self, project: &Project) -> Result<BuildArtifacts, ArtifactError>;
}
