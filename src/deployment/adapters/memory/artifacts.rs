//! Static build artifact source.

use crate::deployment::{
    domain::{Project, ProjectId},
    ports::{ArtifactError, BuildArtifactSource, BuildArtifacts},
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Artifact source backed by an in-memory map.
///
/// Projects without an entry fall back to the default artifacts, if set.
/// Without either, lookups fail with [`ArtifactError::NotBuilt`].
#[derive(Debug, Clone, Default)]
pub struct InMemoryArtifactSource {
    state: Arc<RwLock<ArtifactState>>,
}

#[derive(Debug, Default)]
struct ArtifactState {
    fallback: Option<BuildArtifacts>,
    by_project: HashMap<ProjectId, BuildArtifacts>,
}

impl InMemoryArtifactSource {
    /// Creates a source with no artifacts.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a source that serves `artifacts` for every project.
    #[must_use]
    pub fn serving(artifacts: BuildArtifacts) -> Self {
        let source = Self::default();
        if let Ok(mut state) = source.state.write() {
            state.fallback = Some(artifacts);
        }
        source
    }

    /// Registers artifacts for one project.
    pub fn publish(&self, project_id: ProjectId, artifacts: BuildArtifacts) {
        if let Ok(mut state) = self.state.write() {
            state.by_project.insert(project_id, artifacts);
        }
    }
}

#[async_trait]
impl BuildArtifactSource for InMemoryArtifactSource {
    async fn artifacts_for(&self, project: &Project) -> Result<BuildArtifacts, ArtifactError> {
        let state = self
            .state
            .read()
            .map_err(|err| ArtifactError::lookup(std::io::Error::other(err.to_string())))?;
        state
            .by_project
            .get(&project.id())
            .or(state.fallback.as_ref())
            .cloned()
            .ok_or_else(|| ArtifactError::NotBuilt(project.id()))
    }
}
