//! In-memory repository for the project fields the orchestrator owns.

use crate::deployment::{
    domain::{Project, ProjectId},
    ports::{ProjectRepository, StoreError, StoreResult},
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Thread-safe in-memory project repository.
///
/// Projects are owned by the surrounding application; [`Self::insert`] seeds
/// them for deterministic flows.
#[derive(Debug, Clone, Default)]
pub struct InMemoryProjectRepository {
    state: Arc<RwLock<HashMap<ProjectId, Project>>>,
}

impl InMemoryProjectRepository {
    /// Creates an empty in-memory repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a project, replacing any project with the same identifier.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Persistence`] when the lock is poisoned.
    pub fn insert(&self, project: Project) -> StoreResult<()> {
        let mut state = self
            .state
            .write()
            .map_err(|err| StoreError::persistence(std::io::Error::other(err.to_string())))?;
        state.insert(project.id(), project);
        Ok(())
    }
}

#[async_trait]
impl ProjectRepository for InMemoryProjectRepository {
    async fn find_by_id(&self, id: ProjectId) -> StoreResult<Option<Project>> {
        let state = self
            .state
            .read()
            .map_err(|err| StoreError::persistence(std::io::Error::other(err.to_string())))?;
        Ok(state.get(&id).cloned())
    }

    async fn update_status(&self, project: &Project) -> StoreResult<()> {
        let mut state = self
            .state
            .write()
            .map_err(|err| StoreError::persistence(std::io::Error::other(err.to_string())))?;
        let stored = state
            .get_mut(&project.id())
            .ok_or_else(|| StoreError::ProjectNotFound(project.id()))?;
        *stored = project.clone();
        Ok(())
    }

    async fn delete(&self, id: ProjectId) -> StoreResult<()> {
        let mut state = self
            .state
            .write()
            .map_err(|err| StoreError::persistence(std::io::Error::other(err.to_string())))?;
        state.remove(&id);
        Ok(())
    }
}
