//! In-memory repository for container records.

use crate::deployment::{
    domain::{ContainerRecord, ContainerRecordId, ProjectId},
    ports::{ContainerRepository, StoreError, StoreResult},
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Thread-safe in-memory container record repository.
#[derive(Debug, Clone, Default)]
pub struct InMemoryContainerRepository {
    state: Arc<RwLock<InMemoryContainerState>>,
}

#[derive(Debug, Default)]
struct InMemoryContainerState {
    records: HashMap<ContainerRecordId, ContainerRecord>,
}

impl InMemoryContainerRepository {
    /// Creates an empty in-memory repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl InMemoryContainerState {
    fn check_constraints(&self, record: &ContainerRecord) -> StoreResult<()> {
        for other in self.records.values().filter(|other| other.id() != record.id()) {
            if let (Some(engine_id), Some(other_engine_id)) = (record.engine_id(), other.engine_id())
                && engine_id == other_engine_id
            {
                return Err(StoreError::DuplicateEngineId(engine_id.to_string()));
            }

            if !record.is_active() || !other.is_active() {
                continue;
            }
            if other.project_id() == record.project_id() {
                return Err(StoreError::ActiveContainerExists(record.project_id()));
            }
            if let Some(port) = record.port()
                && other.port() == Some(port)
            {
                return Err(StoreError::PortInUse(port));
            }
        }
        Ok(())
    }
}

fn sorted_by_creation(mut records: Vec<ContainerRecord>) -> Vec<ContainerRecord> {
    records.sort_by_key(ContainerRecord::created_at);
    records
}

#[async_trait]
impl ContainerRepository for InMemoryContainerRepository {
    async fn insert(&self, record: &ContainerRecord) -> StoreResult<()> {
        let mut state = self
            .state
            .write()
            .map_err(|err| StoreError::persistence(std::io::Error::other(err.to_string())))?;

        if state.records.contains_key(&record.id()) {
            return Err(StoreError::DuplicateRecord(record.id()));
        }
        state.check_constraints(record)?;
        state.records.insert(record.id(), record.clone());
        Ok(())
    }

    async fn update(&self, record: &ContainerRecord) -> StoreResult<()> {
        let mut state = self
            .state
            .write()
            .map_err(|err| StoreError::persistence(std::io::Error::other(err.to_string())))?;

        if !state.records.contains_key(&record.id()) {
            return Err(StoreError::ContainerNotFound(record.id()));
        }
        state.check_constraints(record)?;
        state.records.insert(record.id(), record.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: ContainerRecordId) -> StoreResult<Option<ContainerRecord>> {
        let state = self
            .state
            .read()
            .map_err(|err| StoreError::persistence(std::io::Error::other(err.to_string())))?;
        Ok(state.records.get(&id).cloned())
    }

    async fn find_active_for_project(
        &self,
        project_id: ProjectId,
    ) -> StoreResult<Option<ContainerRecord>> {
        let state = self
            .state
            .read()
            .map_err(|err| StoreError::persistence(std::io::Error::other(err.to_string())))?;
        Ok(state
            .records
            .values()
            .find(|record| record.project_id() == project_id && record.is_active())
            .cloned())
    }

    async fn list_for_project(&self, project_id: ProjectId) -> StoreResult<Vec<ContainerRecord>> {
        let state = self
            .state
            .read()
            .map_err(|err| StoreError::persistence(std::io::Error::other(err.to_string())))?;
        Ok(sorted_by_creation(
            state
                .records
                .values()
                .filter(|record| record.project_id() == project_id)
                .cloned()
                .collect(),
        ))
    }

    async fn list_active(&self) -> StoreResult<Vec<ContainerRecord>> {
        let state = self
            .state
            .read()
            .map_err(|err| StoreError::persistence(std::io::Error::other(err.to_string())))?;
        Ok(sorted_by_creation(
            state
                .records
                .values()
                .filter(|record| record.is_active())
                .cloned()
                .collect(),
        ))
    }

    async fn delete_for_project(&self, project_id: ProjectId) -> StoreResult<usize> {
        let mut state = self
            .state
            .write()
            .map_err(|err| StoreError::persistence(std::io::Error::other(err.to_string())))?;
        let before = state.records.len();
        state
            .records
            .retain(|_, record| record.project_id() != project_id);
        Ok(before.saturating_sub(state.records.len()))
    }
}
