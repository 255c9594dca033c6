//! Repository ports for project and container record persistence.

use crate::deployment::domain::{ContainerRecord, ContainerRecordId, Project, ProjectId};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Result type for deployment store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Persistence contract for container records.
///
/// Implementations enforce the storage safety nets: at most one active row
/// per project, distinct ports among active rows, and globally unique engine
/// identifiers.
#[async_trait]
pub trait ContainerRepository: Send + Sync {
    /// Stores a new container record.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::DuplicateRecord`] when the ID already exists,
    /// [`StoreError::ActiveContainerExists`] when the project already has an
    /// active row, or [`StoreError::PortInUse`] when another active row holds
    /// the port.
    async fn insert(&self, record: &ContainerRecord) -> StoreResult<()>;

    /// Persists all fields of an existing record.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ContainerNotFound`] when the record does not
    /// exist, or [`StoreError::DuplicateEngineId`] when another row already
    /// holds the engine identifier.
    async fn update(&self, record: &ContainerRecord) -> StoreResult<()>;

    /// Finds a record by identifier.
    async fn find_by_id(&self, id: ContainerRecordId) -> StoreResult<Option<ContainerRecord>>;

    /// Finds the active (`starting` or `running`) record for a project.
    async fn find_active_for_project(
        &self,
        project_id: ProjectId,
    ) -> StoreResult<Option<ContainerRecord>>;

    /// Returns all records for a project, oldest first.
    async fn list_for_project(&self, project_id: ProjectId) -> StoreResult<Vec<ContainerRecord>>;

    /// Returns all active records across projects.
    async fn list_active(&self) -> StoreResult<Vec<ContainerRecord>>;

    /// Returns the ports held by active records.
    async fn active_ports(&self) -> StoreResult<Vec<u16>> {
        Ok(self
            .list_active()
            .await?
            .iter()
            .filter_map(ContainerRecord::port)
            .collect())
    }

    /// Deletes every record belonging to a project and returns the count.
    async fn delete_for_project(&self, project_id: ProjectId) -> StoreResult<usize>;
}

/// Persistence contract for the project fields the orchestrator owns.
#[async_trait]
pub trait ProjectRepository: Send + Sync {
    /// Finds a project by identifier.
    async fn find_by_id(&self, id: ProjectId) -> StoreResult<Option<Project>>;

    /// Persists the project's status and update timestamp.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ProjectNotFound`] when the project does not
    /// exist.
    async fn update_status(&self, project: &Project) -> StoreResult<()>;

    /// Deletes a project. Deleting a missing project is not an error.
    async fn delete(&self, id: ProjectId) -> StoreResult<()>;
}

/// Errors returned by deployment repository implementations.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// A record with the same identifier already exists.
    #[error("duplicate container record identifier: {0}")]
    DuplicateRecord(ContainerRecordId),

    /// The project already has an active container record.
    #[error("project {0} already has an active container")]
    ActiveContainerExists(ProjectId),

    /// Another active record already holds the port.
    #[error("port {0} is held by another active container")]
    PortInUse(u16),

    /// Another record already holds the engine identifier.
    #[error("engine container identifier {0} is already recorded")]
    DuplicateEngineId(String),

    /// The container record was not found.
    #[error("container record not found: {0}")]
    ContainerNotFound(ContainerRecordId),

    /// The project was not found.
    #[error("project not found: {0}")]
    ProjectNotFound(ProjectId),

    /// Persisted data could not be reconstructed into domain types.
    #[error("invalid persisted deployment data: {0}")]
    InvalidPersistedData(Arc<dyn std::error::Error + Send + Sync>),

    /// Persistence-layer failure.
    #[error("persistence error: {0}")]
    Persistence(Arc<dyn std::error::Error + Send + Sync>),
}

impl StoreError {
    /// Wraps persisted-data decoding or validation failures.
    pub fn invalid_persisted_data(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::InvalidPersistedData(Arc::new(err))
    }

    /// Wraps a persistence-layer failure.
    pub fn persistence(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Persistence(Arc::new(err))
    }
}
