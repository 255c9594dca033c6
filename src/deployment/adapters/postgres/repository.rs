//! `PostgreSQL` repository implementations for projects and container
//! records.

use super::{
    models::{ContainerRow, NewContainerRow, ProjectRow},
    schema::{deployment_containers, projects},
};
use crate::deployment::{
    domain::{
        ContainerName, ContainerRecord, ContainerRecordId, ContainerStatus, EngineContainerId,
        EnvironmentVars, PersistedContainerData, PersistedProjectData, Project, ProjectId,
        ProjectSettings, ProjectStatus, Subdomain,
    },
    ports::{ContainerRepository, ProjectRepository, StoreError, StoreResult},
};
use async_trait::async_trait;
use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool};
use diesel::result::{DatabaseErrorInformation, DatabaseErrorKind, Error as DieselError};

/// `PostgreSQL` connection pool type for deployment adapters.
pub type DeploymentPgPool = Pool<ConnectionManager<PgConnection>>;

const ACTIVE_STATUSES: [&str; 2] = [
    ContainerStatus::Starting.as_str(),
    ContainerStatus::Running.as_str(),
];

async fn run_blocking<F, T>(pool: &DeploymentPgPool, operation: F) -> StoreResult<T>
where
    F: FnOnce(&mut PgConnection) -> StoreResult<T> + Send + 'static,
    T: Send + 'static,
{
    let pool = pool.clone();
    tokio::task::spawn_blocking(move || {
        let mut connection = pool.get().map_err(StoreError::persistence)?;
        operation(&mut connection)
    })
    .await
    .map_err(StoreError::persistence)?
}

/// `PostgreSQL`-backed repository for container records.
#[derive(Debug, Clone)]
pub struct PostgresContainerRepository {
    pool: DeploymentPgPool,
}

impl PostgresContainerRepository {
    /// Creates a new repository from a `PostgreSQL` pool.
    #[must_use]
    pub const fn new(pool: DeploymentPgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ContainerRepository for PostgresContainerRepository {
    async fn insert(&self, record: &ContainerRecord) -> StoreResult<()> {
        let row = to_container_row(record)?;
        let record_id = record.id();
        let project_id = record.project_id();

        run_blocking(&self.pool, move |connection| {
            diesel::insert_into(deployment_containers::table)
                .values(&row)
                .execute(connection)
                .map_err(|err| map_write_error(err, &row, record_id, project_id))?;
            Ok(())
        })
        .await
    }

    async fn update(&self, record: &ContainerRecord) -> StoreResult<()> {
        let row = to_container_row(record)?;
        let record_id = record.id();
        let project_id = record.project_id();

        run_blocking(&self.pool, move |connection| {
            let updated_count =
                diesel::update(deployment_containers::table.find(record_id.into_inner()))
                    .set(&row)
                    .execute(connection)
                    .map_err(|err| map_write_error(err, &row, record_id, project_id))?;

            if updated_count == 0 {
                return Err(StoreError::ContainerNotFound(record_id));
            }
            Ok(())
        })
        .await
    }

    async fn find_by_id(&self, id: ContainerRecordId) -> StoreResult<Option<ContainerRecord>> {
        run_blocking(&self.pool, move |connection| {
            let row = deployment_containers::table
                .find(id.into_inner())
                .select(ContainerRow::as_select())
                .first::<ContainerRow>(connection)
                .optional()
                .map_err(StoreError::persistence)?;
            row.map(row_to_container).transpose()
        })
        .await
    }

    async fn find_active_for_project(
        &self,
        project_id: ProjectId,
    ) -> StoreResult<Option<ContainerRecord>> {
        run_blocking(&self.pool, move |connection| {
            let row = deployment_containers::table
                .filter(deployment_containers::project_id.eq(project_id.into_inner()))
                .filter(deployment_containers::status.eq_any(ACTIVE_STATUSES))
                .select(ContainerRow::as_select())
                .first::<ContainerRow>(connection)
                .optional()
                .map_err(StoreError::persistence)?;
            row.map(row_to_container).transpose()
        })
        .await
    }

    async fn list_for_project(&self, project_id: ProjectId) -> StoreResult<Vec<ContainerRecord>> {
        run_blocking(&self.pool, move |connection| {
            let rows = deployment_containers::table
                .filter(deployment_containers::project_id.eq(project_id.into_inner()))
                .order(deployment_containers::created_at.asc())
                .select(ContainerRow::as_select())
                .load::<ContainerRow>(connection)
                .map_err(StoreError::persistence)?;
            rows.into_iter().map(row_to_container).collect()
        })
        .await
    }

    async fn list_active(&self) -> StoreResult<Vec<ContainerRecord>> {
        run_blocking(&self.pool, move |connection| {
            let rows = deployment_containers::table
                .filter(deployment_containers::status.eq_any(ACTIVE_STATUSES))
                .order(deployment_containers::created_at.asc())
                .select(ContainerRow::as_select())
                .load::<ContainerRow>(connection)
                .map_err(StoreError::persistence)?;
            rows.into_iter().map(row_to_container).collect()
        })
        .await
    }

    async fn active_ports(&self) -> StoreResult<Vec<u16>> {
        run_blocking(&self.pool, move |connection| {
            let ports = deployment_containers::table
                .filter(deployment_containers::status.eq_any(ACTIVE_STATUSES))
                .filter(deployment_containers::port.is_not_null())
                .select(deployment_containers::port)
                .load::<Option<i32>>(connection)
                .map_err(StoreError::persistence)?;
            ports
                .into_iter()
                .flatten()
                .map(|port| u16::try_from(port).map_err(StoreError::invalid_persisted_data))
                .collect()
        })
        .await
    }

    async fn delete_for_project(&self, project_id: ProjectId) -> StoreResult<usize> {
        run_blocking(&self.pool, move |connection| {
            diesel::delete(
                deployment_containers::table
                    .filter(deployment_containers::project_id.eq(project_id.into_inner())),
            )
            .execute(connection)
            .map_err(StoreError::persistence)
        })
        .await
    }
}

/// `PostgreSQL`-backed repository for the project fields the orchestrator
/// owns.
#[derive(Debug, Clone)]
pub struct PostgresProjectRepository {
    pool: DeploymentPgPool,
}

impl PostgresProjectRepository {
    /// Creates a new repository from a `PostgreSQL` pool.
    #[must_use]
    pub const fn new(pool: DeploymentPgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProjectRepository for PostgresProjectRepository {
    async fn find_by_id(&self, id: ProjectId) -> StoreResult<Option<Project>> {
        run_blocking(&self.pool, move |connection| {
            let row = projects::table
                .find(id.into_inner())
                .select(ProjectRow::as_select())
                .first::<ProjectRow>(connection)
                .optional()
                .map_err(StoreError::persistence)?;
            row.map(row_to_project).transpose()
        })
        .await
    }

    async fn update_status(&self, project: &Project) -> StoreResult<()> {
        let project_id = project.id();
        let status = project.status().as_str();
        let updated_at = project.updated_at();

        run_blocking(&self.pool, move |connection| {
            let updated_count = diesel::update(projects::table.find(project_id.into_inner()))
                .set((
                    projects::status.eq(status),
                    projects::updated_at.eq(updated_at),
                ))
                .execute(connection)
                .map_err(StoreError::persistence)?;

            if updated_count == 0 {
                return Err(StoreError::ProjectNotFound(project_id));
            }
            Ok(())
        })
        .await
    }

    async fn delete(&self, id: ProjectId) -> StoreResult<()> {
        run_blocking(&self.pool, move |connection| {
            diesel::delete(projects::table.find(id.into_inner()))
                .execute(connection)
                .map_err(StoreError::persistence)?;
            Ok(())
        })
        .await
    }
}

fn to_container_row(record: &ContainerRecord) -> StoreResult<NewContainerRow> {
    let environment =
        serde_json::to_value(record.environment()).map_err(StoreError::persistence)?;

    Ok(NewContainerRow {
        id: record.id().into_inner(),
        project_id: record.project_id().into_inner(),
        container_id: record.engine_id().map(|id| id.as_str().to_owned()),
        name: record.name().as_str().to_owned(),
        status: record.status().as_str().to_owned(),
        port: record.port().map(i32::from),
        url: record.url().map(str::to_owned),
        environment,
        logs: record.logs().map(str::to_owned),
        started_at: record.started_at(),
        stopped_at: record.stopped_at(),
        created_at: record.created_at(),
        updated_at: record.updated_at(),
    })
}

fn row_to_container(row: ContainerRow) -> StoreResult<ContainerRecord> {
    let ContainerRow {
        id,
        project_id,
        container_id,
        name,
        status,
        port,
        url,
        environment,
        logs,
        started_at,
        stopped_at,
        created_at,
        updated_at,
    } = row;

    let engine_id = container_id
        .map(EngineContainerId::new)
        .transpose()
        .map_err(StoreError::invalid_persisted_data)?;
    let parsed_name = ContainerName::new(name).map_err(StoreError::invalid_persisted_data)?;
    let parsed_status =
        ContainerStatus::try_from(status.as_str()).map_err(StoreError::invalid_persisted_data)?;
    let parsed_port = port
        .map(u16::try_from)
        .transpose()
        .map_err(StoreError::invalid_persisted_data)?;
    let parsed_environment: EnvironmentVars =
        serde_json::from_value(environment).map_err(StoreError::invalid_persisted_data)?;

    Ok(ContainerRecord::from_persisted(PersistedContainerData {
        id: ContainerRecordId::from_uuid(id),
        project_id: ProjectId::from_uuid(project_id),
        engine_id,
        name: parsed_name,
        status: parsed_status,
        port: parsed_port,
        url,
        environment: parsed_environment,
        logs,
        started_at,
        stopped_at,
        created_at,
        updated_at,
    }))
}

fn row_to_project(row: ProjectRow) -> StoreResult<Project> {
    let ProjectRow {
        id,
        status,
        settings,
        subdomain,
        created_at,
        updated_at,
    } = row;

    let parsed_status =
        ProjectStatus::try_from(status.as_str()).map_err(StoreError::invalid_persisted_data)?;
    let parsed_settings: ProjectSettings =
        serde_json::from_value(settings).map_err(StoreError::invalid_persisted_data)?;
    let parsed_subdomain = subdomain
        .map(Subdomain::new)
        .transpose()
        .map_err(StoreError::invalid_persisted_data)?;

    Ok(Project::from_persisted(PersistedProjectData {
        id: ProjectId::from_uuid(id),
        status: parsed_status,
        settings: parsed_settings,
        subdomain: parsed_subdomain,
        created_at,
        updated_at,
    }))
}

fn map_write_error(
    err: DieselError,
    row: &NewContainerRow,
    record_id: ContainerRecordId,
    project_id: ProjectId,
) -> StoreError {
    let constraint = match &err {
        DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, info) => {
            violated_constraint(info.as_ref())
        }
        _ => return StoreError::persistence(err),
    };

    match constraint.as_deref() {
        Some("idx_deployment_containers_active_project") => {
            StoreError::ActiveContainerExists(project_id)
        }
        Some("idx_deployment_containers_active_port") => row
            .port
            .and_then(|port| u16::try_from(port).ok())
            .map_or_else(|| StoreError::persistence(err), StoreError::PortInUse),
        Some("idx_deployment_containers_container_id") => {
            StoreError::DuplicateEngineId(row.container_id.clone().unwrap_or_default())
        }
        _ => StoreError::DuplicateRecord(record_id),
    }
}

fn violated_constraint(info: &dyn DatabaseErrorInformation) -> Option<String> {
    info.constraint_name().map(str::to_owned)
}
