//! Diesel row models for deployment persistence.

use super::schema::{deployment_containers, projects};
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde_json::Value;

/// Query result row for projects.
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = projects)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct ProjectRow {
    /// Project identifier.
    pub id: uuid::Uuid,
    /// Project status.
    pub status: String,
    /// Settings payload.
    pub settings: Value,
    /// Optional preview subdomain.
    pub subdomain: Option<String>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
}

/// Query result row for container records.
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = deployment_containers)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct ContainerRow {
    /// Record identifier.
    pub id: uuid::Uuid,
    /// Owning project.
    pub project_id: uuid::Uuid,
    /// Engine-assigned container identifier.
    pub container_id: Option<String>,
    /// Engine-facing container name.
    pub name: String,
    /// Container status.
    pub status: String,
    /// Allocated host port.
    pub port: Option<i32>,
    /// Preview URL.
    pub url: Option<String>,
    /// Environment payload.
    pub environment: Value,
    /// Cached log snapshot.
    pub logs: Option<String>,
    /// Latest transition into `running`.
    pub started_at: Option<DateTime<Utc>>,
    /// Transition into a terminal status.
    pub stopped_at: Option<DateTime<Utc>>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
}

/// Insert and update model for container records.
#[derive(Debug, Clone, Insertable, AsChangeset)]
#[diesel(table_name = deployment_containers)]
#[diesel(treat_none_as_null = true)]
pub struct NewContainerRow {
    /// Record identifier.
    pub id: uuid::Uuid,
    /// Owning project.
    pub project_id: uuid::Uuid,
    /// Engine-assigned container identifier.
    pub container_id: Option<String>,
    /// Engine-facing container name.
    pub name: String,
    /// Container status.
    pub status: String,
    /// Allocated host port.
    pub port: Option<i32>,
    /// Preview URL.
    pub url: Option<String>,
    /// Environment payload.
    pub environment: Value,
    /// Cached log snapshot.
    pub logs: Option<String>,
    /// Latest transition into `running`.
    pub started_at: Option<DateTime<Utc>>,
    /// Transition into a terminal status.
    pub stopped_at: Option<DateTime<Utc>>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
}
