//! Diesel schema for deployment persistence.

diesel::table! {
    /// Projects whose previews the orchestrator manages.
    projects (id) {
        /// Project identifier.
        id -> Uuid,
        /// Project status (`draft`, `building`, `ready`, `error`).
        #[max_length = 50]
        status -> Varchar,
        /// Opaque settings bag as JSONB.
        settings -> Jsonb,
        /// Optional preview subdomain.
        #[max_length = 63]
        subdomain -> Nullable<Varchar>,
        /// Creation timestamp.
        created_at -> Timestamptz,
        /// Last update timestamp.
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    /// One row per attempt to run a project's preview.
    deployment_containers (id) {
        /// Record identifier.
        id -> Uuid,
        /// Owning project.
        project_id -> Uuid,
        /// Engine-assigned container identifier.
        #[max_length = 128]
        container_id -> Nullable<Varchar>,
        /// Engine-facing container name.
        #[max_length = 128]
        name -> Varchar,
        /// Container status (`starting`, `running`, `stopped`, `error`).
        #[max_length = 50]
        status -> Varchar,
        /// Allocated host port.
        port -> Nullable<Int4>,
        /// Preview URL.
        url -> Nullable<Text>,
        /// Environment passed at creation time, as JSONB.
        environment -> Jsonb,
        /// Cached log snapshot.
        logs -> Nullable<Text>,
        /// Latest transition into `running`.
        started_at -> Nullable<Timestamptz>,
        /// Transition into `stopped` or `error`.
        stopped_at -> Nullable<Timestamptz>,
        /// Creation timestamp.
        created_at -> Timestamptz,
        /// Last update timestamp.
        updated_at -> Timestamptz,
    }
}

diesel::joinable!(deployment_containers -> projects (project_id));
diesel::allow_tables_to_appear_in_same_query!(projects, deployment_containers);
