//! Pavilion: container orchestration for live project previews.
//!
//! Each project gets at most one running preview container, reachable on a
//! host port allocated from a configured range. The crate deploys, stops,
//! restarts and monitors those containers, and reconciles what the container
//! engine reports with persisted container records.
//!
//! # Architecture
//!
//! Pavilion follows hexagonal architecture principles:
//!
//! - **Domain**: Pure business logic with no infrastructure dependencies
//! - **Ports**: Abstract trait interfaces for external interactions
//! - **Adapters**: Concrete implementations of ports (Docker CLI,
//!   `PostgreSQL`, in-memory)
//! - **Services**: Lifecycle orchestration over the ports
//!
//! # Modules
//!
//! - [`deployment`]: Container lifecycle orchestration
//! - [`config`]: Environment-driven configuration
//! - [`telemetry`]: Tracing subscriber setup

pub mod config;
pub mod deployment;
pub mod telemetry;
