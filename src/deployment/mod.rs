//! Container lifecycle orchestration for live project previews.
//!
//! This module starts, monitors, and tears down one isolated container per
//! project, allocates host ports for preview URLs, and reconciles engine state
//! with persisted container records. The module follows hexagonal
//! architecture:
//!
//! - Domain types in [`domain`]
//! - Port contracts in [`ports`]
//! - Adapter implementations in [`adapters`]
//! - Orchestration services in [`services`]

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod services;
