//! In-memory adapters for deterministic orchestration flows and tests.

mod artifacts;
mod containers;
mod port_probe;
mod projects;

pub use artifacts::InMemoryArtifactSource;
pub use containers::InMemoryContainerRepository;
pub use port_probe::StaticPortProbe;
pub use projects::InMemoryProjectRepository;
