//! Adapter implementations for deployment ports.

pub mod docker;
pub mod memory;
pub mod postgres;

mod runtime;
mod tcp_probe;

pub use runtime::{FakeReadiness, InMemoryContainerEngine};
pub use tcp_probe::TcpPortProbe;
