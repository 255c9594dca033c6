//! Container engine adapter driving the Docker CLI.
//!
//! Every call shells out to the engine binary through a [`CommandRunner`]
//! with a hard timeout, then classifies the outcome into an
//! [`EngineError`](crate::deployment::ports::EngineError).
//!
//! [`CommandRunner`]: crate::deployment::ports::CommandRunner

mod command;
mod engine;
mod parse;

pub use command::TokioCommandRunner;
pub use engine::{DockerCliEngine, EngineTimeouts};
