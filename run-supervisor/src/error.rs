//! Error types for the run supervisor.

use thiserror::Error;

/// Result type alias for supervisor operations.
pub type Result<T> = std::result::Result<T, SupervisorError>;

/// Errors that can occur while supervising command runs.
#[derive(Error, Debug)]
pub enum SupervisorError {
    /// No program was given.
    #[error("empty command")]
    EmptyCommand,

    /// The command could not be started.
    #[error("{command}: {source}")]
    Launch {
        command: String,
        #[source]
        source: std::io::Error,
    },
}
