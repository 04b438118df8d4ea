//! Error types and handling
//!
//! Domain errors for the parallel job orchestrator, one variant per error
//! kind in the error handling design. `ConfigInvalid` is the only variant
//! that propagates out of the CLI entry point; every other kind is
//! captured into a `JobResult` by the runner and never bubbles past the
//! scheduler.

use thiserror::Error;

/// Domain errors for the orchestrator core
#[derive(Error, Debug)]
pub enum RunnerError {
    /// Config file missing a required key, or a key has the wrong type
    #[error("invalid run config: {message}")]
    ConfigInvalid { message: String },

    /// Clone Manager failed to materialize the isolated working copy
    #[error("clone failed: {message}")]
    CloneFailed { message: String },

    /// Container engine could not create/destroy a network or container
    #[error("container engine error: {message}")]
    ContainerEngine { message: String },

    /// Child workflow process could not be spawned
    #[error("failed to spawn child process: {source}")]
    ChildSpawnFailed {
        #[from]
        source: std::io::Error,
    },
}

/// Convenience type alias for Results with RunnerError
pub type Result<T> = std::result::Result<T, RunnerError>;
