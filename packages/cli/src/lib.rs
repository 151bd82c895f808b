#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Pipeline orchestrator for the Vision Zero toolchain.
//!
//! Runs the `transformation`, `generation`, `model`, and `visualization`
//! stages for one city as child processes, in order. A state record in
//! the city's data directory lets reruns skip stages whose inputs have not
//! changed since they last completed.

pub mod pipeline;
pub mod stage;
pub mod state;

pub use pipeline::{Pipeline, StageOutcome};
pub use stage::Stage;
pub use state::PipelineState;

/// Errors that can occur while running the pipeline.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Configuration error.
    #[error(transparent)]
    Config(#[from] vz_config::ConfigError),

    /// I/O error (state record or input hashing).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization of the state record failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A stage command could not be started.
    #[error("Failed to start `{command}`: {source}")]
    Spawn {
        /// The full command line.
        command: String,
        /// Underlying error.
        source: std::io::Error,
    },

    /// A stage command exited unsuccessfully.
    #[error("`{command}` failed with {status}")]
    CommandFailed {
        /// The full command line.
        command: String,
        /// Exit status description.
        status: String,
    },
}
