//! Error types for the phrasebook command line.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while running a command.
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Phrasebook(#[from] phrasebook_core::Error),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Failed to read config {path}: {source}")]
    Config {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CliError {
    /// Process exit status for this error
    ///
    /// 2 for bad input, 3 when an operation stopped halfway, 1 otherwise.
    pub fn exit_code(&self) -> i32 {
        use phrasebook_core::Error as Core;
        match self {
            CliError::InvalidArgument(_) => 2,
            CliError::Phrasebook(e) if e.is_partial() => 3,
            CliError::Phrasebook(
                Core::PhraseNotFound { .. }
                | Core::NoReverseRelation { .. }
                | Core::InvalidKey(_)
                | Core::InvalidProject(_)
                | Core::ProtectedProject,
            ) => 2,
            _ => 1,
        }
    }
}

/// Result type alias for command execution.
pub type CliResult<T> = Result<T, CliError>;
