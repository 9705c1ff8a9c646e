// ABOUTME: Error types for writing rendered artifacts
// ABOUTME: Defines specific error types for atomic file writes and asset copies

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum OutputError {
    #[error("Failed to write {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to move rendered file into place at {}: {source}", path.display())]
    Persist {
        path: PathBuf,
        #[source]
        source: tempfile::PersistError,
    },
}

pub type Result<T> = std::result::Result<T, OutputError>;
