//! Error taxonomy for packaging runs.

use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PackError {
    /// A listed source directory is missing or is not a directory
    #[error("Source directory not found: {path}")]
    SourceNotFound { path: PathBuf },

    /// The staging root to archive is missing or is not a directory
    #[error("Staging directory not found: {path}")]
    StagingNotFound { path: PathBuf },

    #[error("Permission denied for '{path}': {source}")]
    Permission { path: PathBuf, source: io::Error },

    #[error("IO error for '{path}': {source}")]
    Io { path: PathBuf, source: io::Error },

    /// Zip writer failure
    #[error("Failed to write archive '{path}': {error}")]
    Archive { path: PathBuf, error: String },

    #[error("Invalid library name '{name}': must be non-empty and contain no path separators")]
    InvalidName { name: String },

    #[error("Invalid entry '{entry}': {reason}")]
    InvalidEntry { entry: String, reason: String },

    #[error("Invalid skip pattern '{pattern}': {error}")]
    InvalidPattern { pattern: String, error: String },

    #[error("Failed to load config '{path}': {error}")]
    Config { path: PathBuf, error: String },
}

impl PackError {
    /// Classifies an IO failure on `path` by its kind.
    pub fn io(path: &Path, source: io::Error) -> Self {
        let path = path.to_path_buf();
        match source.kind() {
            io::ErrorKind::PermissionDenied => PackError::Permission { path, source },
            _ => PackError::Io { path, source },
        }
    }

    /// Like [`PackError::io`], but a missing path is reported as a missing source.
    pub fn source_io(path: &Path, source: io::Error) -> Self {
        if source.kind() == io::ErrorKind::NotFound {
            PackError::SourceNotFound {
                path: path.to_path_buf(),
            }
        } else {
            Self::io(path, source)
        }
    }

    pub fn exit_code(&self) -> i32 {
        match self {
            PackError::InvalidName { .. }
            | PackError::InvalidEntry { .. }
            | PackError::InvalidPattern { .. }
            | PackError::Config { .. } => 2,
            PackError::SourceNotFound { .. } | PackError::StagingNotFound { .. } => 3,
            PackError::Permission { .. } => 4,
            PackError::Io { .. } | PackError::Archive { .. } => 5,
        }
    }
}

pub type PackResult<T> = std::result::Result<T, PackError>;
