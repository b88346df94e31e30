use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Failure reported by a [`crate::fs::FileSystem`] implementation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FsError {
    #[error("File not found: {}", .0.display())]
    NotFound(PathBuf),
    #[error("Permission denied: {}", .0.display())]
    PermissionDenied(PathBuf),
    #[error("I/O error on {}: {message}", path.display())]
    Io { path: PathBuf, message: String },
}

impl FsError {
    /// Classify an `io::Error` for `path`. Invalid UTF-8 and every other
    /// kind that is not a missing file or a permission problem collapse
    /// into [`FsError::Io`].
    pub fn from_io(path: &Path, err: &io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => FsError::NotFound(path.to_path_buf()),
            io::ErrorKind::PermissionDenied => FsError::PermissionDenied(path.to_path_buf()),
            _ => FsError::Io {
                path: path.to_path_buf(),
                message: err.to_string(),
            },
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, FsError::NotFound(_))
    }
}

/// Failure of an open/save/save-as style operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FileOpError {
    #[error(transparent)]
    Fs(#[from] FsError),
    /// The user dismissed the save or open dialog.
    #[error("Operation cancelled by user")]
    Cancelled,
}

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("Failed to access settings file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Failed to encode settings: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Cannot determine the user configuration directory")]
    NoConfigDir,
}
