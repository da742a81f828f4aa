use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Permission denied for: {}", display_paths(.paths))]
    PermissionDenied { paths: Vec<PathBuf> },

    #[error("No source folders found")]
    NoSourceFolders,

    #[error("Cannot read directory {}: {source}", .path.display())]
    DirectoryUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot create destination {}: {source}", .path.display())]
    DestinationUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to copy {file}: {source}")]
    CopyFailed {
        file: String,
        /// Files this worker copied before the failure.
        copied: u64,
        #[source]
        source: std::io::Error,
    },
}

impl SyncError {
    /// Files newly copied before the error occurred.
    pub fn files_copied(&self) -> u64 {
        match self {
            SyncError::CopyFailed { copied, .. } => *copied,
            _ => 0,
        }
    }
}

fn display_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
