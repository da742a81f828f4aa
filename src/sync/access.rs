use super::SyncError;
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Proof that access to a path was granted for the duration of a run.
/// Platforms with scoped access tokens release them when this is dropped.
#[derive(Debug)]
pub struct AccessHandle {
    path: PathBuf,
}

impl AccessHandle {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for AccessHandle {
    fn drop(&mut self) {
        debug!("Released access to {}", self.path.display());
    }
}

/// Grants access to the directories a run touches.
#[async_trait]
pub trait AccessGrant: Send + Sync {
    async fn acquire(&self, path: &Path) -> Result<AccessHandle, SyncError>;

    /// Acquires every path, reporting all refused paths together.
    async fn ensure_access(&self, paths: &[PathBuf]) -> Result<Vec<AccessHandle>, SyncError> {
        let mut handles = Vec::with_capacity(paths.len());
        let mut denied = Vec::new();

        for path in paths {
            match self.acquire(path).await {
                Ok(handle) => handles.push(handle),
                Err(SyncError::PermissionDenied { paths }) => denied.extend(paths),
                Err(e) => return Err(e),
            }
        }

        if denied.is_empty() {
            Ok(handles)
        } else {
            Err(SyncError::PermissionDenied { paths: denied })
        }
    }
}

/// Plain filesystem permissions: a path is refused only when the OS says so.
/// Missing paths are granted; later stages report them.
pub struct LocalAccess;

#[async_trait]
impl AccessGrant for LocalAccess {
    async fn acquire(&self, path: &Path) -> Result<AccessHandle, SyncError> {
        let denied = || SyncError::PermissionDenied {
            paths: vec![path.to_path_buf()],
        };

        match tokio::fs::metadata(path).await {
            Ok(metadata) if metadata.is_dir() => match tokio::fs::read_dir(path).await {
                Err(e) if e.kind() == ErrorKind::PermissionDenied => return Err(denied()),
                _ => {}
            },
            Err(e) if e.kind() == ErrorKind::PermissionDenied => return Err(denied()),
            _ => {}
        }

        Ok(AccessHandle::new(path))
    }
}
