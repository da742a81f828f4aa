use super::planner::CopyPlan;
use super::{SyncError, SyncStats};
use std::io::ErrorKind;
use std::path::Path;
use std::time::Duration;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

/// Mirrors one source folder into one destination folder.
pub struct FolderSyncWorker {
    copy_delay: Duration,
}

impl FolderSyncWorker {
    pub fn new(copy_delay: Duration) -> Self {
        Self { copy_delay }
    }

    /// Copies every file of `source` missing from `dest` and returns how many
    /// were newly copied.
    ///
    /// `on_progress` is called once with the already-present count before any
    /// copy starts, then after every file. Stops at the first copy error.
    pub async fn sync<F>(&self, source: &Path, dest: &Path, mut on_progress: F) -> Result<u64, SyncError>
    where
        F: FnMut(SyncStats) + Send,
    {
        fs::create_dir_all(dest)
            .await
            .map_err(|e| SyncError::DestinationUnavailable {
                path: dest.to_path_buf(),
                source: e,
            })?;

        let plan = CopyPlan::build(source, dest).await?;
        info!(
            "Planning {}: {} files, {} to copy",
            source.display(),
            plan.total_files,
            plan.files_to_copy.len()
        );

        let mut stats = SyncStats {
            files_copied: plan.already_present(),
            total_files: plan.total_files,
        };
        on_progress(stats);

        if plan.is_empty() {
            return Ok(0);
        }

        let mut copied = 0u64;
        for name in &plan.files_to_copy {
            match copy_new_file(&source.join(name), &dest.join(name)).await {
                Ok(true) => {
                    copied += 1;
                    debug!("Copied {}", name);
                }
                Ok(false) => debug!("{} appeared at destination, skipping", name),
                Err(e) => {
                    warn!("Failed to copy {}: {}", name, e);
                    return Err(SyncError::CopyFailed {
                        file: name.clone(),
                        copied,
                        source: e,
                    });
                }
            }

            stats.files_copied += 1;
            on_progress(stats);

            if !self.copy_delay.is_zero() {
                tokio::time::sleep(self.copy_delay).await;
            }
        }

        info!("Copied {} new files into {}", copied, dest.display());
        Ok(copied)
    }
}

/// Copies `from` to `to` without ever replacing an existing file.
/// Returns `Ok(false)` when `to` already exists. A partially written
/// destination is removed so the next run retries it.
async fn copy_new_file(from: &Path, to: &Path) -> std::io::Result<bool> {
    let mut reader = File::open(from).await?;

    let mut writer = match OpenOptions::new().write(true).create_new(true).open(to).await {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::AlreadyExists => return Ok(false),
        Err(e) => return Err(e),
    };

    let result = async {
        tokio::io::copy(&mut reader, &mut writer).await?;
        writer.flush().await?;
        writer.sync_all().await
    }
    .await;

    if let Err(e) = result {
        drop(writer);
        if let Err(remove_err) = fs::remove_file(to).await {
            warn!("Could not remove partial file {}: {}", to.display(), remove_err);
        }
        return Err(e);
    }

    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &Path, name: &str) {
        std::fs::write(dir.join(name), name.as_bytes()).unwrap();
    }

    #[tokio::test]
    async fn test_copies_only_missing_files() {
        let source = tempfile::tempdir().unwrap();
        let dest_root = tempfile::tempdir().unwrap();
        let dest = dest_root.path().join("Originals");
        std::fs::create_dir(&dest).unwrap();
        write(source.path(), "a.jpg");
        write(source.path(), "b.jpg");
        std::fs::write(dest.join("a.jpg"), b"keep me").unwrap();

        let mut events = Vec::new();
        let copied = FolderSyncWorker::new(Duration::ZERO)
            .sync(source.path(), &dest, |stats| events.push(stats))
            .await
            .unwrap();

        assert_eq!(copied, 1);
        assert_eq!(
            events,
            vec![
                SyncStats { files_copied: 1, total_files: 2 },
                SyncStats { files_copied: 2, total_files: 2 },
            ]
        );
        assert_eq!(std::fs::read(dest.join("b.jpg")).unwrap(), b"b.jpg");
        // Existing destination files are never overwritten
        assert_eq!(std::fs::read(dest.join("a.jpg")).unwrap(), b"keep me");
    }

    #[tokio::test]
    async fn test_progress_is_monotonic_and_bounded() {
        let source = tempfile::tempdir().unwrap();
        let dest = tempfile::tempdir().unwrap();
        for i in 0..5 {
            write(source.path(), &format!("img_{i}.jpg"));
        }

        let mut events = Vec::new();
        let copied = FolderSyncWorker::new(Duration::from_millis(1))
            .sync(source.path(), dest.path(), |stats| events.push(stats))
            .await
            .unwrap();

        assert_eq!(copied, 5);
        assert_eq!(events.len(), 6);
        assert_eq!(events[0], SyncStats { files_copied: 0, total_files: 5 });
        for pair in events.windows(2) {
            assert!(pair[1].files_copied > pair[0].files_copied);
        }
        assert!(events.iter().all(|s| s.files_copied <= s.total_files));
        assert!(events.last().unwrap().is_complete());
    }

    #[tokio::test]
    async fn test_nothing_to_copy_is_success() {
        let source = tempfile::tempdir().unwrap();
        let dest = tempfile::tempdir().unwrap();
        write(source.path(), "a.jpg");
        write(dest.path(), "a.jpg");

        let mut events = Vec::new();
        let copied = FolderSyncWorker::new(Duration::ZERO)
            .sync(source.path(), dest.path(), |stats| events.push(stats))
            .await
            .unwrap();

        assert_eq!(copied, 0);
        assert_eq!(events, vec![SyncStats { files_copied: 1, total_files: 1 }]);
    }

    #[tokio::test]
    async fn test_creates_missing_destination() {
        let source = tempfile::tempdir().unwrap();
        let dest_root = tempfile::tempdir().unwrap();
        let dest = dest_root.path().join("PhotoSync").join("Pictures");
        write(source.path(), "edit.png");

        let copied = FolderSyncWorker::new(Duration::ZERO)
            .sync(source.path(), &dest, |_| {})
            .await
            .unwrap();

        assert_eq!(copied, 1);
        assert!(dest.join("edit.png").is_file());
    }

    #[tokio::test]
    async fn test_copy_failure_reports_partial_count() {
        let source = tempfile::tempdir().unwrap();
        let dest = tempfile::tempdir().unwrap();
        write(source.path(), "a.jpg");
        write(source.path(), "b.jpg");
        write(source.path(), "c.jpg");

        // Remove b.jpg once copying has started so its open fails
        let doomed = source.path().join("b.jpg");
        let mut calls = 0;
        let result = FolderSyncWorker::new(Duration::ZERO)
            .sync(source.path(), dest.path(), |_| {
                calls += 1;
                if calls == 2 {
                    std::fs::remove_file(&doomed).unwrap();
                }
            })
            .await;

        match result {
            Err(SyncError::CopyFailed { file, copied, .. }) => {
                assert_eq!(file, "b.jpg");
                assert_eq!(copied, 1);
            }
            other => panic!("expected CopyFailed, got {:?}", other),
        }
        assert!(dest.path().join("a.jpg").exists());
        assert!(!dest.path().join("b.jpg").exists());
        assert!(!dest.path().join("c.jpg").exists());
    }

    #[tokio::test]
    async fn test_unreadable_source() {
        let dest = tempfile::tempdir().unwrap();
        let missing = dest.path().join("missing-source");

        let result = FolderSyncWorker::new(Duration::ZERO)
            .sync(&missing, &dest.path().join("out"), |_| {})
            .await;
        assert!(matches!(result, Err(SyncError::DirectoryUnreadable { .. })));
    }
}
