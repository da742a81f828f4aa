use super::SyncError;
use std::path::Path;
use tokio::fs;
use tracing::{debug, warn};

/// Lists the regular files directly inside `dir`, sorted by name.
///
/// Subdirectories are not descended into. Entries whose name starts with a
/// dot are ignored entirely: they are neither copied nor counted.
pub async fn scan_folder(dir: &Path) -> Result<Vec<String>, SyncError> {
    let unreadable = |source| SyncError::DirectoryUnreadable {
        path: dir.to_path_buf(),
        source,
    };

    let mut entries = fs::read_dir(dir).await.map_err(unreadable)?;
    let mut files = Vec::new();

    while let Some(entry) = entries.next_entry().await.map_err(unreadable)? {
        let name = match entry.file_name().into_string() {
            Ok(name) => name,
            Err(raw) => {
                warn!("Skipping {:?} in {}: name is not valid UTF-8", raw, dir.display());
                continue;
            }
        };

        if name.starts_with('.') {
            debug!("Skipping hidden entry: {}", name);
            continue;
        }

        // Follows symlinks; dangling links are skipped
        match fs::metadata(entry.path()).await {
            Ok(metadata) if metadata.is_file() => files.push(name),
            Ok(_) => {}
            Err(e) => debug!("Skipping {}: {}", name, e),
        }
    }

    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_lists_only_visible_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.jpg"), b"b").unwrap();
        std::fs::write(dir.path().join("a.jpg"), b"a").unwrap();
        std::fs::write(dir.path().join(".DS_Store"), b"x").unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();
        std::fs::write(dir.path().join("nested").join("c.jpg"), b"c").unwrap();

        let files = scan_folder(dir.path()).await.unwrap();
        assert_eq!(files, vec!["a.jpg".to_string(), "b.jpg".to_string()]);
    }

    #[tokio::test]
    async fn test_missing_directory_is_unreadable() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("gone");

        match scan_folder(&missing).await {
            Err(SyncError::DirectoryUnreadable { path, .. }) => assert_eq!(path, missing),
            other => panic!("expected DirectoryUnreadable, got {:?}", other),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_non_utf8_name_is_skipped() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.jpg"), b"a").unwrap();
        let raw = OsStr::from_bytes(b"caf\xe9.jpg");
        if std::fs::write(dir.path().join(raw), b"x").is_err() {
            // Filesystem rejects non UTF-8 names
            return;
        }

        let files = scan_folder(dir.path()).await.unwrap();
        assert_eq!(files, vec!["a.jpg".to_string()]);
    }

    #[tokio::test]
    async fn test_empty_directory() {
        let dir = tempfile::tempdir().unwrap();
        assert!(scan_folder(dir.path()).await.unwrap().is_empty());
    }
}
