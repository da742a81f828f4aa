use super::scanner::scan_folder;
use super::SyncError;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::fs;

/// Files of one source folder that still need to reach the destination.
///
/// Dedup is by file name only: a same-named file at the destination counts
/// as synced, whatever its content. Every run re-checks each source file
/// against the destination.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CopyPlan {
    pub source_folder: PathBuf,
    pub dest_folder: PathBuf,
    pub total_files: u64,
    pub files_to_copy: Vec<String>,
}

impl CopyPlan {
    pub async fn build(source_folder: &Path, dest_folder: &Path) -> Result<Self, SyncError> {
        let source_files = scan_folder(source_folder).await?;
        let total_files = source_files.len() as u64;

        let mut files_to_copy = Vec::new();
        for name in source_files {
            // An error while probing is treated as absent; the copy will report it
            let present = fs::try_exists(dest_folder.join(&name)).await.unwrap_or(false);
            if !present {
                files_to_copy.push(name);
            }
        }

        Ok(Self {
            source_folder: source_folder.to_path_buf(),
            dest_folder: dest_folder.to_path_buf(),
            total_files,
            files_to_copy,
        })
    }

    pub fn already_present(&self) -> u64 {
        self.total_files - self.files_to_copy.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.files_to_copy.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_plan_skips_files_present_at_destination() {
        let source = tempfile::tempdir().unwrap();
        let dest = tempfile::tempdir().unwrap();
        std::fs::write(source.path().join("a.jpg"), b"a").unwrap();
        std::fs::write(source.path().join("b.jpg"), b"b").unwrap();
        std::fs::write(dest.path().join("a.jpg"), b"different content").unwrap();

        let plan = CopyPlan::build(source.path(), dest.path()).await.unwrap();
        assert_eq!(plan.total_files, 2);
        assert_eq!(plan.files_to_copy, vec!["b.jpg".to_string()]);
        assert_eq!(plan.already_present(), 1);
        assert!(!plan.is_empty());
    }

    #[tokio::test]
    async fn test_plan_against_missing_destination_copies_everything() {
        let source = tempfile::tempdir().unwrap();
        std::fs::write(source.path().join("a.jpg"), b"a").unwrap();
        let dest = source.path().join("not-there");

        let plan = CopyPlan::build(source.path(), &dest).await.unwrap();
        assert_eq!(plan.files_to_copy, vec!["a.jpg".to_string()]);
        assert_eq!(plan.already_present(), 0);
    }
}
