pub mod access;
pub mod error;
pub mod history;
pub mod manager;
pub mod planner;
pub mod scanner;
pub mod worker;

pub use access::{AccessGrant, AccessHandle, LocalAccess};
pub use error::SyncError;
pub use history::SyncHistory;
pub use manager::SyncManager;
pub use worker::FolderSyncWorker;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Which of the two mirrored inputs a source folder is.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum SourceRole {
    Originals,
    Pictures,
}

impl SourceRole {
    /// Subfolder name used under `<destination root>/<app folder>/`.
    pub fn folder_name(&self) -> &'static str {
        match self {
            SourceRole::Originals => "Originals",
            SourceRole::Pictures => "Pictures",
        }
    }
}

impl std::fmt::Display for SourceRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.folder_name())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SourceFolder {
    pub path: PathBuf,
    pub role: SourceRole,
}

impl SourceFolder {
    pub fn new(path: impl Into<PathBuf>, role: SourceRole) -> Self {
        Self { path: path.into(), role }
    }
}

/// Per-folder progress counter. `files_copied` includes files that were
/// already present at the destination, so it always lines up with
/// `total_files`.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SyncStats {
    pub files_copied: u64,
    pub total_files: u64,
}

impl SyncStats {
    pub fn is_complete(&self) -> bool {
        self.files_copied >= self.total_files
    }
}

/// Progress of every folder taking part in the current run.
pub type SyncProgress = BTreeMap<SourceRole, SyncStats>;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SyncRecord {
    pub id: uuid::Uuid,
    pub date: DateTime<Utc>,
    pub files_transferred: u64,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl SyncRecord {
    pub fn succeeded(files_transferred: u64) -> Self {
        Self {
            id: uuid::Uuid::new_v4(),
            date: Utc::now(),
            files_transferred,
            success: true,
            error_message: None,
        }
    }

    pub fn failed(files_transferred: u64, message: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4(),
            date: Utc::now(),
            files_transferred,
            success: false,
            error_message: Some(message.into()),
        }
    }

    /// Human readable status line. "No new files" is a success, never a failure.
    pub fn summary(&self) -> String {
        match (self.success, self.files_transferred) {
            (true, 0) => "Sync completed, no new files".to_string(),
            (true, 1) => "Synced 1 file".to_string(),
            (true, n) => format!("Synced {} files", n),
            (false, _) => format!(
                "Sync failed: {}",
                self.error_message.as_deref().unwrap_or("unknown error")
            ),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum SyncState {
    Idle,
    Syncing,
}

/// Live status published to the control surface.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    pub state: SyncState,
    pub progress: SyncProgress,
    pub last_record: Option<SyncRecord>,
    pub status_text: Option<String>,
}

impl Default for SyncStatus {
    fn default() -> Self {
        Self {
            state: SyncState::Idle,
            progress: SyncProgress::new(),
            last_record: None,
            status_text: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SyncEvent {
    #[serde(rename_all = "camelCase")]
    Started {
        folders: Vec<SourceRole>,
        destination: PathBuf,
        /// Per-folder stats, all zero until each worker has planned.
        progress: SyncProgress,
    },
    Progress { progress: SyncProgress },
    #[serde(rename_all = "camelCase")]
    Completed { total_copied: u64 },
    #[serde(rename_all = "camelCase")]
    Failed { error_message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_distinguishes_empty_from_failed() {
        assert_eq!(SyncRecord::succeeded(0).summary(), "Sync completed, no new files");
        assert_eq!(SyncRecord::succeeded(3).summary(), "Synced 3 files");
        let failed = SyncRecord::failed(0, "Originals: disk full");
        assert_eq!(failed.summary(), "Sync failed: Originals: disk full");
    }

    #[test]
    fn test_event_serialization_is_tagged() {
        let event = SyncEvent::Completed { total_copied: 4 };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "completed");
        assert_eq!(json["totalCopied"], 4);

        let mut progress = SyncProgress::new();
        progress.insert(SourceRole::Originals, SyncStats { files_copied: 1, total_files: 2 });
        let json = serde_json::to_value(SyncEvent::Progress { progress }).unwrap();
        assert_eq!(json["progress"]["originals"]["totalFiles"], 2);
    }
}
