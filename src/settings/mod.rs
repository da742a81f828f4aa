use crate::sync::SyncHistory;
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Months, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum AutoSyncInterval {
    #[default]
    Never,
    OnNewPhotos,
    Every6h,
    Daily,
    Weekly,
    Monthly,
}

impl AutoSyncInterval {
    /// When a fixed-interval sync following one at `from` is due.
    /// `None` for intervals that are not time based.
    pub fn next_after(&self, from: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            AutoSyncInterval::Never | AutoSyncInterval::OnNewPhotos => None,
            AutoSyncInterval::Every6h => Some(from + Duration::hours(6)),
            AutoSyncInterval::Daily => Some(from + Duration::days(1)),
            AutoSyncInterval::Weekly => Some(from + Duration::weeks(1)),
            AutoSyncInterval::Monthly => from.checked_add_months(Months::new(1)),
        }
    }

    pub fn is_fixed(&self) -> bool {
        !matches!(self, AutoSyncInterval::Never | AutoSyncInterval::OnNewPhotos)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AutoSyncConfig {
    pub interval: AutoSyncInterval,
    pub last_sync_date: Option<DateTime<Utc>>,
    pub next_scheduled_sync: Option<DateTime<Utc>>,
}

/// User settings persisted across restarts.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    pub auto_sync: AutoSyncConfig,
    pub use_custom_destination: bool,
    pub custom_destination_path: Option<PathBuf>,
    pub history: SyncHistory,
}

impl Settings {
    pub fn has_custom_destination(&self) -> bool {
        self.use_custom_destination && self.custom_destination_path.is_some()
    }

    /// Destination root for the next run.
    pub fn destination_base_path(&self, default: &Path) -> PathBuf {
        match &self.custom_destination_path {
            Some(path) if self.use_custom_destination => path.clone(),
            _ => default.to_path_buf(),
        }
    }
}

pub type SharedSettings = Arc<parking_lot::RwLock<Settings>>;

/// Persistence port for [`Settings`].
#[async_trait]
pub trait SettingsStore: Send + Sync {
    async fn load(&self) -> Result<Settings>;
    async fn save(&self, settings: &Settings) -> Result<()>;
}

/// Keeps settings in memory only; used for tests and throwaway runs.
#[derive(Default)]
pub struct MemoryStore {
    saved: Mutex<Option<Settings>>,
    saves: Mutex<usize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_settings(settings: Settings) -> Self {
        Self {
            saved: Mutex::new(Some(settings)),
            saves: Mutex::new(0),
        }
    }

    pub fn saved(&self) -> Option<Settings> {
        self.saved.lock().clone()
    }

    pub fn save_count(&self) -> usize {
        *self.saves.lock()
    }
}

#[async_trait]
impl SettingsStore for MemoryStore {
    async fn load(&self) -> Result<Settings> {
        Ok(self.saved.lock().clone().unwrap_or_default())
    }

    async fn save(&self, settings: &Settings) -> Result<()> {
        *self.saved.lock() = Some(settings.clone());
        *self.saves.lock() += 1;
        Ok(())
    }
}
