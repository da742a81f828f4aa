use crate::sync::{SourceFolder, SourceRole};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Server port
    pub port: u16,

    /// Database URL
    pub database_url: String,

    /// Folder holding the original, unedited photos
    pub originals_dir: PathBuf,

    /// Folder holding edited pictures
    pub pictures_dir: PathBuf,

    /// Destination root used when no custom destination is configured
    pub default_destination: PathBuf,

    /// Top-level folder created under the destination root
    pub app_folder: String,

    /// Pause between copied files
    #[serde(with = "duration_str")]
    pub copy_delay: Duration,

    /// Quiet period after the last filesystem event before syncing
    #[serde(with = "duration_str")]
    pub watch_debounce: Duration,

    /// Delay before firing a scheduled sync that is already overdue
    #[serde(with = "duration_str")]
    pub overdue_grace: Duration,
}

impl Default for Config {
    fn default() -> Self {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("/home"));
        let pictures = dirs::picture_dir().unwrap_or_else(|| home.join("Pictures"));

        Self {
            port: 8890,
            database_url: "sqlite://photo_sync.db".to_string(),
            originals_dir: pictures.join("Originals"),
            pictures_dir: pictures.join("Edited"),
            // iCloud Drive
            default_destination: home
                .join("Library")
                .join("Mobile Documents")
                .join("com~apple~CloudDocs"),
            app_folder: "PhotoSync".to_string(),
            copy_delay: Duration::from_millis(50),
            watch_debounce: Duration::from_secs(2),
            overdue_grace: Duration::from_secs(5),
        }
    }
}

impl Config {
    /// Load config from environment
    pub fn load() -> Result<Self> {
        let mut config = Config::default();

        if let Ok(port) = std::env::var("PHOTO_SYNC_PORT") {
            config.port = port.parse().context("PHOTO_SYNC_PORT")?;
        }

        if let Ok(db_url) = std::env::var("DATABASE_URL") {
            config.database_url = db_url;
        }

        if let Ok(dir) = std::env::var("PHOTO_SYNC_ORIGINALS") {
            config.originals_dir = PathBuf::from(dir);
        }

        if let Ok(dir) = std::env::var("PHOTO_SYNC_PICTURES") {
            config.pictures_dir = PathBuf::from(dir);
        }

        if let Ok(dest) = std::env::var("PHOTO_SYNC_DEST") {
            config.default_destination = PathBuf::from(dest);
        }

        if let Ok(folder) = std::env::var("PHOTO_SYNC_APP_FOLDER") {
            config.app_folder = folder;
        }

        if let Ok(delay) = std::env::var("PHOTO_SYNC_COPY_DELAY") {
            config.copy_delay = humantime::parse_duration(&delay).context("PHOTO_SYNC_COPY_DELAY")?;
        }

        if let Ok(debounce) = std::env::var("PHOTO_SYNC_WATCH_DEBOUNCE") {
            config.watch_debounce =
                humantime::parse_duration(&debounce).context("PHOTO_SYNC_WATCH_DEBOUNCE")?;
        }

        if let Ok(grace) = std::env::var("PHOTO_SYNC_OVERDUE_GRACE") {
            config.overdue_grace =
                humantime::parse_duration(&grace).context("PHOTO_SYNC_OVERDUE_GRACE")?;
        }

        Ok(config)
    }

    pub fn sources(&self) -> Vec<SourceFolder> {
        vec![
            SourceFolder::new(&self.originals_dir, SourceRole::Originals),
            SourceFolder::new(&self.pictures_dir, SourceRole::Pictures),
        ]
    }
}

pub fn load_config() -> Result<Config> {
    Config::load()
}

/// Serializes durations as humantime strings ("50ms", "2s").
mod duration_str {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&humantime::format_duration(*value).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(deserializer)?;
        humantime::parse_duration(&raw).map_err(D::Error::custom)
    }
}
