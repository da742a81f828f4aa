use crate::settings::{Settings, SettingsStore};
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use tracing::{info, warn};

const KEY_INTERVAL: &str = "autoSyncInterval";
const KEY_USE_CUSTOM: &str = "useCustomDestination";
const KEY_CUSTOM_PATH: &str = "customDestinationPath";
const KEY_LAST_SYNC: &str = "lastSyncDate";
const KEY_NEXT_SYNC: &str = "nextScheduledSync";
const KEY_HISTORY: &str = "syncHistory";

/// SQLite backed key-value store for [`Settings`]. Every value is JSON.
#[derive(Clone)]
pub struct Storage {
    pool: SqlitePool,
}

impl Storage {
    pub async fn new(database_url: &str) -> Result<Self> {
        let in_memory = database_url.contains(":memory:");

        // Create the parent directory of the database file if needed
        if !in_memory {
            let path = database_url.strip_prefix("sqlite://").unwrap_or(database_url);
            if let Some(parent) = Path::new(path).parent() {
                if !parent.as_os_str().is_empty() {
                    tokio::fs::create_dir_all(parent).await?;
                }
            }
        }

        let options = SqliteConnectOptions::from_str(database_url)
            .with_context(|| format!("Invalid database URL: {}", database_url))?
            .create_if_missing(true);

        // Every in-memory connection is its own database
        let max_connections = if in_memory { 1 } else { 4 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;

        Ok(Self { pool })
    }

    pub async fn run_migrations(&self) -> Result<()> {
        info!("Running database migrations");

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS settings (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn load_values(&self) -> Result<HashMap<String, String>> {
        let rows = sqlx::query("SELECT key, value FROM settings")
            .fetch_all(&self.pool)
            .await?;

        Ok(rows
            .into_iter()
            .map(|row| (row.get::<String, _>("key"), row.get::<String, _>("value")))
            .collect())
    }
}

/// Missing or unreadable values load as the default.
fn decode<T: DeserializeOwned + Default>(values: &HashMap<String, String>, key: &str) -> T {
    match values.get(key) {
        Some(raw) => serde_json::from_str(raw).unwrap_or_else(|e| {
            warn!("Ignoring unreadable setting {}: {}", key, e);
            T::default()
        }),
        None => T::default(),
    }
}

fn encode<T: Serialize>(value: &T) -> Result<String> {
    Ok(serde_json::to_string(value)?)
}

#[async_trait]
impl SettingsStore for Storage {
    async fn load(&self) -> Result<Settings> {
        let values = self.load_values().await?;

        let mut settings = Settings::default();
        settings.auto_sync.interval = decode(&values, KEY_INTERVAL);
        settings.auto_sync.last_sync_date = decode(&values, KEY_LAST_SYNC);
        settings.auto_sync.next_scheduled_sync = decode(&values, KEY_NEXT_SYNC);
        settings.use_custom_destination = decode(&values, KEY_USE_CUSTOM);
        settings.custom_destination_path = decode(&values, KEY_CUSTOM_PATH);
        settings.history = decode(&values, KEY_HISTORY);

        info!(
            "Loaded settings: interval {:?}, {} history entries",
            settings.auto_sync.interval,
            settings.history.len()
        );
        Ok(settings)
    }

    async fn save(&self, settings: &Settings) -> Result<()> {
        let values = [
            (KEY_INTERVAL, encode(&settings.auto_sync.interval)?),
            (KEY_LAST_SYNC, encode(&settings.auto_sync.last_sync_date)?),
            (KEY_NEXT_SYNC, encode(&settings.auto_sync.next_scheduled_sync)?),
            (KEY_USE_CUSTOM, encode(&settings.use_custom_destination)?),
            (KEY_CUSTOM_PATH, encode(&settings.custom_destination_path)?),
            (KEY_HISTORY, encode(&settings.history)?),
        ];

        let mut tx = self.pool.begin().await?;
        for (key, value) in values {
            sqlx::query(
                r#"
                INSERT INTO settings (key, value, updated_at)
                VALUES (?1, ?2, CURRENT_TIMESTAMP)
                ON CONFLICT(key) DO UPDATE SET
                    value = excluded.value,
                    updated_at = CURRENT_TIMESTAMP
                "#,
            )
            .bind(key)
            .bind(value)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::AutoSyncInterval;
    use crate::sync::SyncRecord;
    use std::path::PathBuf;

    async fn open(dir: &tempfile::TempDir) -> Storage {
        let url = format!("sqlite://{}", dir.path().join("data").join("sync.db").display());
        let storage = Storage::new(&url).await.unwrap();
        storage.run_migrations().await.unwrap();
        storage
    }

    #[tokio::test]
    async fn test_empty_database_loads_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let storage = open(&dir).await;

        assert_eq!(storage.load().await.unwrap(), Settings::default());
    }

    #[tokio::test]
    async fn test_settings_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = Settings::default();
        settings.auto_sync.interval = AutoSyncInterval::Daily;
        settings.auto_sync.last_sync_date = Some(chrono::Utc::now());
        settings.use_custom_destination = true;
        settings.custom_destination_path = Some(PathBuf::from("/mnt/nas/photos"));
        settings.history.push(SyncRecord::succeeded(3));
        settings.history.push(SyncRecord::failed(1, "Pictures: disk full"));

        {
            let storage = open(&dir).await;
            storage.save(&settings).await.unwrap();
            // Saving twice updates in place
            storage.save(&settings).await.unwrap();
        }

        let storage = open(&dir).await;
        let loaded = storage.load().await.unwrap();
        assert_eq!(loaded, settings);
        assert_eq!(loaded.history.latest().unwrap().files_transferred, 1);
    }

    #[tokio::test]
    async fn test_corrupt_value_falls_back_to_default() {
        let dir = tempfile::tempdir().unwrap();
        let storage = open(&dir).await;
        sqlx::query("INSERT INTO settings (key, value) VALUES (?1, ?2)")
            .bind(KEY_INTERVAL)
            .bind("\"hourly\"")
            .execute(&storage.pool)
            .await
            .unwrap();

        let loaded = storage.load().await.unwrap();
        assert_eq!(loaded.auto_sync.interval, AutoSyncInterval::Never);
    }

    #[tokio::test]
    async fn test_in_memory_database() {
        let storage = Storage::new("sqlite::memory:").await.unwrap();
        storage.run_migrations().await.unwrap();

        let mut settings = Settings::default();
        settings.auto_sync.interval = AutoSyncInterval::OnNewPhotos;
        storage.save(&settings).await.unwrap();
        assert_eq!(storage.load().await.unwrap().auto_sync.interval, AutoSyncInterval::OnNewPhotos);
    }
}
