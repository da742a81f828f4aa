use super::access::{AccessGrant, AccessHandle};
use super::worker::FolderSyncWorker;
use super::{SourceFolder, SourceRole, SyncError, SyncEvent, SyncRecord, SyncState, SyncStats, SyncStatus};
use crate::scheduler::SchedulerSignal;
use crate::settings::{AutoSyncConfig, AutoSyncInterval, Settings, SettingsStore, SharedSettings};
use crate::utils::config::Config;
use anyhow::Result;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, watch};
use tracing::{debug, error, info, warn};

/// Runs sync passes and owns the settings they read and update.
///
/// Cheap to clone; every clone drives the same state.
#[derive(Clone)]
pub struct SyncManager {
    config: Arc<Config>,
    settings: SharedSettings,
    store: Arc<dyn SettingsStore>,
    access: Arc<dyn AccessGrant>,
    status: Arc<RwLock<SyncStatus>>,
    running: Arc<AtomicBool>,
    event_tx: broadcast::Sender<SyncEvent>,
    schedule_tx: Arc<watch::Sender<AutoSyncConfig>>,
    // Held from snapshot to the end of the save so saves land in order
    save_lock: Arc<tokio::sync::Mutex<()>>,
}

/// Everything a run needs once its preconditions hold.
struct PreparedRun {
    root: PathBuf,
    folders: Vec<(SourceFolder, PathBuf)>,
    _access: Vec<AccessHandle>,
}

/// Clears the running flag when a run ends, however it ends.
struct RunGuard(Arc<AtomicBool>);

impl RunGuard {
    fn acquire(flag: &Arc<AtomicBool>) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag.clone()))
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl SyncManager {
    pub async fn new(
        config: Config,
        store: Arc<dyn SettingsStore>,
        access: Arc<dyn AccessGrant>,
    ) -> Result<Self> {
        let settings = store.load().await?;
        let (event_tx, _) = broadcast::channel(128);
        let (schedule_tx, _) = watch::channel(settings.auto_sync.clone());

        let status = SyncStatus {
            last_record: settings.history.latest().cloned(),
            ..SyncStatus::default()
        };

        Ok(Self {
            config: Arc::new(config),
            settings: Arc::new(RwLock::new(settings)),
            store,
            access,
            status: Arc::new(RwLock::new(status)),
            running: Arc::new(AtomicBool::new(false)),
            event_tx,
            schedule_tx: Arc::new(schedule_tx),
            save_lock: Arc::new(tokio::sync::Mutex::new(())),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<SyncEvent> {
        self.event_tx.subscribe()
    }

    /// Interval and last sync date, republished whenever either changes.
    pub fn subscribe_schedule(&self) -> watch::Receiver<AutoSyncConfig> {
        self.schedule_tx.subscribe()
    }

    pub fn status(&self) -> SyncStatus {
        self.status.read().clone()
    }

    pub fn settings(&self) -> Settings {
        self.settings.read().clone()
    }

    pub fn history(&self) -> Vec<SyncRecord> {
        self.settings.read().history.to_vec()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Starts a run in the background. Returns false when one is already in
    /// flight; the request is dropped, not queued.
    pub fn trigger(&self) -> bool {
        if self.is_running() {
            return false;
        }
        let manager = self.clone();
        tokio::spawn(async move {
            manager.run_sync().await;
        });
        true
    }

    /// Performs one sync run and records it. Returns `None` without doing
    /// anything if another run is in progress.
    pub async fn run_sync(&self) -> Option<SyncRecord> {
        let Some(_guard) = RunGuard::acquire(&self.running) else {
            info!("Sync already in progress, ignoring request");
            return None;
        };

        info!("Starting sync");
        let record = self.execute().await;
        self.finish(&record).await;
        Some(record)
    }

    async fn execute(&self) -> SyncRecord {
        let run = match self.prepare().await {
            Ok(run) => run,
            Err(e) => {
                error!("Sync cannot start: {}", e);
                return SyncRecord::failed(0, e.to_string());
            }
        };

        let roles: Vec<SourceRole> = run.folders.iter().map(|(folder, _)| folder.role).collect();
        let progress = {
            let mut status = self.status.write();
            status.state = SyncState::Syncing;
            status.progress = roles.iter().map(|role| (*role, SyncStats::default())).collect();
            status.status_text = Some("Syncing".to_string());
            status.progress.clone()
        };
        let _ = self.event_tx.send(SyncEvent::Started {
            folders: roles,
            destination: run.root.clone(),
            progress,
        });

        // Workers report through this channel so stats are only touched here
        let (progress_tx, mut progress_rx) = mpsc::unbounded_channel::<(SourceRole, SyncStats)>();
        let mut tasks = Vec::with_capacity(run.folders.len());

        for (folder, dest) in run.folders {
            let tx = progress_tx.clone();
            let role = folder.role;
            let worker = FolderSyncWorker::new(self.config.copy_delay);
            let handle = tokio::spawn(async move {
                worker
                    .sync(&folder.path, &dest, move |stats| {
                        let _ = tx.send((role, stats));
                    })
                    .await
            });
            tasks.push((role, handle));
        }
        drop(progress_tx);

        while let Some((role, stats)) = progress_rx.recv().await {
            debug!("{} progress: {}/{}", role, stats.files_copied, stats.total_files);
            let progress = {
                let mut status = self.status.write();
                status.progress.insert(role, stats);
                status.progress.clone()
            };
            let _ = self.event_tx.send(SyncEvent::Progress { progress });
        }

        let mut total = 0u64;
        let mut failures = Vec::new();
        for (role, handle) in tasks {
            match handle.await {
                Ok(Ok(copied)) => total += copied,
                Ok(Err(e)) => {
                    error!("{} sync failed: {}", role, e);
                    total += e.files_copied();
                    failures.push(format!("{}: {}", role, e));
                }
                Err(e) => {
                    error!("{} worker aborted: {}", role, e);
                    failures.push(format!("{}: worker aborted: {}", role, e));
                }
            }
        }

        if failures.is_empty() {
            SyncRecord::succeeded(total)
        } else {
            SyncRecord::failed(total, failures.join("; "))
        }
    }

    async fn prepare(&self) -> Result<PreparedRun, SyncError> {
        let mut sources = Vec::new();
        for folder in self.config.sources() {
            match tokio::fs::metadata(&folder.path).await {
                Ok(metadata) if metadata.is_dir() => sources.push(folder),
                _ => info!("{} folder not found at {}, skipping", folder.role, folder.path.display()),
            }
        }
        if sources.is_empty() {
            return Err(SyncError::NoSourceFolders);
        }

        let base = self
            .settings
            .read()
            .destination_base_path(&self.config.default_destination);

        let mut paths: Vec<PathBuf> = sources.iter().map(|folder| folder.path.clone()).collect();
        paths.push(base.clone());
        let access = self.access.ensure_access(&paths).await?;

        let root = base.join(&self.config.app_folder);
        tokio::fs::create_dir_all(&root)
            .await
            .map_err(|e| SyncError::DestinationUnavailable {
                path: root.clone(),
                source: e,
            })?;

        let folders = sources
            .into_iter()
            .map(|folder| {
                let dest = root.join(folder.role.folder_name());
                (folder, dest)
            })
            .collect();

        Ok(PreparedRun {
            root,
            folders,
            _access: access,
        })
    }

    async fn finish(&self, record: &SyncRecord) {
        {
            let mut settings = self.settings.write();
            settings.history.push(record.clone());
            if record.success {
                settings.auto_sync.last_sync_date = Some(record.date);
            }
        }
        if record.success {
            self.publish_schedule();
        }

        if let Err(e) = self.persist().await {
            error!("Failed to save sync history: {}", e);
        }

        {
            let mut status = self.status.write();
            status.state = SyncState::Idle;
            status.last_record = Some(record.clone());
            status.status_text = Some(record.summary());
        }

        let event = if record.success {
            SyncEvent::Completed {
                total_copied: record.files_transferred,
            }
        } else {
            SyncEvent::Failed {
                error_message: record.error_message.clone().unwrap_or_default(),
            }
        };
        let _ = self.event_tx.send(event);

        info!("{}", record.summary());
    }

    pub async fn set_auto_sync_interval(&self, interval: AutoSyncInterval) -> Result<()> {
        {
            let mut settings = self.settings.write();
            settings.auto_sync.interval = interval;
            if !interval.is_fixed() {
                settings.auto_sync.next_scheduled_sync = None;
            }
        }
        info!("Auto sync interval set to {:?}", interval);
        self.publish_schedule();
        self.persist().await
    }

    /// `None` reverts to the default destination.
    pub async fn set_custom_destination(&self, path: Option<PathBuf>) -> Result<()> {
        {
            let mut settings = self.settings.write();
            settings.use_custom_destination = path.is_some();
            if path.is_some() {
                settings.custom_destination_path = path;
            }
        }
        self.persist().await
    }

    pub async fn set_next_scheduled_sync(&self, next: Option<DateTime<Utc>>) -> Result<()> {
        {
            let mut settings = self.settings.write();
            if settings.auto_sync.next_scheduled_sync == next {
                return Ok(());
            }
            settings.auto_sync.next_scheduled_sync = next;
        }
        self.persist().await
    }

    pub async fn clear_history(&self) -> Result<()> {
        self.settings.write().history.clear();
        self.persist().await
    }

    /// Consumes scheduler signals until the scheduler goes away.
    pub async fn handle_signals(&self, mut signals: mpsc::Receiver<SchedulerSignal>) {
        while let Some(signal) = signals.recv().await {
            match signal {
                SchedulerSignal::Fire => {
                    if !self.trigger() {
                        info!("Scheduled sync skipped, a sync is already running");
                    }
                }
                SchedulerSignal::NextScheduled(next) => {
                    if let Err(e) = self.set_next_scheduled_sync(next).await {
                        warn!("Failed to save next scheduled sync: {}", e);
                    }
                }
            }
        }
        debug!("Scheduler signal channel closed");
    }

    fn publish_schedule(&self) {
        let auto_sync = self.settings.read().auto_sync.clone();
        self.schedule_tx.send_replace(auto_sync);
    }

    async fn persist(&self) -> Result<()> {
        let _saving = self.save_lock.lock().await;
        let snapshot = self.settings.read().clone();
        self.store.save(&snapshot).await
    }
}
