pub mod watcher;

pub use watcher::{FolderWatcher, NotifyWatcher, WatchSubscription};

use crate::settings::{AutoSyncConfig, AutoSyncInterval};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum SchedulerState {
    Idle,
    #[serde(rename_all = "camelCase")]
    Waiting { next_fire: DateTime<Utc> },
    Monitoring { paths: Vec<PathBuf> },
}

#[derive(Debug, Clone, PartialEq)]
pub enum SchedulerSignal {
    /// A sync should run now.
    Fire,
    /// When the next time-based sync will fire, if any.
    NextScheduled(Option<DateTime<Utc>>),
}

pub type SharedSchedulerState = Arc<RwLock<SchedulerState>>;

/// Wall-clock source for scheduled fire times.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Longest single timer sleep. The monotonic timer stops while the host is
/// suspended, so the wall clock is rechecked at least this often.
const WALL_CLOCK_CHECK: Duration = Duration::from_secs(60);

/// How long to sleep until `next`; overdue fires wait `grace` instead of
/// firing immediately.
pub fn fire_delay(next: DateTime<Utc>, now: DateTime<Utc>, grace: Duration) -> Duration {
    (next - now)
        .to_std()
        .ok()
        .filter(|delay| !delay.is_zero())
        .unwrap_or(grace)
}

/// Decides when automatic syncs happen.
///
/// Follows the [`AutoSyncConfig`] published on a watch channel. Switching the
/// interval tears down the current timer or folder watch before the next one
/// is set up, so only one mechanism is ever active.
pub struct Scheduler {
    config_rx: watch::Receiver<AutoSyncConfig>,
    signals: mpsc::Sender<SchedulerSignal>,
    watcher: Arc<dyn FolderWatcher>,
    sources: Vec<PathBuf>,
    debounce: Duration,
    grace: Duration,
    clock: Clock,
    state: SharedSchedulerState,
}

impl Scheduler {
    pub fn new(
        config_rx: watch::Receiver<AutoSyncConfig>,
        signals: mpsc::Sender<SchedulerSignal>,
        watcher: Arc<dyn FolderWatcher>,
        sources: Vec<PathBuf>,
        debounce: Duration,
        grace: Duration,
    ) -> Self {
        Self {
            config_rx,
            signals,
            watcher,
            sources,
            debounce,
            grace,
            clock: Arc::new(Utc::now),
            state: Arc::new(RwLock::new(SchedulerState::Idle)),
        }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn state(&self) -> SharedSchedulerState {
        self.state.clone()
    }

    /// Runs until the config channel or the signal receiver goes away.
    pub async fn run(mut self) {
        loop {
            let auto_sync = self.config_rx.borrow_and_update().clone();
            debug!("Scheduler applying interval {:?}", auto_sync.interval);

            let keep_going = match auto_sync.interval {
                AutoSyncInterval::Never => self.idle().await,
                AutoSyncInterval::OnNewPhotos => self.monitor().await,
                _ => self.wait_interval(&auto_sync).await,
            };
            if !keep_going {
                break;
            }
        }

        self.set_state(SchedulerState::Idle);
        info!("Scheduler stopped");
    }

    async fn idle(&mut self) -> bool {
        self.set_state(SchedulerState::Idle);
        if !self.send(SchedulerSignal::NextScheduled(None)).await {
            return false;
        }
        self.config_rx.changed().await.is_ok()
    }

    async fn wait_interval(&mut self, auto_sync: &AutoSyncConfig) -> bool {
        let interval = auto_sync.interval;
        let base = auto_sync.last_sync_date.unwrap_or_else(|| self.now());
        let Some(mut next) = interval.next_after(base) else {
            return self.idle().await;
        };

        'schedule: loop {
            let now = self.now();
            let delay = fire_delay(next, now, self.grace);
            let fire_at = now + chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::zero());

            self.set_state(SchedulerState::Waiting { next_fire: fire_at });
            if !self.send(SchedulerSignal::NextScheduled(Some(fire_at))).await {
                return false;
            }
            info!("Next {:?} sync at {}", interval, fire_at);

            let deadline = Instant::now() + delay;
            loop {
                let wake = deadline.min(Instant::now() + WALL_CLOCK_CHECK);
                tokio::select! {
                    changed = self.config_rx.changed() => return changed.is_ok(),
                    _ = tokio::time::sleep_until(wake) => {}
                }

                if Instant::now() >= deadline {
                    break;
                }
                if self.now() >= fire_at {
                    // Host was suspended past the fire time; treat as overdue
                    info!("Missed {:?} sync at {} while suspended", interval, fire_at);
                    continue 'schedule;
                }
            }

            info!("Scheduled sync due");
            if !self.send(SchedulerSignal::Fire).await {
                return false;
            }
            next = match interval.next_after(self.now()) {
                Some(next) => next,
                None => return true,
            };
        }
    }

    async fn monitor(&mut self) -> bool {
        let paths: Vec<PathBuf> = self.sources.iter().filter(|p| p.is_dir()).cloned().collect();
        if paths.is_empty() {
            warn!("No source folders to watch");
            return self.idle().await;
        }

        let mut subscription = match self.watcher.watch(&paths) {
            Ok(subscription) => subscription,
            Err(e) => {
                warn!("Cannot watch source folders: {:#}", e);
                return self.idle().await;
            }
        };

        self.set_state(SchedulerState::Monitoring { paths });
        if !self.send(SchedulerSignal::NextScheduled(None)).await {
            return false;
        }

        loop {
            tokio::select! {
                changed = self.config_rx.changed() => {
                    if changed.is_err() {
                        return false;
                    }
                    // A new last sync date keeps the same watch
                    let interval = self.config_rx.borrow_and_update().interval;
                    if interval != AutoSyncInterval::OnNewPhotos {
                        return true;
                    }
                }
                settled = subscription.next_settled(self.debounce) => match settled {
                    Some(path) => {
                        info!("New photos detected ({}), syncing", path.display());
                        if !self.send(SchedulerSignal::Fire).await {
                            return false;
                        }
                    }
                    None => {
                        warn!("Folder watch ended");
                        drop(subscription);
                        return self.idle().await;
                    }
                },
            }
        }
    }

    fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }

    fn set_state(&self, state: SchedulerState) {
        *self.state.write() = state;
    }

    async fn send(&self, signal: SchedulerSignal) -> bool {
        self.signals.send(signal).await.is_ok()
    }
}
