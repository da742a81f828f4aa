use axum::{
    extract::State,
    response::Json,
    routing::{get, post, put},
    Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::path::PathBuf;
use tracing::info;

use crate::scheduler::{SchedulerState, SharedSchedulerState};
use crate::settings::AutoSyncInterval;
use crate::sync::{SyncManager, SyncRecord, SyncStatus};

/// Shared state of every HTTP and WebSocket handler.
#[derive(Clone)]
pub struct AppState {
    pub manager: SyncManager,
    pub scheduler: SharedSchedulerState,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/status", get(get_status))
        .route("/sync", post(start_sync))
        .route("/history", get(get_history).delete(clear_history))
        .route("/settings", get(get_settings))
        .route("/settings/schedule", put(set_schedule))
        .route("/settings/destination", put(set_destination))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StatusResponse {
    #[serde(flatten)]
    sync: SyncStatus,
    scheduler: SchedulerState,
    last_sync_date: Option<DateTime<Utc>>,
    next_scheduled_sync: Option<DateTime<Utc>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SettingsResponse {
    auto_sync_interval: AutoSyncInterval,
    use_custom_destination: bool,
    custom_destination_path: Option<PathBuf>,
    destination_path: PathBuf,
    originals_path: PathBuf,
    pictures_path: PathBuf,
}

#[derive(Deserialize)]
struct ScheduleRequest {
    interval: AutoSyncInterval,
}

#[derive(Deserialize)]
struct DestinationRequest {
    path: Option<PathBuf>,
}

async fn get_status(State(state): State<AppState>) -> Json<StatusResponse> {
    let settings = state.manager.settings();
    Json(StatusResponse {
        sync: state.manager.status(),
        scheduler: state.scheduler.read().clone(),
        last_sync_date: settings.auto_sync.last_sync_date,
        next_scheduled_sync: settings.auto_sync.next_scheduled_sync,
    })
}

async fn start_sync(State(state): State<AppState>) -> Json<serde_json::Value> {
    if state.manager.trigger() {
        info!("Manual sync requested");
        Json(json!({"status": "started"}))
    } else {
        Json(json!({"status": "busy"}))
    }
}

async fn get_history(State(state): State<AppState>) -> Json<Vec<SyncRecord>> {
    Json(state.manager.history())
}

async fn clear_history(State(state): State<AppState>) -> Json<serde_json::Value> {
    match state.manager.clear_history().await {
        Ok(()) => Json(json!({"status": "ok"})),
        Err(e) => Json(json!({"error": e.to_string()})),
    }
}

async fn get_settings(State(state): State<AppState>) -> Json<SettingsResponse> {
    let settings = state.manager.settings();
    let config = state.manager.config();
    Json(SettingsResponse {
        auto_sync_interval: settings.auto_sync.interval,
        use_custom_destination: settings.use_custom_destination,
        custom_destination_path: settings.custom_destination_path.clone(),
        destination_path: settings.destination_base_path(&config.default_destination),
        originals_path: config.originals_dir.clone(),
        pictures_path: config.pictures_dir.clone(),
    })
}

async fn set_schedule(
    State(state): State<AppState>,
    Json(req): Json<ScheduleRequest>,
) -> Json<serde_json::Value> {
    match state.manager.set_auto_sync_interval(req.interval).await {
        Ok(()) => Json(json!({"status": "ok"})),
        Err(e) => Json(json!({"error": e.to_string()})),
    }
}

async fn set_destination(
    State(state): State<AppState>,
    Json(req): Json<DestinationRequest>,
) -> Json<serde_json::Value> {
    if let Some(path) = &req.path {
        if !path.is_absolute() {
            return Json(json!({"error": "Destination must be an absolute path"}));
        }
    }

    match state.manager.set_custom_destination(req.path).await {
        Ok(()) => Json(json!({"status": "ok"})),
        Err(e) => Json(json!({"error": e.to_string()})),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::MemoryStore;
    use crate::sync::LocalAccess;
    use crate::utils::config::Config;
    use axum::body::Body;
    use axum::http::{Method, Request, StatusCode};
    use parking_lot::RwLock;
    use std::sync::Arc;
    use tower::ServiceExt;

    async fn app(dir: &tempfile::TempDir) -> (Router, SyncManager) {
        let config = Config {
            originals_dir: dir.path().join("Originals"),
            pictures_dir: dir.path().join("Edited"),
            default_destination: dir.path().join("cloud"),
            copy_delay: std::time::Duration::ZERO,
            ..Config::default()
        };
        let manager = SyncManager::new(config, Arc::new(MemoryStore::new()), Arc::new(LocalAccess))
            .await
            .unwrap();
        let state = AppState {
            manager: manager.clone(),
            scheduler: Arc::new(RwLock::new(SchedulerState::Idle)),
        };
        (Router::new().nest("/api", routes()).with_state(state), manager)
    }

    async fn call(app: Router, method: Method, uri: &str, body: Option<serde_json::Value>) -> serde_json::Value {
        let mut request = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(body) => {
                request = request.header("content-type", "application/json");
                Body::from(body.to_string())
            }
            None => Body::empty(),
        };

        let response = app.oneshot(request.body(body).unwrap()).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_status_reports_idle() {
        let dir = tempfile::tempdir().unwrap();
        let (app, _) = app(&dir).await;

        let status = call(app, Method::GET, "/api/status", None).await;
        assert_eq!(status["state"], "idle");
        assert_eq!(status["scheduler"]["state"], "idle");
        assert!(status["lastRecord"].is_null());
    }

    #[tokio::test]
    async fn test_schedule_update() {
        let dir = tempfile::tempdir().unwrap();
        let (app, manager) = app(&dir).await;

        let reply = call(
            app.clone(),
            Method::PUT,
            "/api/settings/schedule",
            Some(json!({"interval": "weekly"})),
        )
        .await;
        assert_eq!(reply["status"], "ok");
        assert_eq!(manager.settings().auto_sync.interval, AutoSyncInterval::Weekly);

        let settings = call(app, Method::GET, "/api/settings", None).await;
        assert_eq!(settings["autoSyncInterval"], "weekly");
    }

    #[tokio::test]
    async fn test_relative_destination_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let (app, manager) = app(&dir).await;

        let reply = call(
            app,
            Method::PUT,
            "/api/settings/destination",
            Some(json!({"path": "relative/dir"})),
        )
        .await;
        assert!(reply["error"].is_string());
        assert!(!manager.settings().has_custom_destination());
    }

    #[tokio::test]
    async fn test_manual_sync_lands_in_history() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("Originals")).unwrap();
        std::fs::write(dir.path().join("Originals").join("a.jpg"), b"a").unwrap();
        let (app, manager) = app(&dir).await;
        let mut events = manager.subscribe_events();

        let reply = call(app.clone(), Method::POST, "/api/sync", None).await;
        assert_eq!(reply["status"], "started");

        loop {
            match events.recv().await.unwrap() {
                crate::sync::SyncEvent::Completed { .. } => break,
                crate::sync::SyncEvent::Failed { error_message } => panic!("{}", error_message),
                _ => {}
            }
        }

        let history = call(app, Method::GET, "/api/history", None).await;
        assert_eq!(history[0]["filesTransferred"], 1);
        assert_eq!(history[0]["success"], true);
    }
}
