use anyhow::Result;
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::mpsc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use photo_sync::api::{self, AppState};
use photo_sync::scheduler::{NotifyWatcher, Scheduler};
use photo_sync::storage::Storage;
use photo_sync::sync::{LocalAccess, SyncManager};
use photo_sync::utils;
use photo_sync::web;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    utils::logging::init_tracing();

    let config = utils::config::load_config()?;
    let run_once = std::env::args().any(|arg| arg == "--once");

    info!("Starting Photo Sync v{}", env!("CARGO_PKG_VERSION"));
    info!("Originals: {}", config.originals_dir.display());
    info!("Pictures: {}", config.pictures_dir.display());

    let storage = Storage::new(&config.database_url).await?;
    storage.run_migrations().await?;

    let manager = SyncManager::new(config.clone(), Arc::new(storage), Arc::new(LocalAccess)).await?;

    if run_once {
        if let Some(record) = manager.run_sync().await {
            println!("{}", record.summary());
            if !record.success {
                std::process::exit(1);
            }
        }
        return Ok(());
    }

    let (signal_tx, signal_rx) = mpsc::channel(16);
    let scheduler = Scheduler::new(
        manager.subscribe_schedule(),
        signal_tx,
        Arc::new(NotifyWatcher),
        config.sources().into_iter().map(|source| source.path).collect(),
        config.watch_debounce,
        config.overdue_grace,
    );
    let state = AppState {
        manager: manager.clone(),
        scheduler: scheduler.state(),
    };

    tokio::spawn(scheduler.run());
    let signal_manager = manager.clone();
    tokio::spawn(async move {
        signal_manager.handle_signals(signal_rx).await;
    });

    let app = Router::new()
        .nest("/api", api::routes())
        .nest("/ws", web::websocket::routes())
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = SocketAddr::from(([127, 0, 0, 1], config.port));
    info!("Server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped gracefully");
    Ok(())
}

async fn shutdown_signal() {
    use tokio::signal;

    let interrupt = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Cannot listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Cannot listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = interrupt => info!("Interrupted, finishing up"),
        _ = terminate => info!("Terminated, finishing up"),
    }
}
