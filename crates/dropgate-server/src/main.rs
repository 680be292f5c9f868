use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use dropgate_index::{FileIndex, MemoryIndex, SqliteIndex};
use dropgate_server::config::ServerConfig;
use dropgate_server::routes::AppState;
use dropgate_server::storage::Storage;
use dropgate_server::build_router;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "dropgate_server=info,tower_http=info".into()),
        )
        .init();

    let config = Arc::new(ServerConfig::from_env()?);

    let storage = Arc::new(
        Storage::new(
            config.upload_dir.clone(),
            config.temp_dir.clone(),
            !config.preserve_uploads,
        )
        .await?,
    );

    let index: Arc<dyn FileIndex> = match &config.db_path {
        Some(path) => {
            info!("Persistent index enabled: {}", path.display());
            Arc::new(SqliteIndex::open(path)?)
        }
        None => Arc::new(MemoryIndex::new()),
    };

    let sessions = Arc::new(Mutex::new(HashMap::new()));

    tokio::spawn(dropgate_index::sweeps::run_ttl_sweep(
        index.clone(),
        config.ttl_sweep_interval_secs,
    ));
    if config.zombie_cleanup_interval_ms > 0 {
        let interval_secs = (config.zombie_cleanup_interval_ms / 1000).max(1);
        let live_sessions = sessions.clone();
        tokio::spawn(dropgate_index::sweeps::run_zombie_sweep(
            storage.temp_dir().to_path_buf(),
            interval_secs * 2,
            interval_secs,
            move || {
                live_sessions
                    .lock()
                    .map(|sessions| sessions.keys().cloned().collect())
                    .unwrap_or_default()
            },
        ));
    }

    let state = AppState {
        index,
        storage,
        config: config.clone(),
        sessions,
    };

    let app = build_router(state);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("Dropgate server listening on {}", addr);
    info!(
        "Max file size: {} MB, E2EE: {}, preserve uploads: {}",
        config.max_size_mb(),
        config.enable_e2ee,
        config.preserve_uploads
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
            _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}
