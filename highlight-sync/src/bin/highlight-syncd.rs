// highlight-syncd: background process for highlight capture and sync
//
// Responsibilities:
// - Own the key-value store (config + offline queue) under the state dir
// - Answer page/CLI requests over a Unix socket, one JSON message per line
// - Drain the offline queue on startup and every few minutes

use anyhow::{Context, Result};
use highlight_sync::host::{
    config::HostConfig,
    server::{serve, Background},
};
use log::{error, info};
use std::sync::Arc;
use tokio::net::UnixListener;
use tokio::signal;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    let config = HostConfig::from_env();
    config
        .ensure_dirs()
        .context("Failed to create data directory")?;

    // Clean up stale socket if exists
    if config.socket_exists() {
        if config.is_daemon_running() {
            error!("Daemon already running (PID: {:?})", config.read_pid());
            std::process::exit(1);
        }
        config
            .remove_socket()
            .context("Failed to remove stale socket")?;
    }

    config.write_pid().context("Failed to write PID file")?;

    let background = Background::from_config(&config)?;

    let listener = UnixListener::bind(&config.socket_path)
        .with_context(|| format!("Failed to bind socket: {}", config.socket_path.display()))?;

    // Owner-only access
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&config.socket_path, std::fs::Permissions::from_mode(0o600))
            .with_context(|| {
                format!(
                    "Failed to set socket permissions: {}",
                    config.socket_path.display()
                )
            })?;
    }

    info!(
        "Daemon listening on {} (store: {}, drain every {:?}, queue limit {})",
        config.socket_path.display(),
        config.store_file().display(),
        background.scheduler.interval(),
        background.scheduler.queue().limits().max_items
    );

    let cancel_token = CancellationToken::new();

    let ctrl_c_token = cancel_token.clone();
    tokio::spawn(async move {
        let _ = signal::ctrl_c().await;
        info!("Shutting down daemon...");
        ctrl_c_token.cancel();
    });

    let scheduler = tokio::spawn(Arc::clone(&background.scheduler).run(cancel_token.clone()));

    serve(listener, background.router, cancel_token).await;

    if let Err(e) = scheduler.await {
        error!("Retry scheduler task failed: {}", e);
    }

    config.remove_pid().ok();
    config.remove_socket().ok();

    info!("Daemon stopped");
    Ok(())
}
