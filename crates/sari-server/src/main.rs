//! SARI server binary.

use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use sari_server::config::Config;
use sari_server::state::AppState;
use sari_server::storage::Storage;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env()?;

    if let Some(parent) = config.db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::create_dir_all(&config.upload_dir)?;

    let db = Storage::open(&config.db_path)?;
    let addr = config.addr;
    let state = Arc::new(AppState::new(db, config));
    let app = sari_server::app(state);

    tracing::info!("SARI server listening on {addr}");
    tracing::info!("WebSocket: ws://{addr}/ws");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
