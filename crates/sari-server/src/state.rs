//! Shared application state handed to every handler.

use std::sync::Arc;

use crate::config::Config;
use crate::mailer::Mailer;
use crate::media::MediaStore;
use crate::relay::Hub;
use crate::storage::Storage;

pub struct AppState {
    /// Persistent storage (SQLite).
    pub db: Storage,
    /// Realtime fan-out to connected sockets.
    pub hub: Hub,
    pub mailer: Mailer,
    pub media: MediaStore,
    pub config: Config,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    pub fn new(db: Storage, config: Config) -> Self {
        Self {
            db,
            hub: Hub::new(),
            mailer: Mailer::from_config(&config),
            media: MediaStore::new(config.upload_dir.clone()),
            config,
        }
    }
}
