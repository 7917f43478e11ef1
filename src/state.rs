//! Shared state handed to every request handler

use crate::infrastructure::{DirectoryService, DiscoveryOptions};
use chrono::{DateTime, Utc};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    /// Directory every operation is sent to
    pub directory: Arc<dyn DirectoryService>,

    /// Where base DN discovery looks
    pub discovery: DiscoveryOptions,

    /// Serving the in-memory demo directory
    pub offline: bool,

    pub version: String,

    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(directory: Arc<dyn DirectoryService>, discovery: DiscoveryOptions, offline: bool) -> Self {
        Self {
            directory,
            discovery,
            offline,
            version: env!("CARGO_PKG_VERSION").to_string(),
            started_at: Utc::now(),
        }
    }

    /// Uptime as `1h 2m 3s`.
    pub fn uptime(&self) -> String {
        let secs = (Utc::now() - self.started_at).num_seconds().max(0);
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
