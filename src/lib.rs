pub mod commands;
pub mod config;
pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod logging;
pub mod server;
pub mod state;

use config::ConsoleConfig;
use error::AppResult;
use infrastructure::{DirectoryService, InMemoryDirectory, LdapDirectory};
use server::Server;
use std::sync::Arc;

/// Directory backend for the given mode.
pub fn directory_for(config: &ConsoleConfig, offline: bool) -> Arc<dyn DirectoryService> {
    if offline {
        Arc::new(InMemoryDirectory::demo())
    } else {
        Arc::new(LdapDirectory::new(
            config.directory.connect_timeout(),
            config.directory.operation_timeout(),
        ))
    }
}

/// Serve the console until shutdown.
pub async fn run(config: ConsoleConfig, offline: bool) -> AppResult<()> {
    tracing::info!(
        listen_addr = %config.server.listen_addr,
        offline,
        discovery_root = %config.directory.discovery_root,
        "LDAP console starting"
    );

    let directory = directory_for(&config, offline);
    Server::new(config, directory, offline).run().await
}
