//! LDAP console server
//!
//! Serves the JSON API the browser console talks to, backed by a real LDAP
//! server or, with `--offline`, by an in-memory demo directory.

use clap::Parser;
use ldap_console::config::ConsoleConfig;
use ldap_console::error::{AppError, AppResult};
use ldap_console::logging;

#[derive(Parser)]
#[command(name = "ldap-console")]
#[command(about = "Browser-based LDAP administration console", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "LDAP_CONSOLE_CONFIG")]
    config: Option<String>,

    /// Listen address, overrides the configuration file
    #[arg(short, long, env = "LDAP_CONSOLE_LISTEN_ADDR")]
    listen: Option<String>,

    /// Log level, overrides the configuration file
    #[arg(long, env = "LDAP_CONSOLE_LOG_LEVEL")]
    log_level: Option<String>,

    /// Serve the in-memory demo directory instead of a real server
    #[arg(long, env = "LDAP_CONSOLE_OFFLINE")]
    offline: bool,
}

#[tokio::main]
async fn main() -> AppResult<()> {
    let cli = Cli::parse();

    let mut config = ConsoleConfig::load(cli.config.as_deref())?;

    if let Some(listen) = cli.listen {
        config.server.listen_addr = listen
            .parse()
            .map_err(|e| AppError::ConfigError(format!("Invalid listen address: {}", e)))?;
    }
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }

    let _guard = logging::init_logging(&config.logging);

    ldap_console::run(config, cli.offline).await
}
