//! CLI command implementations

pub mod catalog;
pub mod logs;
pub mod payload;
pub mod policy;

use std::path::PathBuf;

use anyhow::{Context, Result};
use ledgerguard_core::config::Config;
use ledgerguard_core::{Catalogs, EntryPoint, LedgerguardContext, LogEvent, LoggingService};

/// Get the logging service for CLI operations
///
/// Returns None if logging fails to initialize (shouldn't block operations)
pub fn get_logger() -> Option<LoggingService> {
    let data_dir = get_data_dir().ok()?;
    std::fs::create_dir_all(&data_dir).ok()?;
    LoggingService::new(&data_dir, EntryPoint::Cli, env!("CARGO_PKG_VERSION")).ok()
}

/// Log an event, ignoring any errors (logging should never break the app)
pub fn log_event(logger: &Option<LoggingService>, event: LogEvent) {
    if let Some(l) = logger {
        let _ = l.log(event);
    }
}

/// Get the data directory from environment or default
pub fn get_data_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var("LEDGERGUARD_DIR") {
        return Ok(PathBuf::from(dir));
    }
    let home = dirs::home_dir().context("Could not find home directory")?;
    Ok(home.join(".ledgerguard"))
}

/// Load settings without opening the record store
pub fn load_config() -> Result<Config> {
    let data_dir = get_data_dir()?;
    Config::load(&data_dir)
}

/// Catalogs from settings; commands that never touch the store use this
pub fn load_catalogs() -> Result<Catalogs> {
    load_config()?
        .catalogs()
        .context("Failed to load field catalog")
}

/// Get or create ledgerguard context
pub fn get_context() -> Result<LedgerguardContext> {
    let data_dir = get_data_dir()?;

    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("Failed to create ledgerguard directory: {:?}", data_dir))?;

    LedgerguardContext::new(&data_dir).context("Failed to initialize ledgerguard context")
}
