//! CLI command implementations

pub mod balance;
pub mod expense;
pub mod logs;
pub mod project;
pub mod settle;
pub mod user;

use std::path::PathBuf;

use anyhow::{Context, Result};
use tatekae_core::domain::Project;
use tatekae_core::services::{EntryPoint, LogEvent, LoggingService};
use tatekae_core::TatekaeContext;

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
        if let Err(e) = l.log(event) {
            tracing::debug!(error = %e, "event log write failed");
        }
    }
}

/// Data directory from TATEKAE_DIR or ~/.tatekae
pub fn get_data_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var("TATEKAE_DIR") {
        return Ok(PathBuf::from(dir));
    }
    dirs::home_dir()
        .map(|home| home.join(".tatekae"))
        .context("Could not find home directory; set TATEKAE_DIR")
}

pub fn get_context() -> Result<TatekaeContext> {
    let data_dir = get_data_dir()?;
    TatekaeContext::new(&data_dir).context("Failed to initialize tatekae context")
}

/// Resolve the project a command works on: the explicit selector, else the
/// configured default
pub async fn resolve_project(ctx: &TatekaeContext, selector: Option<&str>) -> Result<Project> {
    let selector = selector
        .map(str::to_string)
        .or_else(|| ctx.config.default_project.clone())
        .context("No project selected. Pass --project or run `tk project use <name>`")?;

    Ok(ctx.project_service.resolve(&selector).await?)
}
