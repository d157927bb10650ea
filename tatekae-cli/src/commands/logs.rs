//! Logs command - inspect the ledger event log
//!
//! Every ledger command records an event (`expense_added`,
//! `settlement_partial`, ...). The global `--project` narrows all
//! subcommands to that project's events; without it the whole log is used.

use std::process::ExitCode;

use anyhow::Result;
use chrono::{TimeZone, Utc};
use clap::Subcommand;
use colored::Colorize;
use dialoguer::Confirm;
use uuid::Uuid;

use super::{get_context, get_data_dir};
use crate::output;
use tatekae_core::services::{logging, EntryPoint, LogEntry, LogFilter, LoggingService};

#[derive(Subcommand)]
pub enum LogsCommands {
    /// Show recent ledger events
    List {
        /// Number of entries to show
        #[arg(short, long, default_value = "50")]
        limit: usize,
        /// Only this event, e.g. settlement_partial
        #[arg(long)]
        event: Option<String>,
        /// Show only failed operations
        #[arg(long)]
        errors: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Clear old log entries
    Clear {
        /// Delete entries older than N days
        #[arg(long, default_value = "30")]
        older_than_days: u64,
        /// Skip confirmation prompt
        #[arg(long, short = 'f')]
        force: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Event counts per kind and the log database path
    Stats {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

const DAY_MS: i64 = 24 * 60 * 60 * 1000;

fn open_log() -> Result<LoggingService> {
    let data_dir = get_data_dir()?;
    std::fs::create_dir_all(&data_dir)?;
    LoggingService::new(&data_dir, EntryPoint::Cli, env!("CARGO_PKG_VERSION"))
}

/// Only an explicit `--project` filters; the configured default does not
async fn project_filter(selector: Option<&str>) -> Result<Option<(Uuid, String)>> {
    let Some(selector) = selector else {
        return Ok(None);
    };
    let ctx = get_context()?;
    let project = ctx.project_service.resolve(selector).await?;
    Ok(Some((project.id, project.name)))
}

fn format_timestamp(timestamp_ms: i64) -> String {
    Utc.timestamp_millis_opt(timestamp_ms)
        .single()
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| timestamp_ms.to_string())
}

fn event_label(entry: &LogEntry) -> String {
    match entry.event.as_str() {
        "settlement_executed" => entry.event.green().to_string(),
        "settlement_partial" | "dangling_reference" => entry.event.yellow().to_string(),
        _ => entry.event.clone(),
    }
}

pub async fn run(project: Option<&str>, command: LogsCommands) -> Result<ExitCode> {
    let scope = project_filter(project).await?;
    let project_id = scope.as_ref().map(|(id, _)| *id);
    let service = open_log()?;

    match command {
        LogsCommands::List {
            limit,
            event,
            errors,
            json,
        } => {
            let entries = service.entries(&LogFilter {
                project_id,
                event,
                errors_only: errors,
                limit,
            })?;

            if json {
                println!("{}", serde_json::to_string_pretty(&entries)?);
                return Ok(ExitCode::SUCCESS);
            }
            if entries.is_empty() {
                println!("No log entries found.");
                return Ok(ExitCode::SUCCESS);
            }

            let mut header = vec!["Time", "Event", "Command"];
            if scope.is_none() {
                header.push("Project");
            }
            header.push("Problem");

            let mut table = output::create_table();
            table.set_header(header);
            for entry in &entries {
                let mut row = vec![
                    format_timestamp(entry.timestamp),
                    event_label(entry),
                    entry.command.clone().unwrap_or_default(),
                ];
                if scope.is_none() {
                    row.push(
                        entry
                            .project_id
                            .as_deref()
                            .map(|id| id.chars().take(8).collect())
                            .unwrap_or_default(),
                    );
                }
                row.push(
                    entry
                        .error_message
                        .as_deref()
                        .map(|m| m.red().to_string())
                        .unwrap_or_default(),
                );
                table.add_row(row);
            }
            println!("{}", table);
        }
        LogsCommands::Clear {
            older_than_days,
            force,
            json,
        } => {
            let cutoff_ms = logging::now_ms() - older_than_days as i64 * DAY_MS;
            let prompt = match &scope {
                Some((_, name)) => format!(
                    "Delete log entries of {} older than {} days?",
                    name, older_than_days
                ),
                None => format!("Delete log entries older than {} days?", older_than_days),
            };

            if !force
                && !json
                && !Confirm::new()
                    .with_prompt(prompt)
                    .default(false)
                    .interact()?
            {
                println!("Cancelled.");
                return Ok(ExitCode::SUCCESS);
            }

            let deleted = service.delete_before(cutoff_ms, project_id)?;

            if json {
                println!("{}", serde_json::json!({ "deleted": deleted }));
            } else {
                output::success(&format!("Deleted {} log entries", deleted));
            }
        }
        LogsCommands::Stats { json } => {
            let counts = service.event_counts(project_id)?;
            let total: u64 = counts.iter().map(|c| c.total).sum();
            let errors: u64 = counts.iter().map(|c| c.errors).sum();
            let db_path = service.db_path().to_path_buf();

            if json {
                println!(
                    "{}",
                    serde_json::json!({
                        "project": scope.as_ref().map(|(_, name)| name),
                        "total_entries": total,
                        "error_count": errors,
                        "events": counts,
                        "database_path": db_path.to_string_lossy(),
                    })
                );
                return Ok(ExitCode::SUCCESS);
            }

            match &scope {
                Some((_, name)) => println!("{} {}", "Ledger events for".bold(), name.bold()),
                None => println!("{}", "Ledger events".bold()),
            }
            if counts.is_empty() {
                println!("No log entries found.");
            } else {
                let mut table = output::create_table();
                table.set_header(vec!["Event", "Count", "Failed"]);
                for count in &counts {
                    table.add_row(vec![
                        count.event.clone(),
                        count.total.to_string(),
                        count.errors.to_string(),
                    ]);
                }
                println!("{}", table);
            }
            println!("  Total: {} ({} failed)", total, errors);
            println!("  Database: {}", db_path.display());
        }
    }

    Ok(ExitCode::SUCCESS)
}
