//! Balance command - net position of every member

use std::process::ExitCode;

use anyhow::Result;
use colored::Colorize;

use super::{get_context, get_logger, log_event, resolve_project};
use crate::output;
use tatekae_core::services::LogEvent;

pub async fn run(project: Option<&str>, json: bool) -> Result<ExitCode> {
    let ctx = get_context()?;
    let project = resolve_project(&ctx, project).await?;
    let logger = get_logger();

    let sheet = ctx.balance_service.compute(project.id).await?;

    if sheet.has_dangling_references() {
        log_event(
            &logger,
            LogEvent::new("dangling_reference")
                .with_project(project.id)
                .with_command("balance")
                .with_error(format!("{} contribution(s) skipped", sheet.dangling.len())),
        );
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&sheet)?);
        return Ok(ExitCode::SUCCESS);
    }

    println!("{}", project.name.bold());
    if sheet.balances.is_empty() {
        println!("No members yet.");
        return Ok(ExitCode::SUCCESS);
    }

    let mut table = output::create_table();
    table.set_header(vec!["Member", "Net"]);
    for balance in &sheet.balances {
        table.add_row(vec![
            balance.user_name.clone(),
            output::format_net(balance.net_amount).to_string(),
        ]);
    }
    println!("{}", table);

    if sheet.is_settled() {
        output::success("Everyone is settled up.");
    }

    for reference in &sheet.dangling {
        output::warning(&format!("Skipped: {}", reference));
    }
    if !sheet.is_balanced() {
        output::warning(&format!(
            "Balances do not sum to zero (off by {}); some expenses reference removed members.",
            output::format_amount(sheet.total())
        ));
    }

    Ok(ExitCode::SUCCESS)
}
