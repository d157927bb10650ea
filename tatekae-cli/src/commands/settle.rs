//! Settle command - preview and execute a bulk settlement

use std::process::ExitCode;

use anyhow::Result;
use colored::Colorize;
use dialoguer::Confirm;
use indicatif::{ProgressBar, ProgressStyle};

use super::{get_context, get_logger, log_event, resolve_project};
use crate::output;
use tatekae_core::domain::SettlementPlan;
use tatekae_core::services::{LogEvent, SettlementReport, TransferOutcome, TransferResult};

pub async fn run(project: Option<&str>, dry_run: bool, yes: bool, json: bool) -> Result<ExitCode> {
    let ctx = get_context()?;
    let project = resolve_project(&ctx, project).await?;
    let logger = get_logger();

    let preview = ctx.settlement_service.preview(project.id).await?;
    let plan = &preview.plan;

    if json && (dry_run || plan.is_empty()) {
        println!("{}", serde_json::to_string_pretty(&preview)?);
        return Ok(ExitCode::SUCCESS);
    }

    if !json {
        for reference in &preview.balances.dangling {
            output::warning(&format!("Skipped: {}", reference));
        }
    }

    if plan.is_empty() {
        output::success("Everyone is settled up. Nothing to do.");
        return Ok(ExitCode::SUCCESS);
    }

    if !json {
        print_plan(plan);
    }

    if dry_run {
        output::info("Dry run, nothing written.");
        return Ok(ExitCode::SUCCESS);
    }

    if !yes
        && !json
        && !Confirm::new()
            .with_prompt(format!("Write {} settlement record(s)?", plan.record_count))
            .default(false)
            .interact()?
    {
        println!("Cancelled.");
        return Ok(ExitCode::SUCCESS);
    }

    let bar = if json {
        ProgressBar::hidden()
    } else {
        let bar = ProgressBar::new(plan.record_count as u64);
        bar.set_style(
            ProgressStyle::with_template("{bar:40.cyan/blue} {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );
        bar
    };

    let progress = bar.clone();
    let report = ctx
        .settlement_service
        .settle_with_progress(project.id, plan, move |result: &TransferResult| {
            progress.set_message(format!(
                "{} -> {}",
                result.transfer.from_user_name, result.transfer.to_user_name
            ));
            progress.inc(1);
        })
        .await?;
    bar.finish_and_clear();

    let mut report = report;
    let mut shown = false;
    while !json && report.batch.failed > 0 {
        print_report(&report);
        shown = true;
        if !Confirm::new()
            .with_prompt(format!("Retry {} failed transfer(s)?", report.batch.failed))
            .default(true)
            .interact()?
        {
            break;
        }
        report = ctx
            .settlement_service
            .retry(project.id, plan, &report.batch)
            .await?;
        shown = false;
    }

    let batch = &report.batch;
    let event = if batch.is_complete() {
        LogEvent::new("settlement_executed")
    } else {
        LogEvent::new("settlement_partial").with_error(format!(
            "{} skipped, {} failed of {}",
            batch.skipped,
            batch.failed,
            batch.results.len()
        ))
    };
    log_event(
        &logger,
        event.with_project(project.id).with_command("settle"),
    );

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else if !shown {
        print_report(&report);
    }

    if batch.is_complete() {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}

fn print_plan(plan: &SettlementPlan) {
    let mut table = output::create_table();
    table.set_header(vec!["From", "To", "Amount"]);
    for transfer in &plan.transfers {
        table.add_row(vec![
            transfer.from_user_name.clone(),
            transfer.to_user_name.clone(),
            output::format_amount(transfer.amount),
        ]);
    }
    println!("{}", table);
    println!(
        "Would write {} settlement record(s) totalling {}",
        plan.record_count,
        output::format_amount(plan.total)
    );
}

fn print_report(report: &SettlementReport) {
    let batch = &report.batch;

    println!(
        "{} written, {} skipped, {} failed",
        batch.written.to_string().green(),
        batch.skipped.to_string().yellow(),
        batch.failed.to_string().red()
    );

    for result in &batch.results {
        let transfer = &result.transfer;
        match &result.outcome {
            TransferOutcome::Written { .. } => {}
            TransferOutcome::Skipped { reason } => output::warning(&format!(
                "{} -> {} ({}): {}",
                transfer.from_user_name,
                transfer.to_user_name,
                output::format_amount(transfer.amount),
                reason
            )),
            TransferOutcome::Failed { error } => output::error(&format!(
                "{} -> {} ({}): {}",
                transfer.from_user_name,
                transfer.to_user_name,
                output::format_amount(transfer.amount),
                error
            )),
        }
    }

    if report.closed > 0 {
        output::info(&format!("Marked {} expense(s) as settled", report.closed));
    }
    if report.stale > 0 {
        output::warning(&format!(
            "{} expense(s) changed since the preview; nothing was marked settled. Run settle again.",
            report.stale
        ));
    }
    if report.close_failed > 0 {
        output::warning(&format!(
            "{} expense(s) could not be marked settled",
            report.close_failed
        ));
    }

    if report.is_fully_settled() {
        output::success("Everyone is settled up.");
    } else if !batch.is_complete() {
        output::warning(
            "Settlement incomplete. Written transfers already count toward balances; settle again to plan the rest.",
        );
    }
}
