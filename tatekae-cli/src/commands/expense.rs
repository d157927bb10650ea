//! Expense command - record, edit and settle individual expenses

use std::process::ExitCode;

use anyhow::Result;
use chrono::{Local, NaiveDate};
use clap::Subcommand;
use colored::Colorize;
use dialoguer::Confirm;
use rust_decimal::Decimal;
use uuid::Uuid;

use super::{get_context, get_logger, log_event, resolve_project};
use crate::output;
use tatekae_core::domain::{Beneficiary, ExpenseUpdate, Project};
use tatekae_core::services::{LogEvent, NewExpense};
use tatekae_core::TatekaeContext;

#[derive(Subcommand)]
pub enum ExpenseCommands {
    /// Record an expense paid by one member for others
    Add {
        /// Amount paid
        amount: Decimal,
        /// Member who paid
        #[arg(long)]
        payer: String,
        /// Members sharing the cost (comma-separated, default: everyone)
        #[arg(long = "for", value_delimiter = ',')]
        beneficiaries: Vec<String>,
        #[arg(long)]
        memo: Option<String>,
        /// Date of the expense (YYYY-MM-DD, default: today)
        #[arg(long)]
        date: Option<NaiveDate>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List expenses, newest first
    List {
        /// Only show expenses that still count toward balances
        #[arg(long)]
        unsettled: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Change fields of an expense
    Edit {
        id: Uuid,
        #[arg(long)]
        amount: Option<Decimal>,
        #[arg(long)]
        payer: Option<String>,
        #[arg(long = "for", value_delimiter = ',')]
        beneficiaries: Vec<String>,
        #[arg(long, conflicts_with = "clear_memo")]
        memo: Option<String>,
        #[arg(long)]
        clear_memo: bool,
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Delete an expense
    Delete {
        id: Uuid,
        /// Skip confirmation prompt
        #[arg(long, short)]
        force: bool,
    },
    /// Mark an expense as settled
    Settle { id: Uuid },
    /// Mark an expense as unsettled
    Unsettle { id: Uuid },
    /// Flip the settled flag of an expense
    Toggle { id: Uuid },
}

pub async fn run(project: Option<&str>, command: ExpenseCommands) -> Result<ExitCode> {
    let ctx = get_context()?;
    let project = resolve_project(&ctx, project).await?;
    let logger = get_logger();

    match command {
        ExpenseCommands::Add {
            amount,
            payer,
            beneficiaries,
            memo,
            date,
            json,
        } => {
            let payer = ctx.user_service.find_user(project.id, &payer).await?;
            let beneficiary_ids = if beneficiaries.is_empty() {
                ctx.user_service
                    .list_users(project.id)
                    .await?
                    .into_iter()
                    .map(|u| u.id)
                    .collect()
            } else {
                resolve_members(&ctx, &project, &beneficiaries)
                    .await?
                    .into_iter()
                    .map(|b| b.user_id)
                    .collect()
            };

            let record = ctx
                .expense_service
                .add_expense(
                    project.id,
                    NewExpense {
                        payer_id: payer.id,
                        beneficiary_ids,
                        amount,
                        memo,
                        date: date.unwrap_or_else(|| Local::now().date_naive()),
                    },
                )
                .await?;

            log_event(
                &logger,
                LogEvent::new("expense_added")
                    .with_project(project.id)
                    .with_command("expense add"),
            );

            if json {
                println!("{}", serde_json::to_string_pretty(&record)?);
            } else {
                output::success(&format!(
                    "Recorded {} paid by {} for {} member(s) ({})",
                    output::format_amount(record.amount),
                    payer.name,
                    record.beneficiaries.len(),
                    record.id
                ));
            }
        }
        ExpenseCommands::List { unsettled, json } => {
            let users = ctx.user_service.list_users(project.id).await?;
            let expenses: Vec<_> = ctx
                .expense_service
                .list_expenses(project.id)
                .await?
                .into_iter()
                .filter(|e| !unsettled || e.counts_toward_balance())
                .collect();

            if json {
                println!("{}", serde_json::to_string_pretty(&expenses)?);
                return Ok(ExitCode::SUCCESS);
            }
            if expenses.is_empty() {
                println!("No expenses found.");
                return Ok(ExitCode::SUCCESS);
            }

            let mut table = output::create_table();
            table.set_header(vec!["Date", "Payer", "For", "Amount", "Memo", "Status", "ID"]);
            for expense in expenses {
                let payer = users
                    .iter()
                    .find(|u| u.id == expense.payer_id)
                    .map(|u| u.name.clone())
                    .unwrap_or_else(|| "(unknown)".to_string());
                let names = expense
                    .beneficiaries
                    .iter()
                    .map(|b| b.user_name.as_str())
                    .collect::<Vec<_>>()
                    .join(", ");
                let status = if expense.pending {
                    "pending".cyan().to_string()
                } else if expense.settled {
                    "settled".dimmed().to_string()
                } else {
                    "open".yellow().to_string()
                };

                table.add_row(vec![
                    expense.date.to_string(),
                    payer,
                    names,
                    output::format_amount(expense.amount),
                    expense.memo.unwrap_or_default(),
                    status,
                    expense.id.to_string(),
                ]);
            }
            println!("{}", table);
        }
        ExpenseCommands::Edit {
            id,
            amount,
            payer,
            beneficiaries,
            memo,
            clear_memo,
            date,
        } => {
            let payer_id = match payer {
                Some(name) => Some(ctx.user_service.find_user(project.id, &name).await?.id),
                None => None,
            };
            let beneficiaries = if beneficiaries.is_empty() {
                None
            } else {
                Some(resolve_members(&ctx, &project, &beneficiaries).await?)
            };
            let memo = if clear_memo { Some(None) } else { memo.map(Some) };

            let update = ExpenseUpdate {
                payer_id,
                beneficiaries,
                amount,
                memo,
                date,
                ..ExpenseUpdate::default()
            };
            if update.is_empty() {
                output::warning("Nothing to change.");
                return Ok(ExitCode::SUCCESS);
            }

            ctx.expense_service
                .edit_expense(project.id, id, update)
                .await?;
            log_event(
                &logger,
                LogEvent::new("expense_edited")
                    .with_project(project.id)
                    .with_command("expense edit"),
            );
            output::success(&format!("Updated expense {}", id));
        }
        ExpenseCommands::Delete { id, force } => {
            if !force
                && !Confirm::new()
                    .with_prompt(format!("Delete expense {}?", id))
                    .default(false)
                    .interact()?
            {
                println!("Cancelled.");
                return Ok(ExitCode::SUCCESS);
            }

            ctx.expense_service.delete_expense(project.id, id).await?;
            log_event(
                &logger,
                LogEvent::new("expense_deleted")
                    .with_project(project.id)
                    .with_command("expense delete"),
            );
            output::success(&format!("Deleted expense {}", id));
        }
        ExpenseCommands::Settle { id } => {
            ctx.expense_service.set_settled(project.id, id, true).await?;
            output::success(&format!("Expense {} is settled", id));
        }
        ExpenseCommands::Unsettle { id } => {
            ctx.expense_service.set_settled(project.id, id, false).await?;
            output::success(&format!("Expense {} is open again", id));
        }
        ExpenseCommands::Toggle { id } => {
            let record = ctx.expense_service.toggle_settled(project.id, id).await?;
            let state = if record.settled { "settled" } else { "open" };
            output::success(&format!("Expense {} is now {}", id, state));
        }
    }

    Ok(ExitCode::SUCCESS)
}

async fn resolve_members(
    ctx: &TatekaeContext,
    project: &Project,
    names: &[String],
) -> Result<Vec<Beneficiary>> {
    let mut members = Vec::with_capacity(names.len());
    for name in names.iter().map(|n| n.trim()).filter(|n| !n.is_empty()) {
        let user = ctx.user_service.find_user(project.id, name).await?;
        members.push(Beneficiary::new(user.id, user.name));
    }
    Ok(members)
}
