//! User command - manage project members

use std::process::ExitCode;

use anyhow::Result;
use clap::Subcommand;
use dialoguer::Confirm;

use super::{get_context, get_logger, log_event, resolve_project};
use crate::output;
use tatekae_core::services::LogEvent;

#[derive(Subcommand)]
pub enum UserCommands {
    /// Add a member to the project
    Add { name: String },
    /// List project members
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Remove a member with no recorded expenses
    Remove {
        /// Member name or id
        user: String,
        /// Skip confirmation prompt
        #[arg(long, short)]
        force: bool,
    },
}

pub async fn run(project: Option<&str>, command: UserCommands) -> Result<ExitCode> {
    let ctx = get_context()?;
    let project = resolve_project(&ctx, project).await?;
    let logger = get_logger();

    match command {
        UserCommands::Add { name } => {
            let user = ctx.user_service.add_user(project.id, &name).await?;
            log_event(
                &logger,
                LogEvent::new("user_added")
                    .with_project(project.id)
                    .with_command("user add"),
            );
            output::success(&format!("Added {} to {}", user.name, project.name));
        }
        UserCommands::List { json } => {
            let users = ctx.user_service.list_users(project.id).await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&users)?);
                return Ok(ExitCode::SUCCESS);
            }
            if users.is_empty() {
                println!("No members yet. Add one with `tk user add <name>`.");
                return Ok(ExitCode::SUCCESS);
            }

            let mut table = output::create_table();
            table.set_header(vec!["Name", "ID"]);
            for user in users {
                table.add_row(vec![user.name, user.id.to_string()]);
            }
            println!("{}", table);
        }
        UserCommands::Remove { user, force } => {
            let user = ctx.user_service.find_user(project.id, &user).await?;

            if !force
                && !Confirm::new()
                    .with_prompt(format!("Remove {} from {}?", user.name, project.name))
                    .default(false)
                    .interact()?
            {
                println!("Cancelled.");
                return Ok(ExitCode::SUCCESS);
            }

            ctx.user_service.remove_user(project.id, user.id).await?;
            log_event(
                &logger,
                LogEvent::new("user_removed")
                    .with_project(project.id)
                    .with_command("user remove"),
            );
            output::success(&format!("Removed {}", user.name));
        }
    }

    Ok(ExitCode::SUCCESS)
}
