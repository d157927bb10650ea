//! Project command - create, list and select projects

use std::process::ExitCode;

use anyhow::Result;
use clap::Subcommand;

use super::{get_context, get_data_dir, get_logger, log_event};
use crate::output;
use tatekae_core::services::LogEvent;

#[derive(Subcommand)]
pub enum ProjectCommands {
    /// Create a new project
    New {
        name: String,
        /// Make it the default project
        #[arg(long = "use")]
        make_default: bool,
    },
    /// List projects
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Set the default project
    Use {
        /// Project name or id
        project: String,
    },
}

pub async fn run(command: ProjectCommands) -> Result<ExitCode> {
    let mut ctx = get_context()?;
    let logger = get_logger();

    match command {
        ProjectCommands::New { name, make_default } => {
            let project = ctx.project_service.create_project(&name).await?;
            log_event(
                &logger,
                LogEvent::new("project_created")
                    .with_project(project.id)
                    .with_command("project new"),
            );
            output::success(&format!("Created project '{}' ({})", project.name, project.id));

            if make_default {
                ctx.config.set_default_project(project.id.to_string());
                ctx.config.save(&get_data_dir()?)?;
                output::info("Set as default project");
            }
        }
        ProjectCommands::List { json } => {
            let projects = ctx.project_service.list_projects().await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&projects)?);
                return Ok(ExitCode::SUCCESS);
            }
            if projects.is_empty() {
                println!("No projects yet. Create one with `tk project new <name>`.");
                return Ok(ExitCode::SUCCESS);
            }

            let default = ctx.config.default_project.as_deref();
            let mut table = output::create_table();
            table.set_header(vec!["", "Name", "ID", "Created"]);
            for project in projects {
                let id = project.id.to_string();
                let marker = if default == Some(id.as_str()) || default == Some(project.name.as_str())
                {
                    "*"
                } else {
                    ""
                };
                table.add_row(vec![
                    marker.to_string(),
                    project.name,
                    id,
                    project.created_at.format("%Y-%m-%d").to_string(),
                ]);
            }
            println!("{}", table);
        }
        ProjectCommands::Use { project } => {
            let project = ctx.project_service.resolve(&project).await?;
            ctx.config.set_default_project(project.id.to_string());
            ctx.config.save(&get_data_dir()?)?;
            output::success(&format!("Default project is now '{}'", project.name));
        }
    }

    Ok(ExitCode::SUCCESS)
}
