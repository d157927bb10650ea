//! Tatekae CLI - shared expenses and settlement in your terminal

use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;
mod output;

use commands::{balance, expense, logs, project, settle, user};

/// Tatekae - who paid, who owes, and how to settle up
#[derive(Parser)]
#[command(name = "tk", version, about, long_about = None)]
struct Cli {
    /// Project name or id (defaults to the configured project)
    #[arg(long, short, global = true)]
    project: Option<String>,

    /// Show debug diagnostics
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage projects
    Project {
        #[command(subcommand)]
        command: project::ProjectCommands,
    },

    /// Manage project members
    User {
        #[command(subcommand)]
        command: user::UserCommands,
    },

    /// Record and manage expenses
    Expense {
        #[command(subcommand)]
        command: expense::ExpenseCommands,
    },

    /// Show who owes and who is owed
    Balance {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Plan and record the transfers that settle all balances
    Settle {
        /// Show the plan without writing anything
        #[arg(long)]
        dry_run: bool,
        /// Skip confirmation prompt
        #[arg(long, short)]
        yes: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// View and manage application logs
    Logs {
        #[command(subcommand)]
        command: logs::LogsCommands,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = init_tracing(cli.verbose) {
        eprintln!("{}", e);
    }

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            output::error(&format!("Failed to start runtime: {}", e));
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(code) => code,
        Err(e) => {
            output::error(&format!("{:#}", e));
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: bool) -> Result<()> {
    let level = if verbose { "debug" } else { "warn" };
    let filter = tracing_subscriber::EnvFilter::try_from_env("TATEKAE_LOG")
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to initialize tracing subscriber: {e}"))
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let selected = cli.project.as_deref();
    match cli.command {
        Commands::Project { command } => project::run(command).await,
        Commands::User { command } => user::run(selected, command).await,
        Commands::Expense { command } => expense::run(selected, command).await,
        Commands::Balance { json } => balance::run(selected, json).await,
        Commands::Settle { dry_run, yes, json } => settle::run(selected, dry_run, yes, json).await,
        Commands::Logs { command } => logs::run(selected, command).await,
    }
}
