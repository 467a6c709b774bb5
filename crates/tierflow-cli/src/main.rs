mod cli;
mod commands;
mod completions;
mod error;
mod output;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands};
use tierflow_core::{Project, paths};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Commands::Completions { shell } = cli.command {
        completions::write_completions(shell, &mut std::io::stdout());
        return;
    }

    if let Err(err) = run(cli).await {
        error::handle_error(err);
    }
}

async fn run(cli: Cli) -> Result<()> {
    // Logs go to a file so stdout carries only model output.
    let log_dir = paths::logs_dir(&cli.project)?;
    let file_appender = tracing_appender::rolling::daily(log_dir, "tierflow.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(false)
        .with_level(true)
        .init();

    tracing::info!(project = %cli.project.display(), version = env!("CARGO_PKG_VERSION"), "Starting tierflow");
    let project = Project::open(&cli.project)?;
    let format = cli.format;

    match cli.command {
        Commands::Run(args) => commands::run::run(project, args, format).await,
        Commands::Ask(args) => commands::ask::run(project, args, format).await,
        Commands::Invoke(args) => commands::invoke::run(project, args, format).await,
        Commands::Memory { command } => commands::memory::run(project, command, format).await,
        Commands::Completions { .. } => Ok(()),
    }
}
