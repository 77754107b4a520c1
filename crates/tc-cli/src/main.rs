use std::io;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use tc_cli::commands::{active, punch, queue, report, status, sync, watch};
use tc_cli::{Cli, Commands, Config};
use tc_core::EventType;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing with verbose flag support
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env()
    };
    // Logs go to stderr so JSON output on stdout stays parseable
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();

    let Some(command) = &cli.command else {
        // No subcommand, show help
        use clap::CommandFactory;
        Cli::command().print_help()?;
        println!();
        return Ok(());
    };

    let config = Config::load_from(cli.config.as_deref()).context("failed to load configuration")?;
    tracing::debug!(?config, "loaded configuration");

    let mut stdout = io::stdout().lock();
    match command {
        Commands::ClockIn(args) => punch::run(&mut stdout, EventType::ClockIn, args, &config)?,
        Commands::ClockOut(args) => punch::run(&mut stdout, EventType::ClockOut, args, &config)?,
        Commands::BreakStart(args) => {
            punch::run(&mut stdout, EventType::BreakStart, args, &config)?;
        }
        Commands::BreakEnd(args) => punch::run(&mut stdout, EventType::BreakEnd, args, &config)?,
        Commands::Override(args) => punch::run_override(&mut stdout, args, &config)?,
        Commands::Sync { json } => sync::run(&mut stdout, *json, &config)?,
        Commands::Status { json } => status::run(&mut stdout, *json, &config)?,
        Commands::Queue { staff, json } => {
            queue::run(&mut stdout, staff.as_deref(), *json, &config)?;
        }
        Commands::Report(args) => report::run(&mut stdout, args, &config)?,
        Commands::Active {
            lookback_hours,
            json,
        } => active::run(&mut stdout, *lookback_hours, *json, &config)?,
        Commands::Watch => watch::run(&mut stdout, &config)?,
    }

    Ok(())
}
