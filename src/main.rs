//! Cadence CLI
//!
//! Command-line front end for offline simulation and graph inspection.

use clap::Parser;
use env_logger::Env;
use log::info;

use cadence::cli::{commands, Cli, Commands};

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(Env::default().default_filter_or(filter)).init();

    info!("Cadence v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Some(Commands::Simulate {
            project,
            from,
            seconds,
            cycle,
            config,
        }) => commands::simulate(&project, from, seconds, cycle, config.as_deref()),
        Some(Commands::Inspect { project }) => commands::inspect(&project),
        None => {
            println!("Cadence v{}", env!("CARGO_PKG_VERSION"));
            println!("Use --help for available commands");
            Ok(())
        }
    }
}
