//! CLI Module
//!
//! Offline front end for the engine: simulate transport over a project
//! snapshot, or inspect the routing graph it builds.

pub mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Cadence - transport and routing engine for a digital audio workstation
#[derive(Parser, Debug)]
#[command(name = "cadence-cli")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the transport over a project with a simulated clock
    #[command(name = "simulate")]
    Simulate {
        /// Project snapshot (JSON)
        project: PathBuf,

        /// Start position in seconds
        #[arg(long, default_value_t = 0.0)]
        from: f64,

        /// Simulated wall-clock duration in seconds
        #[arg(long, default_value_t = 10.0)]
        seconds: f64,

        /// Enable cycling between START and END seconds
        #[arg(long, value_name = "START:END", value_parser = parse_cycle)]
        cycle: Option<(f64, f64)>,

        /// Engine configuration (JSON)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Print the routing graph and the schedule from position zero
    #[command(name = "inspect")]
    Inspect {
        /// Project snapshot (JSON)
        project: PathBuf,
    },
}

/// Parse `START:END` into a pair of seconds
pub fn parse_cycle(value: &str) -> Result<(f64, f64), String> {
    let (start, end) = value
        .split_once(':')
        .ok_or_else(|| format!("expected START:END, got '{}'", value))?;
    let start = start
        .trim()
        .parse::<f64>()
        .map_err(|e| format!("invalid cycle start '{}': {}", start, e))?;
    let end = end
        .trim()
        .parse::<f64>()
        .map_err(|e| format!("invalid cycle end '{}': {}", end, e))?;
    Ok((start, end))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_cycle() {
        assert_eq!(parse_cycle("2:6"), Ok((2.0, 6.0)));
        assert_eq!(parse_cycle(" 1.5 : 3.25 "), Ok((1.5, 3.25)));
        assert!(parse_cycle("2-6").is_err());
        assert!(parse_cycle("a:6").is_err());
    }

    #[test]
    fn test_simulate_arguments() {
        let cli = Cli::parse_from([
            "cadence-cli",
            "simulate",
            "song.json",
            "--from",
            "1.5",
            "--cycle",
            "2:6",
        ]);
        match cli.command {
            Some(Commands::Simulate {
                from, seconds, cycle, ..
            }) => {
                assert_eq!(from, 1.5);
                assert_eq!(seconds, 10.0);
                assert_eq!(cycle, Some((2.0, 6.0)));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }
}
