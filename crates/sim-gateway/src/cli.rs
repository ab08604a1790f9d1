use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Simulation runtime gateway.
#[derive(Debug, Parser)]
#[command(name = "sim-gateway", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start the gateway server (default when no subcommand is given).
    Serve {
        /// Path to a TOML config file. Falls back to `SIM_CONFIG`, then defaults.
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Load a scenario (with its scenes and personas) from a JSON file into the store.
    Seed {
        /// Path to the scenario seed JSON file.
        input: PathBuf,
    },
    /// Configuration utilities.
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Dump the resolved configuration (with defaults) as TOML.
    Show,
}
