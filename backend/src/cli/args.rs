use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "orepool",
    version,
    about = "Multi-coin mining pool backend",
    long_about = "Mining pool coin-backend server: redundant node dispatch with failover, \
                 round accounting, confirmation tracking and automated payouts for \
                 multiple coins at once."
)]
pub struct Args {
    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// Log format (json, pretty)
    #[arg(long, default_value = "pretty")]
    pub log_format: String,

    /// Enable verbose logging
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the pool backend
    Start {
        /// Configuration file path
        #[arg(short, long, value_name = "FILE", default_value = "orepool.toml")]
        config: PathBuf,
    },

    /// Validate a configuration file
    Config {
        /// Configuration file to validate
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Show effective configuration
        #[arg(long)]
        show: bool,
    },

    /// Generate an example configuration file
    Init {
        /// Output file path
        #[arg(short, long, default_value = "orepool.toml")]
        output: PathBuf,

        /// Overwrite existing file
        #[arg(long)]
        force: bool,
    },
}

impl Args {
    pub fn parse() -> Self {
        <Self as Parser>::parse()
    }
}
