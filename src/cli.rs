//! Command-line interface for rpsls.

use clap::{Parser, Subcommand};

/// rpsls - rock, paper, scissors, lizard, spock game server
#[derive(Parser, Debug)]
#[command(name = "rpsls")]
#[command(about = "Two-player rock-paper-scissors-lizard-spock over WebSockets", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Subcommand to run
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the WebSocket game server
    Serve {
        /// Path to a TOML config file
        #[arg(short, long)]
        config: Option<std::path::PathBuf>,

        /// Port to bind to (overrides config)
        #[arg(short, long)]
        port: Option<u16>,

        /// Host to bind to (overrides config)
        #[arg(long)]
        host: Option<String>,

        /// SQLite database file; in-memory store if omitted
        #[arg(long)]
        db_path: Option<String>,
    },

    /// Print the outcome of one play against another
    Resolve {
        /// First play
        first: String,

        /// Second play
        second: String,
    },
}
