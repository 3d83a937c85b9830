//! Command-line interface for strictly_match.

use clap::{Parser, Subcommand};
use strictly_match::Difficulty;

/// Strictly Match - tic-tac-toe on one keyboard or against a match host
#[derive(Parser, Debug)]
#[command(name = "strictly_match")]
#[command(about = "Play tic-tac-toe offline or online", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Subcommand to run
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Two players sharing this terminal
    Local,

    /// Play an online match
    Play {
        /// Client configuration file (TOML)
        #[arg(short, long)]
        config: Option<std::path::PathBuf>,

        /// Host address, overrides the config file
        #[arg(long)]
        host: Option<String>,

        /// Credential token (defaults to STRICTLY_MATCH_TOKEN)
        #[arg(long)]
        token: Option<String>,

        /// Play against the host's bot at this difficulty
        #[arg(long, conflicts_with = "join")]
        bot: Option<Difficulty>,

        /// Join an existing match by id
        #[arg(long)]
        join: Option<String>,
    },

    /// Run the reference match host
    Serve {
        /// Address to bind to
        #[arg(long, default_value = "127.0.0.1:7350")]
        bind: String,
    },

    /// List rooms on a host
    Rooms {
        /// Client configuration file (TOML)
        #[arg(short, long)]
        config: Option<std::path::PathBuf>,

        /// Host address, overrides the config file
        #[arg(long)]
        host: Option<String>,

        /// Credential token (defaults to STRICTLY_MATCH_TOKEN)
        #[arg(long)]
        token: Option<String>,
    },
}
