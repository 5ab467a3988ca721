use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Handoff: pair two sessions of the same account and exchange form data.
#[derive(Parser, Debug)]
#[command(name = "handoff", version, about)]
pub struct Args {
    /// Config file path override.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Log level override (debug, info, warn, error).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Relay access token for this session.
    #[arg(long, env = "HANDOFF_TOKEN", hide_env_values = true)]
    pub token: String,

    /// Principal (account) id the token belongs to.
    #[arg(long, env = "HANDOFF_PRINCIPAL")]
    pub principal: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Open a bridge, send a form request and print the response.
    Request {
        /// Note to attach to the request.
        #[arg(long)]
        note: Option<String>,
    },
    /// Wait for a form request and answer it.
    Respond {
        /// Note to attach to the response.
        #[arg(long)]
        note: Option<String>,
    },
    /// Print driver positions and order notes as they arrive.
    Watch {
        /// Driver route to subscribe to.
        #[arg(long)]
        route: Vec<String>,
    },
}

pub fn parse() -> Args {
    Args::parse()
}
