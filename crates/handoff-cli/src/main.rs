//! handoff: command-line front end for the pairing bridge and the relay
//! streams.

mod cli;
mod commands;
mod session;

use std::process::ExitCode;

use handoff_common::HandoffError;
use handoff_config::{HandoffConfig, LogLevel};
use handoff_realtime::RealtimeCredential;
use tracing_subscriber::EnvFilter;

use crate::cli::{Args, Command};
use crate::session::Session;

/// `RUST_LOG` wins, then `--log-level`, then the config file.
fn init_logging(override_level: Option<&str>, configured: LogLevel) {
    let fallback = override_level.unwrap_or(configured.as_directive());
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(fallback))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn run(args: Args, config: HandoffConfig) -> Result<(), HandoffError> {
    let credential = RealtimeCredential::new(args.token, args.principal);
    let mut session = Session::connect(config, credential).await?;

    let result = tokio::select! {
        result = dispatch(&mut session, args.command) => result,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Interrupted, shutting down");
            Ok(())
        }
    };

    session.shutdown().await;
    result
}

async fn dispatch(session: &mut Session, command: Command) -> Result<(), HandoffError> {
    match command {
        Command::Request { note } => commands::request(session.bridge()?, note).await,
        Command::Respond { note } => commands::respond(session.bridge()?, note).await,
        Command::Watch { route } => commands::watch(&session.relay, &route).await,
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = cli::parse();

    let config = match handoff_config::load_config(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("handoff: {e}");
            return ExitCode::FAILURE;
        }
    };
    init_logging(args.log_level.as_deref(), config.logging.level);
    tracing::debug!(?config, "Config loaded");

    match run(args, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "handoff failed");
            ExitCode::FAILURE
        }
    }
}
