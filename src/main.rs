//! Thoughtline CLI binary entry point.

use clap::Parser;
use thoughtline::cli::{Cli, Commands};
use thoughtline::error::ThoughtlineError;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Replay(args) => thoughtline::cli::handle_replay(args).await,
        Commands::Events(args) => thoughtline::cli::handle_events(args).await,
    };

    match result {
        Ok(()) => {}
        Err(ThoughtlineError::Cancelled) => {
            eprintln!("Cancelled");
            std::process::exit(130);
        }
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    }
}
