//! Hubtrack CLI - Track the packages available in Helm repositories

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

mod commands;
mod display;
mod error;
mod exit_codes;

use commands::inspect::InspectArgs;
use commands::track::TrackArgs;

#[derive(Parser)]
#[command(name = "hubtrack")]
#[command(version)]
#[command(about = "Track the packages available in Helm repositories", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (defaults to the user config directory)
    #[arg(long, global = true, env = "HUBTRACK_CONFIG")]
    config: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    log_json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// List the packages available in a repository and what to (un)register
    Track(TrackArgs),

    /// Load a single chart and print the package it produces
    Inspect(InspectArgs),
}

fn init_tracing(log_json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

#[tokio::main]
async fn main() {
    // Setup miette for nice error display
    miette::set_panic_hook();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let code = if e.use_stderr() {
                exit_codes::USAGE_ERROR
            } else {
                exit_codes::SUCCESS
            };
            let _ = e.print();
            std::process::exit(code);
        }
    };

    init_tracing(cli.log_json);

    let config = cli.config.as_deref();
    let result = match cli.command {
        Commands::Track(args) => commands::track::run(args, config).await,
        Commands::Inspect(args) => commands::inspect::run(args, config).await,
    };

    if let Err(err) = result {
        let code = err.exit_code();
        eprintln!("{:?}", miette::Report::new(err));
        std::process::exit(code);
    }
}
