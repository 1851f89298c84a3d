//! hyperbridge CLI entry point.

use clap::{Parser, Subcommand};
use hyperbridge::config::BridgeSettings;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod cli;

/// hyperbridge - host bridge to the hyperstart guest agent
#[derive(Parser, Debug)]
#[command(name = "hyperbridge")]
#[command(about = "Host bridge to the hyperstart guest agent")]
#[command(version)]
struct Cli {
    /// Settings file (TOML). Defaults apply when omitted or missing.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Emit logs as JSON.
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Check the agent channel configuration.
    Validate(cli::validate::ValidateCmd),

    /// Translate host routes into guest routes.
    Routes(cli::routes::RoutesCmd),

    /// Stage (or remove) the pause container rootfs for a pod.
    Provision(cli::provision::ProvisionCmd),

    /// Start a pod against a live agent, then tear it down.
    Start(cli::start::StartCmd),
}

fn main() {
    let cli = Cli::parse();

    // Initialize logging based on RUST_LOG or default to warn
    init_logging(cli.json_logs);

    tracing::debug!(version = hyperbridge::VERSION, "starting hyperbridge");

    let settings = match &cli.config {
        Some(path) => match BridgeSettings::load(path) {
            Ok(s) => s,
            Err(e) => {
                tracing::error!(error = %e, "failed to load settings");
                eprintln!("Error: {}", e);
                std::process::exit(1);
            }
        },
        None => BridgeSettings::default(),
    };

    let result = match cli.command {
        Commands::Validate(cmd) => cmd.run(&settings),
        Commands::Routes(cmd) => cmd.run(),
        Commands::Provision(cmd) => cmd.run(&settings),
        Commands::Start(cmd) => cmd.run(&settings),
    };

    if let Err(e) = result {
        tracing::error!(error = %e, "command failed");
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Initialize the tracing subscriber.
fn init_logging(json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("hyperbridge=warn"));

    if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    }
}
