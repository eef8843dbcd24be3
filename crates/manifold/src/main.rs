// SPDX-FileCopyrightText: 2026 Manifold Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Manifold - LLM request orchestrator.
//!
//! Binary entry point: loads configuration, initializes tracing, and
//! dispatches to the subcommands. The bundled backends are offline demo
//! stand-ins; real deployments plug provider adapters in through the
//! `BackendFactory` seam.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

mod chat;
mod demo;
mod status;

use clap::{Parser, Subcommand};
use colored::Colorize;

/// Manifold - LLM request orchestrator.
#[derive(Parser, Debug)]
#[command(name = "manifold", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Launch an interactive chat session against the demo backends.
    Chat,
    /// Show the effective configuration and routing table.
    Status {
        /// Output structured JSON for scripting.
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match manifold_config::load_and_validate() {
        Ok(config) => config,
        Err(errors) => {
            manifold_config::render_errors(&errors);
            std::process::exit(1);
        }
    };

    init_tracing(&config.agent.log_level);

    let result = match cli.command {
        Some(Commands::Chat) => chat::run_chat(config).await,
        Some(Commands::Status { json }) => status::run_status(&config, json),
        None => {
            println!("manifold: use --help for available commands");
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("{}: {e}", "error".red());
        std::process::exit(1);
    }
}

/// Initializes the tracing subscriber with the given log level.
fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("manifold={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .init();
}

#[cfg(test)]
mod tests {
    #[test]
    fn binary_loads_config_defaults() {
        // No config file needed; compiled defaults must validate.
        let config =
            manifold_config::load_and_validate().expect("default config should be valid");
        assert_eq!(config.agent.name, "manifold");
    }
}
