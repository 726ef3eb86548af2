use clap::Parser;

mod cli;
mod commands;

use cli::{Args, Commands};
use unionlayer::config::load_config;

const LOG_ENV: &str = "UNIONLAYER_LOG";

#[tokio::main]
async fn main() {
    match run().await {
        Ok(code) => {
            std::process::exit(code);
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}

async fn run() -> unionlayer::Result<i32> {
    let args = Args::parse();

    let filter = match std::env::var(LOG_ENV) {
        Ok(filter) => filter,
        Err(_) => load_config()
            .map(|config| config.log.get_filter())
            .unwrap_or_else(|_| "info".to_string()),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match args.command {
        Commands::Replay {
            script,
            json,
            strict,
        } => commands::run_replay(&script, json, strict).await,
        Commands::Stress {
            threads,
            iterations,
            sweep,
        } => {
            commands::run_stress(threads, iterations, sweep)?;
            Ok(0)
        }
        Commands::Config { action } => {
            commands::handle_config_command(action)?;
            Ok(0)
        }
    }
}
