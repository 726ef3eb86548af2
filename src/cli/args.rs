use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "unionlayer")]
#[command(about = "Drive and inspect the layered inode engine")]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    #[command(about = "Replay a TOML script of layer operations against a fresh store")]
    Replay {
        #[arg(help = "Path to the operations script")]
        script: PathBuf,

        #[arg(long, help = "JSON output")]
        json: bool,

        #[arg(long, help = "Exit non-zero if any operation failed")]
        strict: bool,
    },
    #[command(about = "Hammer one inode with concurrent resolve/release pairs")]
    Stress {
        #[arg(short, long, default_value_t = 8, help = "Worker threads")]
        threads: usize,

        #[arg(short, long, default_value_t = 10_000, help = "Pairs per thread")]
        iterations: usize,

        #[arg(long, help = "Run a concurrent sweeper while the workers run")]
        sweep: bool,
    },
    #[command(about = "Manage configuration")]
    Config {
        #[command(subcommand)]
        action: Option<ConfigAction>,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    #[command(about = "Show current configuration values")]
    Show,
    #[command(about = "Show config file path")]
    Path,
}
