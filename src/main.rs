//! Feature.fm API tester
//!
//! Runs the API test suite against sandbox or production and serves the
//! dashboard proxy.

use std::path::PathBuf;

use clap::Parser;
use ffm_tester::{cli, commands::Commands};

#[derive(Parser)]
#[command(name = "ffm-tester", about = "Feature.fm API test harness and dashboard proxy")]
#[command(version, long_about = None)]
struct Cli {
    /// Settings file (default: platform config dir / config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let code = match cli::dispatch(cli.command, cli.config.as_deref()).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e}");
            cli::EXIT_FAILURE
        }
    };

    std::process::exit(code);
}
