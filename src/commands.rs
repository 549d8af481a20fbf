//! CLI command definitions
//!
//! Defines the clap commands for the API tester CLI.

use clap::Subcommand;
use std::path::PathBuf;

use crate::common::Environment;

#[derive(Subcommand)]
pub enum Commands {
    /// Run the API test suite
    Run {
        /// Target environment
        #[arg(long, short, value_enum, default_value_t = Environment::Sandbox)]
        env: Environment,

        /// Run only these tests (repeatable): --test auth --test list_artists
        #[arg(long = "test", short = 't')]
        tests: Vec<String>,

        /// Print the summary only
        #[arg(long, short)]
        quiet: bool,

        /// Skip the production confirmation prompt
        #[arg(long, short = 'y')]
        yes: bool,

        /// Directory for the result artifact (default from config)
        #[arg(long)]
        output_dir: Option<PathBuf>,

        /// Do not write a result artifact
        #[arg(long)]
        no_save: bool,
    },

    /// List available tests grouped by category
    #[command(alias = "ls")]
    List,

    /// Start the dashboard proxy server
    Serve {
        /// Credentials profile the server runs with
        #[arg(long, short, value_enum, default_value_t = Environment::Sandbox)]
        env: Environment,

        /// Listen address (overrides config and FEATUREFM_SERVER_HOST)
        #[arg(long)]
        host: Option<String>,

        /// Listen port (overrides config and FEATUREFM_SERVER_PORT)
        #[arg(long, short)]
        port: Option<u16>,
    },

    /// Validate configuration and show what would be used
    Check {
        #[arg(long, short, value_enum, default_value_t = Environment::Sandbox)]
        env: Environment,

        /// Also probe the upstream health endpoint
        #[arg(long)]
        ping: bool,
    },
}
