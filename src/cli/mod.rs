//! CLI command handling
//!
//! Dispatches CLI commands and formats output.

use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use colored::Colorize;

use crate::client::{ApiClient, ApiStatus};
use crate::commands::Commands;
use crate::common::{logging, Config, Environment, Error, Result, Settings};
use crate::server;
use crate::testing::{self, registry, CancelFlag, Reporter, Selection, TestRunner, Verbosity};

/// Process exit codes
pub const EXIT_OK: i32 = 0;
pub const EXIT_FAILURE: i32 = 1;
pub const EXIT_INTERRUPTED: i32 = 130;

/// Dispatch a CLI command, returning the process exit code
pub async fn dispatch(command: Commands, config_path: Option<&Path>) -> Result<i32> {
    match command {
        Commands::Run {
            env,
            tests,
            quiet,
            yes,
            output_dir,
            no_save,
        } => {
            logging::init_cli(quiet);
            let config = Config::from_env(env, load_settings(config_path)?)?;

            if env == Environment::Production && !yes {
                let stdin = io::stdin();
                if !confirm_production(&mut stdin.lock(), &mut io::stdout())? {
                    println!("{}", "Tests cancelled by user.".cyan());
                    return Ok(EXIT_OK);
                }
            }

            let selection = if tests.is_empty() {
                Selection::All
            } else {
                Selection::Ids(tests)
            };
            let save_dir = (!no_save).then(|| {
                output_dir
                    .unwrap_or_else(|| PathBuf::from(&config.settings.output.results_dir))
            });

            run_suite(config, selection, quiet, save_dir).await
        }

        Commands::List => {
            logging::init_cli(true);
            list_tests();
            Ok(EXIT_OK)
        }

        Commands::Serve { env, host, port } => {
            let mut settings = load_settings(config_path)?;
            settings.apply_env_overrides(|name| std::env::var(name).ok())?;
            let _guard = logging::init_server(settings.server.debug);

            let mut config = Config::from_env(env, settings)?;
            if let Some(host) = host {
                config.settings.server.host = host;
            }
            if let Some(port) = port {
                config.settings.server.port = port;
            }

            println!(
                "{} Dashboard API on http://{}:{} ({})",
                "→".cyan(),
                config.settings.server.host,
                config.settings.server.port,
                config.environment.display_name()
            );
            server::start(config).await?;
            Ok(EXIT_OK)
        }

        Commands::Check { env, ping } => {
            logging::init_cli(false);
            let config = Config::from_env(env, load_settings(config_path)?)?;
            check(config, ping).await
        }
    }
}

fn load_settings(path: Option<&Path>) -> Result<Settings> {
    match path {
        Some(path) => Settings::load_from(path),
        None => Settings::load(),
    }
}

/// Ask for a typed `yes` before touching production
pub fn confirm_production<R: BufRead, W: Write>(input: &mut R, output: &mut W) -> Result<bool> {
    writeln!(
        output,
        "\n{}",
        "You are about to run tests against PRODUCTION. Only read operations will be executed."
            .red()
            .bold()
    )?;
    write!(
        output,
        "{}",
        "Are you sure? (type 'yes' to confirm): ".yellow()
    )?;
    output.flush()?;

    let mut answer = String::new();
    input.read_line(&mut answer)?;
    Ok(answer.trim().eq_ignore_ascii_case("yes"))
}

/// Stop the run at the next test boundary on Ctrl-C; a second Ctrl-C exits at once
fn install_interrupt_handler(flag: CancelFlag) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }
        eprintln!(
            "\n{}",
            "Interrupt received, stopping after the current request (Ctrl-C again to abort)"
                .yellow()
        );
        flag.cancel();

        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("{}", "Test execution interrupted by user".yellow());
            std::process::exit(EXIT_INTERRUPTED);
        }
    });
}

async fn run_suite(
    config: Config,
    selection: Selection,
    quiet: bool,
    save_dir: Option<PathBuf>,
) -> Result<i32> {
    let verbosity = if quiet {
        Verbosity::Quiet
    } else {
        Verbosity::Normal
    };
    let client = ApiClient::new(config.clone())?;
    let mut runner = TestRunner::new(client, Reporter::new(verbosity));
    install_interrupt_handler(runner.cancel_flag());

    let run = runner.run(&selection).await;

    let artifact = match &save_dir {
        Some(dir) => match runner.persist(&run, dir) {
            Ok(path) => Some(path),
            Err(e) => {
                tracing::error!(
                    error = %runner.client().redactor().redact(&e.to_string()),
                    "Failed to save results"
                );
                None
            }
        },
        None => None,
    };

    runner
        .reporter()
        .summary(&config, &run, &runner.state().context, artifact.as_deref());

    Ok(if run.interrupted {
        EXIT_INTERRUPTED
    } else if run.has_failures() {
        EXIT_FAILURE
    } else {
        EXIT_OK
    })
}

fn list_tests() {
    let all = registry();
    println!("\n{}", "Available Tests:".cyan());
    println!("{}", "========================================".cyan());

    for (category, cases) in testing::registry::categories(&all) {
        println!("\n{}", format!("{}:", category).yellow());
        for case in cases {
            let write = if case.is_write() {
                " [write]".red().to_string()
            } else {
                String::new()
            };
            println!(
                "  • {:<28} {:<6} {}{}",
                case.id,
                case.method.as_str(),
                case.endpoint.dimmed(),
                write
            );
        }
    }

    println!("\n{}", "Usage:".cyan());
    println!("  ffm-tester run --test <test_id>");
    println!("\nExample:");
    println!("  ffm-tester run --test create_smartlink");
}

async fn check(config: Config, ping: bool) -> Result<i32> {
    let masked = config.masked();
    println!("{} Configuration valid", "✓".green());
    println!("  Environment:      {}", masked.environment.to_string().bold());
    println!("  Base URL:         {}", masked.base_url);
    println!("  Management API:   {}", masked.manage_base);
    println!("  API key:          {}", masked.api_key);
    println!("  Issuer:           {}", masked.iss);
    println!(
        "  Write operations: {}",
        if masked.writes_allowed {
            "ENABLED".green()
        } else {
            "DISABLED".yellow()
        }
    );

    if !ping {
        return Ok(EXIT_OK);
    }

    let client = ApiClient::new(config)?;
    match client.health().await {
        ApiStatus::Connected => {
            println!("{} API reachable", "✓".green());
            Ok(EXIT_OK)
        }
        ApiStatus::Error => {
            println!("{} API answered with a server error", "⚠".yellow());
            Ok(EXIT_FAILURE)
        }
        ApiStatus::Disconnected => {
            println!("{} API unreachable", "✗".red());
            Err(Error::connection(&client.config().base_url, "health check failed"))
        }
    }
}
