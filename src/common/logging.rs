//! Logging and tracing configuration
//!
//! Provides structured logging for both CLI and server modes.
//! The server also writes a JSON log file since it runs unattended.

use tracing::Subscriber;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt, layer::SubscriberExt, registry::LookupSpan, util::SubscriberInitExt, EnvFilter, Layer,
};

use super::paths;

/// Library modules kept at warn unless `RUST_LOG` says otherwise
const NOISY_MODULES: &[&str] = &["hyper", "hyper_util", "reqwest", "h2", "tower_http"];

fn build_filter(base: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let mut directives = String::from(base);
        for module in NOISY_MODULES {
            directives.push_str(&format!(",{}=warn", module));
        }
        EnvFilter::new(directives)
    })
}

/// Compact stderr output for the server stacks
fn server_stderr_layer<S>() -> impl Layer<S>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .compact()
}

/// Initialize tracing for the CLI (stderr logging)
///
/// Logs are controlled by the `RUST_LOG` environment variable.
/// Default level is INFO for this crate (WARN when quiet), WARN for dependencies.
pub fn init_cli(quiet: bool) {
    let base = if quiet {
        "ffm_tester=warn,warn"
    } else {
        "ffm_tester=info,warn"
    };

    let _ = tracing_subscriber::registry()
        .with(build_filter(base))
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .without_time()
                .compact(),
        )
        .try_init();
}

/// Initialize tracing for the proxy server (stderr + rolling JSON file)
///
/// The file lives at `<data dir>/logs/server.log.<date>`. The returned guard
/// must be held for the lifetime of the server so buffered lines get flushed.
pub fn init_server(debug: bool) -> Option<WorkerGuard> {
    let base = if debug {
        "ffm_tester=debug,info"
    } else {
        "ffm_tester=info,warn"
    };

    if let Some(log_dir) = paths::log_dir() {
        if std::fs::create_dir_all(&log_dir).is_ok() {
            let appender = tracing_appender::rolling::daily(&log_dir, "server.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);

            let file_layer = fmt::layer()
                .json()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(true)
                .with_file(true)
                .with_line_number(true);

            let _ = tracing_subscriber::registry()
                .with(build_filter(base))
                .with(file_layer)
                .with(server_stderr_layer())
                .try_init();

            return Some(guard);
        }
        eprintln!("Warning: Could not create log directory {}", log_dir.display());
    }

    // Fallback: stderr only
    let _ = tracing_subscriber::registry()
        .with(build_filter(base))
        .with(server_stderr_layer())
        .try_init();

    None
}
