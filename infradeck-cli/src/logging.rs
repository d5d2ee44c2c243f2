//! Log sinks: a daily rolling file under the infradeck home directory, plus
//! stderr for the non-interactive commands.

use std::path::PathBuf;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

pub const LOG_ENV: &str = "INFRADECK_LOG";
pub const HOME_ENV: &str = "INFRADECK_HOME";
const DEFAULT_FILTER: &str = "infradeck=info,infradeck_core=info";

/// `INFRADECK_HOME`, else `~/.infradeck`
pub fn infradeck_home() -> PathBuf {
    if let Some(dir) = std::env::var_os(HOME_ENV).filter(|v| !v.is_empty()) {
        return PathBuf::from(dir);
    }
    dirs::home_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(".infradeck")
}

pub fn logs_dir() -> PathBuf {
    infradeck_home().join("logs")
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Install the global subscriber. In TUI mode nothing reaches the terminal;
/// otherwise warnings also go to stderr. Keep the returned guard alive until
/// exit so buffered lines are flushed.
pub fn init(tui: bool) -> Option<WorkerGuard> {
    let mut guard = None;
    let dir = logs_dir();
    let file_layer = match std::fs::create_dir_all(&dir) {
        Ok(()) => {
            let appender = tracing_appender::rolling::daily(&dir, "infradeck.log");
            let (writer, g) = tracing_appender::non_blocking(appender);
            guard = Some(g);
            Some(
                fmt::layer()
                    .with_writer(writer)
                    .with_ansi(false)
                    .with_filter(env_filter()),
            )
        }
        Err(err) => {
            if !tui {
                eprintln!("Warning: failed to create log directory {}: {}", dir.display(), err);
            }
            None
        }
    };

    let console_layer = (!tui).then(|| {
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
            .without_time()
            .with_filter(EnvFilter::new("warn"))
    });

    let result = tracing_subscriber::registry()
        .with(file_layer)
        .with(console_layer)
        .try_init();
    if let Err(err) = result {
        eprintln!("Warning: logging already initialised: {}", err);
    }
    guard
}
