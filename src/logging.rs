//! Logging Module
//!
//! Structured logging with file output for diagnostics.

use std::path::{Path, PathBuf};

use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const LOG_FILE_PREFIX: &str = "whereareyou.log";

/// Initialize logging under the platform's local data directory
pub fn init() -> bool {
    init_in(&log_directory())
}

/// Install the global subscriber writing daily files into `log_dir`.
///
/// Returns `false` and touches nothing on disk when a global subscriber is
/// already installed, e.g. by an embedding host or an earlier call.
pub fn init_in(log_dir: &Path) -> bool {
    if tracing::dispatcher::has_been_set() {
        return false;
    }

    let _ = std::fs::create_dir_all(log_dir);
    let file_appender = RollingFileAppender::new(Rotation::DAILY, log_dir, LOG_FILE_PREFIX);

    #[cfg(debug_assertions)]
    let console_layer = Some(fmt::layer().with_target(true).pretty());
    #[cfg(not(debug_assertions))]
    let console_layer: Option<fmt::Layer<_>> = None;

    let subscriber = tracing_subscriber::registry()
        .with(env_filter())
        .with(
            fmt::layer()
                .with_ansi(false)
                .with_target(true)
                .with_writer(file_appender),
        )
        .with(console_layer);

    // Loses only to a concurrent initializer
    tracing::subscriber::set_global_default(subscriber).is_ok()
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(if cfg!(debug_assertions) {
            "debug,hyper=warn,reqwest=warn"
        } else {
            "info,hyper=warn,reqwest=warn"
        })
    })
}

pub fn log_directory() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("WhereAreYou")
        .join("logs")
}
