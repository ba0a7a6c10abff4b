//! Diagnostic logging
//!
//! The library only emits `tracing` events (skipped flushes, failed sends,
//! store errors). Hosts that already run a subscriber get them there. Hosts that
//! don't can call [`init`] to write them to a daily file under
//! `$XDG_STATE_HOME/errbeacon/`, named `errbeacon.YYYY-MM-DD.log`.

use std::path::{Path, PathBuf};

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{Config, LoggingConfig};
use crate::error::{Error, Result};

const LOG_FILE_PREFIX: &str = "errbeacon";
const LOG_FILE_SUFFIX: &str = "log";

/// Log to the XDG state directory
pub fn init(config: &LoggingConfig) -> Result<LoggingGuard> {
    init_in(&Config::state_dir(), config)
}

/// Log to daily files in `log_dir`.
///
/// `RUST_LOG` overrides the configured level. When a global subscriber is
/// already set it is left in place and nothing is written to the file.
pub fn init_in(log_dir: &Path, config: &LoggingConfig) -> Result<LoggingGuard> {
    std::fs::create_dir_all(log_dir)?;

    let appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(LOG_FILE_PREFIX)
        .filename_suffix(LOG_FILE_SUFFIX)
        .build(log_dir)
        .map_err(|e| Error::Config(format!("failed to open log file in {:?}: {}", log_dir, e)))?;
    let (writer, worker) = tracing_appender::non_blocking(appender);

    let installed = tracing_subscriber::registry()
        .with(level_filter(&config.level))
        .with(
            fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true),
        )
        .try_init()
        .is_ok();

    if installed {
        tracing::info!(log_dir = %log_dir.display(), level = %config.level, "Logging initialized");
    } else {
        tracing::debug!("Global subscriber already set, errbeacon file logging not installed");
    }

    Ok(LoggingGuard {
        log_dir: log_dir.to_path_buf(),
        installed,
        _worker: worker,
    })
}

fn level_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
}

/// Initialize logging for tests (captured by the test harness)
pub fn init_test() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Keeps the background log writer alive; pending lines are flushed on drop.
pub struct LoggingGuard {
    log_dir: PathBuf,
    installed: bool,
    _worker: WorkerGuard,
}

impl LoggingGuard {
    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }

    /// False when another subscriber was already installed
    pub fn is_installed(&self) -> bool {
        self.installed
    }
}
