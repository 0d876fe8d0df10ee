//! Logging setup for the keepsake binary.
//!
//! Console output goes to stderr so that stdout only carries run summaries.
//! Two daily-rotating files are written to the log directory:
//!
//! - `keepsake.<date>.log`: everything at the active filter level
//! - `failures.<date>.log`: warnings and errors raised by keepsake itself,
//!   i.e. the record that failed preservation or validation and why
//!
//! The log directory is the `--log-dir` option (or `KEEPSAKE_LOG_DIR`) when
//! given, otherwise `<data_dir>/keepsake/logs`.
//!
//! ```no_run
//! keepsake::logging::init(None).expect("Failed to initialize logging");
//! tracing::info!(catalog = "Conservation", "Preservation run started");
//! ```

use anyhow::{Context as _, Result};
use std::path::{Path, PathBuf};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    EnvFilter, Layer as _, fmt, layer::SubscriberExt as _, util::SubscriberInitExt as _,
};

/// Number of rotated log files kept per appender.
const MAX_LOG_FILES: usize = 10;

/// Filter used when `RUST_LOG` is unset: keepsake at `info`, dependencies
/// only when they warn.
pub const DEFAULT_FILTER: &str = "warn,keepsake=info";

/// Filter of the failures file.
const FAILURE_FILTER: &str = "off,keepsake=warn";

/// Gets the platform log directory
///
/// Returns:
/// - Windows: `%APPDATA%/keepsake/logs`
/// - macOS: `~/Library/Application Support/keepsake/logs`
/// - Linux: `~/.local/share/keepsake/logs`
///
/// # Errors
///
/// Returns error if the platform has no data directory.
pub fn get_log_dir() -> Result<PathBuf> {
    let base_dir = dirs::data_dir().context("Failed to determine data directory")?;
    Ok(base_dir.join("keepsake").join("logs"))
}

/// The directory logs go to, created if missing.
///
/// # Errors
///
/// Returns error if no data directory is known or the directory cannot be created.
pub fn resolve_log_dir(override_dir: Option<&Path>) -> Result<PathBuf> {
    let log_dir = match override_dir {
        Some(dir) => dir.to_path_buf(),
        None => get_log_dir()?,
    };

    std::fs::create_dir_all(&log_dir)
        .with_context(|| format!("Failed to create log directory: {}", log_dir.display()))?;
    Ok(log_dir)
}

fn daily_appender(log_dir: &Path, prefix: &str) -> Result<RollingFileAppender> {
    RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .max_log_files(MAX_LOG_FILES)
        .filename_prefix(prefix)
        .filename_suffix("log")
        .build(log_dir)
        .with_context(|| format!("Failed to create {prefix} log appender"))
}

/// Initializes console and file logging.
///
/// The filter is [`DEFAULT_FILTER`] unless `RUST_LOG` is set
/// (e.g. `RUST_LOG=keepsake=debug` to see every packed object).
///
/// # Errors
///
/// Returns error if the log directory cannot be created, the file appenders
/// fail, or a subscriber is already installed.
pub fn init(log_dir: Option<&Path>) -> Result<()> {
    let log_dir = resolve_log_dir(log_dir)?;
    let all_logs_appender = daily_appender(&log_dir, "keepsake")?;
    let failure_appender = daily_appender(&log_dir, "failures")?;

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(DEFAULT_FILTER))
        .context("Failed to create env filter")?;

    let console_layer = fmt::layer()
        .with_target(false)
        .with_thread_names(true)
        .with_writer(std::io::stderr)
        .compact();

    let all_logs_layer = fmt::layer()
        .with_target(true)
        .with_thread_names(true)
        .with_line_number(true)
        .with_file(true)
        .with_ansi(false)
        .with_writer(all_logs_appender);

    let failure_layer = fmt::layer()
        .with_target(true)
        .with_thread_names(true)
        .with_ansi(false)
        .with_writer(failure_appender)
        .with_filter(EnvFilter::new(FAILURE_FILTER));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(all_logs_layer)
        .with(failure_layer)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    tracing::info!("Logging initialized, log directory: {}", log_dir.display());

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_get_log_dir() {
        let log_dir = get_log_dir().expect("Failed to get log dir");
        assert!(log_dir.ends_with("keepsake/logs") || log_dir.ends_with("keepsake\\logs"));
    }

    #[test]
    fn test_override_dir_is_created() {
        let dir = TempDir::new().unwrap();
        let wanted = dir.path().join("runs").join("logs");

        let resolved = resolve_log_dir(Some(&wanted)).unwrap();

        assert_eq!(resolved, wanted);
        assert!(wanted.is_dir());
    }

    #[test]
    fn test_filters_parse() {
        assert!(EnvFilter::try_new(DEFAULT_FILTER).is_ok());
        assert!(EnvFilter::try_new(FAILURE_FILTER).is_ok());
    }
}
