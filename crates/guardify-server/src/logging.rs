//! Logging setup driven by the `[logging]` config section.
//!
//! `logging.environment = "production"` writes JSON to a daily rolling file
//! (picked up by log shipping) and compact lines to stdout for the journal.
//! Anything else gets pretty stdout output with span open/close events, which
//! shows how long scans, connects and alerts take while developing.

use std::path::PathBuf;
use std::sync::OnceLock;

use guardify_core::LoggingConfig;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// File name prefix of the rolling log files.
const LOG_FILE_PREFIX: &str = "guardify";

/// Non-blocking writers flush on drop; keep them for the whole process.
static GUARDS: OnceLock<(WorkerGuard, WorkerGuard)> = OnceLock::new();

/// Install the global subscriber.
///
/// `RUST_LOG` wins over `logging.level` when set.
///
/// # Errors
///
/// Returns an error if the filter directive cannot be parsed.
pub fn init(config: &LoggingConfig) -> anyhow::Result<()> {
    let env_filter = filter(config)?;

    if config.is_production() {
        init_production(env_filter, log_directory(config));
    } else {
        init_development(env_filter);
    }

    Ok(())
}

fn filter(config: &LoggingConfig) -> anyhow::Result<EnvFilter> {
    Ok(EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&config.level))?)
}

fn init_production(env_filter: EnvFilter, log_dir: PathBuf) {
    if let Err(e) = std::fs::create_dir_all(&log_dir) {
        eprintln!("Could not create log directory {}: {e}", log_dir.display());
    }

    let file_appender = RollingFileAppender::new(Rotation::DAILY, &log_dir, LOG_FILE_PREFIX);
    let (file_writer, file_guard) = tracing_appender::non_blocking(file_appender);
    let (stdout_writer, stdout_guard) = tracing_appender::non_blocking(std::io::stdout());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(file_writer)
                .with_current_span(true)
                .with_file(true)
                .with_line_number(true),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .compact()
                .with_writer(stdout_writer)
                .with_ansi(false),
        )
        .init();

    let _ = GUARDS.set((file_guard, stdout_guard));
}

fn init_development(env_filter: EnvFilter) {
    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .pretty()
                .with_file(true)
                .with_line_number(true)
                .with_span_events(FmtSpan::NEW | FmtSpan::CLOSE),
        )
        .init();
}

/// `logging.directory`, else `/var/log/guardify` on Linux and the platform
/// data directory elsewhere.
fn log_directory(config: &LoggingConfig) -> PathBuf {
    if let Some(dir) = &config.directory {
        return dir.clone();
    }

    #[cfg(target_os = "linux")]
    {
        PathBuf::from("/var/log/guardify")
    }
    #[cfg(not(target_os = "linux"))]
    {
        directories::ProjectDirs::from("", "", "guardify").map_or_else(
            || PathBuf::from("./logs"),
            |dirs| dirs.data_dir().join("logs"),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configured_directory_wins() {
        let config = LoggingConfig {
            directory: Some(PathBuf::from("/srv/guardify/logs")),
            ..LoggingConfig::default()
        };
        assert_eq!(log_directory(&config), PathBuf::from("/srv/guardify/logs"));
    }

    #[test]
    fn test_default_directory() {
        let dir = log_directory(&LoggingConfig::default());
        assert!(dir.ends_with("guardify") || dir.ends_with("logs"));
    }

    #[test]
    fn test_invalid_level_is_rejected() {
        if std::env::var_os("RUST_LOG").is_some() {
            return;
        }
        let config = LoggingConfig {
            level: "guardify=notalevel".to_string(),
            ..LoggingConfig::default()
        };
        assert!(filter(&config).is_err());
    }
}
