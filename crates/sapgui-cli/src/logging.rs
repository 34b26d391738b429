use anyhow::Result;
use std::env;
use std::path::PathBuf;
use tracing::{warn, Level};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Level from `LOG_LEVEL`, defaulting to INFO.
pub fn log_level() -> Level {
    env::var("LOG_LEVEL")
        .map(|level| parse_level(&level))
        .unwrap_or(Level::INFO)
}

fn parse_level(level: &str) -> Level {
    match level.to_lowercase().as_str() {
        "error" => Level::ERROR,
        "warn" => Level::WARN,
        "info" => Level::INFO,
        "debug" => Level::DEBUG,
        "trace" => Level::TRACE,
        _ => Level::INFO,
    }
}

/// `SAPGUI_LOG_DIR`, else `<data local dir>/sapgui-session/logs`.
pub fn log_dir() -> PathBuf {
    if let Ok(custom_dir) = env::var("SAPGUI_LOG_DIR") {
        return PathBuf::from(custom_dir);
    }
    dirs::data_local_dir()
        .unwrap_or_else(env::temp_dir)
        .join("sapgui-session")
        .join("logs")
}

/// Installs stderr and daily-rolling file logging.
///
/// The returned guard flushes the file writer and must live until exit.
pub fn init_logging() -> Result<WorkerGuard> {
    let log_level = log_level();
    let log_dir = log_dir();
    let dir_ok = std::fs::create_dir_all(&log_dir);

    let file_appender = tracing_appender::rolling::daily(&log_dir, "sapgui.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(false)
                .with_filter(EnvFilter::from_default_env().add_directive(log_level.into())),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(file_writer)
                .with_ansi(false)
                .with_target(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true)
                .with_filter(EnvFilter::from_default_env().add_directive(log_level.into())),
        )
        .try_init()?;

    if let Err(e) = dir_ok {
        warn!("Failed to create log directory {}: {}", log_dir.display(), e);
    }
    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_levels_fall_back_to_info() {
        assert_eq!(parse_level("DEBUG"), Level::DEBUG);
        assert_eq!(parse_level("warn"), Level::WARN);
        assert_eq!(parse_level("verbose"), Level::INFO);
    }
}
