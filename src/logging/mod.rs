//! Logging system initialization and configuration
//!
//! Uses the tracing ecosystem for structured logging with support for:
//! - Environment variable override (TABGRID_LOG)
//! - Console output in pretty, compact or JSON format
//! - File output with daily rotation
//! - In-memory log buffer for hosts

pub mod layers;

pub use layers::{LogBuffer, LogEntry};

use crate::config::LoggingConfig;
use crate::error::{Result, TabGridError};
use std::path::PathBuf;
use tracing::Level;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

use layers::LogBufferLayer;

/// Environment variable holding a filter directive
pub const LOG_ENV_VAR: &str = "TABGRID_LOG";

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
    Compact,
}

impl LogFormat {
    /// Unknown formats fall back to pretty
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" => LogFormat::Json,
            "compact" => LogFormat::Compact,
            _ => LogFormat::Pretty,
        }
    }
}

/// Parse log level from string
pub fn parse_level(s: &str) -> Level {
    match s.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" | "warning" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

/// Get the default log directory path
fn default_log_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("tabgrid")
        .join("logs")
}

fn env_filter(config: &LoggingConfig) -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV_VAR).unwrap_or_else(|_| {
        let level = parse_level(&config.level);
        EnvFilter::new(format!("tabgrid={}", level.as_str().to_lowercase()))
    })
}

type BoxedLayer<S> = Box<dyn Layer<S> + Send + Sync + 'static>;

fn console_layer<S>(config: &LoggingConfig) -> BoxedLayer<S>
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
{
    let base = fmt::layer()
        .with_target(true)
        .with_level(true)
        .with_file(config.file_line)
        .with_line_number(config.file_line);

    match (LogFormat::parse(&config.format), config.timestamps) {
        (LogFormat::Json, _) => base.json().boxed(),
        (LogFormat::Compact, true) => base.compact().boxed(),
        (LogFormat::Compact, false) => base.compact().without_time().boxed(),
        (LogFormat::Pretty, true) => base.with_ansi(true).boxed(),
        (LogFormat::Pretty, false) => base.with_ansi(true).without_time().boxed(),
    }
}

fn file_layer<S>(config: &LoggingConfig) -> Option<BoxedLayer<S>>
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
{
    if !config.file_output {
        return None;
    }

    let log_dir = config.file_path.clone().unwrap_or_else(default_log_dir);
    if let Err(e) = std::fs::create_dir_all(&log_dir) {
        eprintln!("Warning: Failed to create log directory {:?}: {}", log_dir, e);
        return None;
    }

    let appender = RollingFileAppender::new(Rotation::DAILY, &log_dir, "tabgrid.log");
    Some(
        fmt::layer()
            .with_writer(appender)
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .with_ansi(false)
            .with_span_events(FmtSpan::CLOSE)
            .boxed(),
    )
}

/// Initialize the logging system
///
/// Returns a `LogBuffer` handle holding the most recent events. Fails when
/// a global subscriber is already installed.
pub fn init_logging(config: &LoggingConfig) -> Result<LogBuffer> {
    let (buffer_layer, log_buffer) = LogBufferLayer::new(config.buffer_size);

    tracing_subscriber::registry()
        .with(env_filter(config))
        .with(console_layer(config))
        .with(file_layer(config))
        .with(buffer_layer)
        .try_init()
        .map_err(|e| TabGridError::Logging(e.to_string()))?;

    tracing::info!("Logging initialized");
    tracing::debug!(
        level = %config.level,
        format = %config.format,
        file_output = config.file_output,
        "Logging configuration"
    );

    Ok(log_buffer)
}
