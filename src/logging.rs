//! Tracing subscriber setup
//!
//! Logs go to stderr so that stdout carries only reports. With a log file the
//! output is written through a non-blocking appender instead; keep the returned
//! guard alive until exit so buffered lines are flushed.

use std::path::PathBuf;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::BoxMakeWriter;

pub const DEFAULT_LOG_LEVEL: &str = "warn";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogOptions {
    /// A level name or a full `EnvFilter` directive
    pub level: String,
    pub format: LogFormat,
    pub file: Option<PathBuf>,
}

impl Default for LogOptions {
    fn default() -> Self {
        Self {
            level: DEFAULT_LOG_LEVEL.to_string(),
            format: LogFormat::Text,
            file: None,
        }
    }
}

/// Build the filter for `level`. Accepts `WARNING`-style names as well as
/// `EnvFilter` directives; anything unparseable falls back to `warn`.
pub fn env_filter(level: &str) -> EnvFilter {
    let level = level.trim().to_ascii_lowercase();
    let directive = match level.as_str() {
        "warning" => "warn",
        "critical" | "fatal" => "error",
        other => other,
    };
    EnvFilter::try_new(directive).unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_LEVEL))
}

/// Install the global subscriber. Returns the appender guard when logging to a file.
pub fn init(options: &LogOptions) -> Option<WorkerGuard> {
    let (writer, guard) = match &options.file {
        Some(path) => {
            let dir = path
                .parent()
                .filter(|dir| !dir.as_os_str().is_empty())
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("."));
            let file_name = path
                .file_name()
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("mod-registry.log"));
            let appender = tracing_appender::rolling::never(dir, file_name);
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            (BoxMakeWriter::new(non_blocking), Some(guard))
        }
        None => (BoxMakeWriter::new(std::io::stderr), None),
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter(&options.level))
        .with_writer(writer)
        .with_ansi(options.file.is_none());

    let result = match options.format {
        LogFormat::Json => builder.json().with_target(true).try_init(),
        LogFormat::Text => builder.with_target(false).try_init(),
    };
    if let Err(e) = result {
        eprintln!("Failed to initialize logging: {}", e);
    }

    guard
}
