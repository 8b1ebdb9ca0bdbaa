//! Tracing setup for embedders.
//!
//! The engine emits structured events through `tracing` under `geolayer`
//! targets; hosts that already install a subscriber need nothing from this
//! module. [`init_logging`] is the batteries-included alternative: a compact
//! single-line format on stderr, optionally teed to a log file through a
//! non-blocking writer, filtered by `RUST_LOG` with a configurable fallback.

use std::io;
use std::path::PathBuf;

use tracing::Subscriber;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Registry};

/// Subscriber configuration.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Directory for the log file. `None` disables file output.
    pub directory: Option<PathBuf>,
    /// File name within the directory.
    pub file_name: String,
    /// Filter directive used when `RUST_LOG` is unset.
    pub default_filter: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            directory: None,
            file_name: "geolayer.log".to_string(),
            default_filter: "info".to_string(),
        }
    }
}

impl LogConfig {
    /// Enable file output into the given directory.
    pub fn with_directory(mut self, directory: impl Into<PathBuf>) -> Self {
        self.directory = Some(directory.into());
        self
    }

    /// Set the log file name.
    pub fn with_file_name(mut self, name: impl Into<String>) -> Self {
        self.file_name = name.into();
        self
    }

    /// Set the fallback filter directive.
    pub fn with_default_filter(mut self, filter: impl Into<String>) -> Self {
        self.default_filter = filter.into();
        self
    }

    /// Full path of the log file, if file output is enabled.
    pub fn log_path(&self) -> Option<PathBuf> {
        self.directory.as_ref().map(|d| d.join(&self.file_name))
    }
}

/// Keeps the background log writer alive.
///
/// Dropping the guard flushes and closes the file writer; hold it for the
/// lifetime of the process.
pub struct LoggingGuard {
    _file_guard: Option<WorkerGuard>,
}

/// Install the global subscriber described by `config`.
///
/// # Errors
///
/// Returns an error if the log directory cannot be created, or if a global
/// subscriber is already installed.
pub fn init_logging(config: &LogConfig) -> Result<LoggingGuard, io::Error> {
    let (subscriber, file_guard) = build_subscriber(config)?;
    subscriber
        .try_init()
        .map_err(|e| io::Error::new(io::ErrorKind::AlreadyExists, e))?;
    Ok(LoggingGuard {
        _file_guard: file_guard,
    })
}

/// Build the subscriber without installing it.
///
/// Split out so tests can scope it with [`tracing::subscriber::with_default`]
/// instead of touching the process-global dispatcher.
fn build_subscriber(
    config: &LogConfig,
) -> Result<(impl Subscriber + Send + Sync, Option<WorkerGuard>), io::Error> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.default_filter));

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(io::stderr)
        .compact();

    let (file_layer, file_guard) = match &config.directory {
        Some(directory) => {
            std::fs::create_dir_all(directory)?;
            let appender = tracing_appender::rolling::never(directory, &config.file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .compact();
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let subscriber = Registry::default()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer);
    Ok((subscriber, file_guard))
}
