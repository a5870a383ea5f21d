//! Structured logging for Ventus
//!
//! Console output (pretty or JSONL, always on stderr) plus optional JSONL
//! files with rotation, filtered by `RUST_LOG` or the configured levels.
//!
//! # Quick Start
//!
//! ```ignore
//! use ventus_logging::{LogConfig, VentusSubscriberBuilder};
//!
//! // Keep the guard alive for as long as file output should be flushed
//! let _guard = VentusSubscriberBuilder::new()
//!     .with_config(LogConfig::development())
//!     .try_init()?;
//! ```
//!
//! # Run Context
//!
//! Use [`RunContextGuard`] to tag everything logged for one attestation run:
//!
//! ```ignore
//! use ventus_logging::{RunContextGuard, layers::run_span};
//!
//! let _guard = RunContextGuard::new(control.id(), &config.key_tag);
//! run_span().in_scope(|| tracing::info!("Signing"));
//! ```

pub mod config;
pub mod context;
pub mod layers;

pub use config::{ConsoleConfig, ConsoleFormat, FileConfig, JsonFormat, LogConfig, RotationStrategy};
pub use context::{RunContextData, RunContextGuard};
pub use layers::{RunContextLayer, run_span};

use std::fs::{self, File};

use thiserror::Error;
use tracing::Subscriber;
use tracing::level_filters::LevelFilter;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::{InitError, RollingFileAppender, Rotation};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::{EnvFilter, Layer, Registry, layer::SubscriberExt, util::SubscriberInitExt};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync + 'static>;

/// Errors raised while setting up logging
#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("invalid log filter: {0}")]
    InvalidFilter(String),

    #[error("log file error: {0}")]
    Io(#[from] std::io::Error),

    #[error("log file appender error: {0}")]
    Appender(#[from] InitError),

    #[error("a global subscriber is already set")]
    AlreadyInitialized,
}

/// Builder for the Ventus logging subscriber
///
/// Defaults to JSONL on the console. Use `LogConfig::development()` for
/// human-readable output.
pub struct VentusSubscriberBuilder {
    config: LogConfig,
}

impl VentusSubscriberBuilder {
    pub fn new() -> Self {
        Self {
            config: LogConfig::default(),
        }
    }

    /// Use a specific configuration
    pub fn with_config(mut self, config: LogConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the base log level
    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.config.level = level.into();
        self
    }

    /// Enable or disable console output
    pub fn with_console(mut self, enabled: bool) -> Self {
        self.config.console.enabled = enabled;
        self
    }

    /// Configure file output
    pub fn with_file_output(mut self, config: FileConfig) -> Self {
        self.config.file = Some(config);
        self
    }

    pub fn config(&self) -> &LogConfig {
        &self.config
    }

    /// Assemble the subscriber without installing it
    ///
    /// The returned guard flushes file output when dropped; it is `None`
    /// when file output is off.
    pub fn build(
        self,
    ) -> Result<(impl Subscriber + Send + Sync + 'static, Option<WorkerGuard>), LoggingError> {
        let env_filter = EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(self.config.directives()))
            .map_err(|e| LoggingError::InvalidFilter(e.to_string()))?;

        let mut layers: Vec<BoxedLayer> = Vec::new();
        let mut guard = None;

        if self.config.console.enabled {
            layers.push(self.console_layer()?);
        }

        if let Some(file_config) = &self.config.file {
            let (writer, file_guard) = file_writer(file_config)?;
            layers.push(json_layer(&self.config.json, writer));
            guard = Some(file_guard);
        }

        let subscriber = Registry::default()
            .with(layers)
            .with(RunContextLayer::new())
            .with(env_filter);

        Ok((subscriber, guard))
    }

    /// Install the subscriber globally
    ///
    /// Keep the returned guard alive for the duration of the program when
    /// file output is configured.
    pub fn try_init(self) -> Result<Option<WorkerGuard>, LoggingError> {
        let (subscriber, guard) = self.build()?;
        subscriber
            .try_init()
            .map_err(|_| LoggingError::AlreadyInitialized)?;
        Ok(guard)
    }

    fn console_layer(&self) -> Result<BoxedLayer, LoggingError> {
        let console = &self.config.console;
        let layer = match console.format {
            ConsoleFormat::Json => json_layer(&self.config.json, std::io::stderr),
            ConsoleFormat::Pretty => tracing_subscriber::fmt::layer()
                .pretty()
                .with_ansi(console.ansi)
                .with_writer(std::io::stderr)
                .boxed(),
            ConsoleFormat::Compact => tracing_subscriber::fmt::layer()
                .compact()
                .with_ansi(console.ansi)
                .with_writer(std::io::stderr)
                .boxed(),
        };

        match &console.level {
            Some(level) => {
                let level: LevelFilter = level
                    .parse()
                    .map_err(|_| LoggingError::InvalidFilter(format!("unknown console level {level:?}")))?;
                Ok(layer.with_filter(level).boxed())
            }
            None => Ok(layer),
        }
    }
}

impl Default for VentusSubscriberBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// One JSON object per event, written to `writer`
fn json_layer<W>(format: &JsonFormat, writer: W) -> BoxedLayer
where
    W: for<'writer> MakeWriter<'writer> + Send + Sync + 'static,
{
    tracing_subscriber::fmt::layer()
        .json()
        .with_current_span(format.current_span)
        .with_span_list(format.span_list)
        .flatten_event(format.flatten_events)
        .with_file(format.location)
        .with_line_number(format.location)
        .with_thread_ids(format.thread_info)
        .with_thread_names(format.thread_info)
        .with_writer(writer)
        .boxed()
}

/// Non-blocking writer for the configured log file
///
/// `Never` truncates a single `<prefix>.log`; the rotating strategies append
/// to dated `<prefix>.<date>.jsonl` files.
fn file_writer(file_config: &FileConfig) -> Result<(NonBlocking, WorkerGuard), LoggingError> {
    fs::create_dir_all(&file_config.directory)?;

    let rotation = match file_config.rotation {
        RotationStrategy::Never => {
            let path = file_config.directory.join(format!("{}.log", file_config.prefix));
            return Ok(tracing_appender::non_blocking(File::create(path)?));
        }
        RotationStrategy::Daily => Rotation::DAILY,
        RotationStrategy::Hourly => Rotation::HOURLY,
    };

    let mut builder = RollingFileAppender::builder()
        .rotation(rotation)
        .filename_prefix(&file_config.prefix)
        .filename_suffix("jsonl");
    if let Some(max_files) = file_config.max_files {
        builder = builder.max_log_files(max_files);
    }
    let appender = builder.build(&file_config.directory)?;
    Ok(tracing_appender::non_blocking(appender))
}

/// Initialize logging for tests; later calls are no-ops
pub fn init_testing() {
    let _ = VentusSubscriberBuilder::new()
        .with_config(LogConfig::testing())
        .try_init();
}
