//! Structured logging using the tracing crate.
//!
//! Output goes to stderr so that `synth` can print the template on stdout.
//! `RUST_LOG` takes precedence over both the verbosity flags and the config file.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;
use crate::error::{Error, Result};

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl LogFormat {
    pub fn parse(value: &str) -> Result<Self> {
        match value.to_ascii_lowercase().as_str() {
            "pretty" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            other => Err(Error::InvalidConfig {
                key: "logging.log_format".to_string(),
                message: format!("unknown format '{other}', expected 'pretty' or 'json'"),
            }),
        }
    }
}

/// Builder for the global subscriber.
#[derive(Debug, Clone)]
pub struct LoggingBuilder {
    level: String,
    format: LogFormat,
    ansi: bool,
    with_target: bool,
}

impl Default for LoggingBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl LoggingBuilder {
    pub fn new() -> Self {
        Self {
            level: "warn".to_string(),
            format: LogFormat::Pretty,
            ansi: true,
            with_target: false,
        }
    }

    /// Create a builder from the `[logging]` section.
    pub fn from_config(config: &LoggingConfig) -> Result<Self> {
        Ok(Self::new()
            .with_level(config.log_level.clone())
            .with_format(LogFormat::parse(&config.log_format)?))
    }

    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.level = level.into();
        self
    }

    /// Raise the level from `-v` flags; zero keeps the configured level.
    pub fn with_verbosity(mut self, verbosity: u8) -> Self {
        let level = match verbosity {
            0 => return self,
            1 => "info",
            2 => "debug",
            _ => "trace",
        };
        self.level = level.to_string();
        self.with_target = verbosity >= 3;
        self
    }

    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_ansi(mut self, enabled: bool) -> Self {
        self.ansi = enabled;
        self
    }

    pub fn level(&self) -> &str {
        &self.level
    }

    pub fn format(&self) -> LogFormat {
        self.format
    }

    fn build_filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(&self.level))
            .unwrap_or_else(|_| EnvFilter::new("warn"))
    }

    /// Install the global subscriber.
    pub fn init(self) -> Result<()> {
        let env_filter = self.build_filter();
        match self.format {
            LogFormat::Pretty => {
                let layer = tracing_subscriber::fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_ansi(self.ansi)
                    .with_target(self.with_target);
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(layer)
                    .try_init()
                    .map_err(|e| Error::Config(e.to_string()))
            }
            LogFormat::Json => {
                let layer = tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_target(self.with_target);
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(layer)
                    .try_init()
                    .map_err(|e| Error::Config(e.to_string()))
            }
        }
    }
}

/// Initialize logging from the config and the number of `-v` flags.
pub fn init(verbosity: u8, config: &LoggingConfig, ansi: bool) -> Result<()> {
    LoggingBuilder::from_config(config)?
        .with_verbosity(verbosity)
        .with_ansi(ansi)
        .init()
}
