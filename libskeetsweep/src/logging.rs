//! tracing-subscriber setup shared by the library and the CLI
//!
//! Logs always go to stderr: stdout carries the sweep summary, which may be
//! JSON consumed by another program. `RUST_LOG` overrides the level entirely.
//!
//! # Examples
//!
//! ```no_run
//! use libskeetsweep::logging::{LoggingConfig, LogFormat};
//!
//! let config = LoggingConfig::new(LogFormat::Json, "info".to_string(), false);
//! config.init();
//! ```

use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable text output (no colors, for piping)
    Text,
    /// Machine-parseable JSON (one JSON object per line)
    Json,
    /// Pretty-printed with colors (for development)
    Pretty,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            "pretty" => Ok(LogFormat::Pretty),
            _ => Err(format!(
                "Invalid log format: '{}'. Valid options: text, json, pretty",
                s
            )),
        }
    }
}

impl std::fmt::Display for LogFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogFormat::Text => write!(f, "text"),
            LogFormat::Json => write!(f, "json"),
            LogFormat::Pretty => write!(f, "pretty"),
        }
    }
}

/// Configuration for logging initialization
pub struct LoggingConfig {
    pub format: LogFormat,
    pub level: String,
    pub verbose: bool,
}

impl LoggingConfig {
    /// Create a new logging configuration
    ///
    /// * `format` - Log output format (text, json, or pretty)
    /// * `level` - Minimum log level (error, warn, info, debug, trace)
    /// * `verbose` - If true, defaults to debug level
    pub fn new(format: LogFormat, level: String, verbose: bool) -> Self {
        Self {
            format,
            level,
            verbose,
        }
    }

    /// Build a configuration from `SKEETSWEEP_LOG_FORMAT` and
    /// `SKEETSWEEP_LOG_LEVEL`, falling back to text output at `info`
    pub fn from_env() -> Self {
        let format = std::env::var("SKEETSWEEP_LOG_FORMAT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(LogFormat::Text);

        let level = std::env::var("SKEETSWEEP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        Self::new(format, level, false)
    }

    /// Filter applied when `RUST_LOG` is not set
    ///
    /// Our own crates log at the configured level. The HTTP stack stays at
    /// `warn` so connection chatter does not drown out sweep progress.
    fn filter_directive(&self) -> String {
        let level = if self.verbose { "debug" } else { self.level.as_str() };
        format!(
            "{level},libskeetsweep={level},skeetsweep={level},hyper=warn,hyper_util=warn,reqwest=warn,rustls=warn",
            level = level
        )
    }

    /// Install the global subscriber
    ///
    /// Returns `false` when one was already installed, e.g. by a test
    /// harness; the existing subscriber is left in place.
    pub fn init(&self) -> bool {
        use tracing_subscriber::EnvFilter;

        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(self.filter_directive()));
        let builder = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr);

        let installed = match self.format {
            LogFormat::Json => builder
                .json()
                .flatten_event(true)
                .with_target(true)
                .try_init(),
            LogFormat::Pretty => builder
                .pretty()
                .with_target(true)
                .with_line_number(true)
                .try_init(),
            LogFormat::Text => builder.with_target(false).with_ansi(false).try_init(),
        };
        installed.is_ok()
    }
}

/// Initialize logging with default settings
///
/// ```bash
/// export SKEETSWEEP_LOG_FORMAT=json
/// export SKEETSWEEP_LOG_LEVEL=debug
/// skeetsweep posts --dry-run
/// ```
pub fn init_default() -> bool {
    LoggingConfig::from_env().init()
}
