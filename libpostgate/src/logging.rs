//! Logging setup shared by the Postgate binaries
//!
//! Output always goes to stderr so stdout stays reserved for results
//! (run ids, JSON listings). Three formats are available:
//! - `text`: plain lines, for piping and journald
//! - `json`: one object per line, for log shippers
//! - `pretty`: multi-line with colors, for development
//!
//! ```no_run
//! use libpostgate::logging::{LogFormat, LoggingConfig};
//!
//! LoggingConfig::new(LogFormat::Json, "info".to_string(), false).init();
//! ```

use std::str::FromStr;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
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
        let name = match self {
            LogFormat::Text => "text",
            LogFormat::Json => "json",
            LogFormat::Pretty => "pretty",
        };
        f.write_str(name)
    }
}

pub struct LoggingConfig {
    pub format: LogFormat,
    pub level: String,
    pub verbose: bool,
}

impl LoggingConfig {
    pub fn new(format: LogFormat, level: String, verbose: bool) -> Self {
        Self {
            format,
            level,
            verbose,
        }
    }

    /// Settings for a command-line tool
    ///
    /// Reads `POSTGATE_LOG_FORMAT` and `POSTGATE_LOG_LEVEL`; `--verbose`
    /// forces debug level. One-shot tools default to `warn` so their stdout
    /// output is not drowned out, the daemon defaults to `info`.
    pub fn for_binary(verbose: bool, default_level: &str) -> Self {
        let format = std::env::var("POSTGATE_LOG_FORMAT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(LogFormat::Text);
        let level =
            std::env::var("POSTGATE_LOG_LEVEL").unwrap_or_else(|_| default_level.to_string());
        Self::new(format, level, verbose)
    }

    /// Filter directive used when `RUST_LOG` is unset
    ///
    /// HTTP and database internals are held at `warn` so request-level noise
    /// does not bury pipeline events.
    pub fn directive(&self) -> String {
        let level = if self.verbose { "debug" } else { self.level.as_str() };
        format!("{},hyper=warn,reqwest=warn,sqlx=warn", level)
    }

    fn filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(self.directive()))
    }

    /// Install the global subscriber
    ///
    /// A second call is a no-op, which keeps tests and embedded uses from
    /// panicking.
    pub fn init(&self) {
        let installed = match self.format {
            LogFormat::Json => tracing_subscriber::fmt()
                .json()
                .with_env_filter(self.filter())
                .with_writer(std::io::stderr)
                .with_current_span(true)
                .flatten_event(true)
                .with_target(true)
                .try_init(),
            LogFormat::Pretty => tracing_subscriber::fmt()
                .pretty()
                .with_env_filter(self.filter())
                .with_writer(std::io::stderr)
                .with_line_number(true)
                .with_file(true)
                .try_init(),
            LogFormat::Text => tracing_subscriber::fmt()
                .with_env_filter(self.filter())
                .with_writer(std::io::stderr)
                .with_target(false)
                .try_init(),
        };

        if installed.is_err() {
            tracing::debug!("Logging subscriber already installed");
        }
    }
}

/// Initialize logging with `info` as the default level
pub fn init_default() {
    LoggingConfig::for_binary(false, "info").init();
}
