//! Logging setup shared by the Skypost binaries
//!
//! All output goes to stderr so stdout stays clean for piping. The format is
//! chosen by `SKYPOST_LOG_FORMAT` (text, json, pretty) and the level by
//! `SKYPOST_LOG_LEVEL` or `RUST_LOG`.
//!
//! ```no_run
//! use libskypost::logging::{LoggingConfig, LogFormat};
//!
//! LoggingConfig::new(LogFormat::Json, "info".to_string(), false).init();
//! ```

use std::str::FromStr;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable text output (no colors, for piping)
    Text,
    /// One JSON object per line
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

pub struct LoggingConfig {
    pub format: LogFormat,
    pub level: String,
    pub verbose: bool,
}

impl LoggingConfig {
    /// `verbose` forces the debug level unless `RUST_LOG` is set
    pub fn new(format: LogFormat, level: String, verbose: bool) -> Self {
        Self {
            format,
            level,
            verbose,
        }
    }

    /// Build from `SKYPOST_LOG_FORMAT` / `SKYPOST_LOG_LEVEL`, falling back to
    /// text output at `default_level`
    pub fn from_env(default_level: &str, verbose: bool) -> Self {
        let format = std::env::var("SKYPOST_LOG_FORMAT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(LogFormat::Text);

        let level =
            std::env::var("SKYPOST_LOG_LEVEL").unwrap_or_else(|_| default_level.to_string());

        Self::new(format, level, verbose)
    }

    fn filter(&self) -> EnvFilter {
        let level = if self.verbose { "debug" } else { self.level.as_str() };
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
    }

    /// Install the global subscriber
    ///
    /// # Panics
    ///
    /// Panics if a subscriber has already been installed.
    pub fn init(&self) {
        let filter = self.filter();

        match self.format {
            LogFormat::Json => {
                tracing_subscriber::fmt()
                    .json()
                    .with_env_filter(filter)
                    .with_writer(std::io::stderr)
                    .with_current_span(true)
                    .flatten_event(true)
                    .with_target(true)
                    .init();
            }
            LogFormat::Pretty => {
                tracing_subscriber::fmt()
                    .pretty()
                    .with_env_filter(filter)
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_line_number(true)
                    .with_file(true)
                    .init();
            }
            LogFormat::Text => {
                tracing_subscriber::fmt()
                    .with_env_filter(filter)
                    .with_writer(std::io::stderr)
                    .with_target(false)
                    .with_level(true)
                    .init();
            }
        }
    }
}

/// Initialize logging for a binary
pub fn init(default_level: &str, verbose: bool) {
    LoggingConfig::from_env(default_level, verbose).init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_log_format_from_str() {
        assert_eq!("text".parse::<LogFormat>().unwrap(), LogFormat::Text);
        assert_eq!("JSON".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!("Pretty".parse::<LogFormat>().unwrap(), LogFormat::Pretty);
    }

    #[test]
    fn test_log_format_from_str_invalid() {
        let result = "xml".parse::<LogFormat>();
        assert!(result.unwrap_err().contains("Invalid log format: 'xml'"));
    }

    #[test]
    fn test_log_format_display_round_trips() {
        for format in [LogFormat::Text, LogFormat::Json, LogFormat::Pretty] {
            assert_eq!(format.to_string().parse::<LogFormat>().unwrap(), format);
        }
    }

    #[test]
    #[serial]
    fn test_from_env_reads_skypost_variables() {
        std::env::set_var("SKYPOST_LOG_FORMAT", "json");
        std::env::set_var("SKYPOST_LOG_LEVEL", "warn");
        let config = LoggingConfig::from_env("info", false);
        std::env::remove_var("SKYPOST_LOG_FORMAT");
        std::env::remove_var("SKYPOST_LOG_LEVEL");

        assert_eq!(config.format, LogFormat::Json);
        assert_eq!(config.level, "warn");
        assert!(!config.verbose);
    }

    #[test]
    #[serial]
    fn test_from_env_defaults() {
        std::env::remove_var("SKYPOST_LOG_FORMAT");
        std::env::remove_var("SKYPOST_LOG_LEVEL");
        let config = LoggingConfig::from_env("error", true);

        assert_eq!(config.format, LogFormat::Text);
        assert_eq!(config.level, "error");
        assert!(config.verbose);
    }
}
