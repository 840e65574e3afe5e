//! Dub Logging Setup
//!
//! Installs a `tracing` subscriber for Dub API clients. Output goes to
//! stderr so it never mixes with command output on stdout.
//!
//! # Usage
//!
//! ```rust
//! // Errors only, unless the environment asks for more.
//! dub_log::init(false);
//!
//! // Later calls are no-ops; the first configuration wins.
//! dub_log::init(true);
//!
//! tracing::error!(status = 500, "request failed");
//! ```
//!
//! # Environment Variables
//!
//! - `DUB_DEBUG=1` - Enable debug logging
//! - `DUB_LOG_LEVEL=trace|debug|info|warn|error|off` - Set log level
//! - `DUB_LOG_FORMAT=pretty|compact|json` - Set output format
//! - `NO_COLOR` - Disable ANSI colors
//! - `RUST_LOG` - Full `EnvFilter` directive, overrides the level

use once_cell::sync::OnceCell;
use std::env;
use tracing_subscriber::prelude::*;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{EnvFilter, Layer, fmt};

/// Enables debug logging when set to `1` or `true`.
pub const ENV_DEBUG: &str = "DUB_DEBUG";
/// Explicit log level.
pub const ENV_LOG_LEVEL: &str = "DUB_LOG_LEVEL";
/// Output format.
pub const ENV_LOG_FORMAT: &str = "DUB_LOG_FORMAT";
/// Disables colors when present.
pub const ENV_NO_COLOR: &str = "NO_COLOR";

// ============================================================================
// Log Levels
// ============================================================================

/// Minimum level of events that are printed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    /// Trace level (most verbose)
    Trace,
    /// Debug level
    Debug,
    /// Info level
    Info,
    /// Warning level
    Warn,
    /// Error level
    Error,
    /// No logging
    Off,
}

impl Level {
    /// Parse a level name, ignoring case.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "trace" => Some(Level::Trace),
            "debug" => Some(Level::Debug),
            "info" => Some(Level::Info),
            "warn" | "warning" => Some(Level::Warn),
            "error" => Some(Level::Error),
            "off" | "none" => Some(Level::Off),
            _ => None,
        }
    }

    /// Directive understood by `EnvFilter`.
    pub fn as_filter(&self) -> &'static str {
        match self {
            Level::Trace => "trace",
            Level::Debug => "debug",
            Level::Info => "info",
            Level::Warn => "warn",
            Level::Error => "error",
            Level::Off => "off",
        }
    }
}

impl std::fmt::Display for Level {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_filter())
    }
}

// ============================================================================
// Log Format
// ============================================================================

/// Output format for log events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// Multi-line human readable output
    Pretty,
    /// Single-line output
    Compact,
    /// One JSON object per line
    Json,
}

impl Format {
    /// Parse a format name, ignoring case.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "pretty" => Some(Format::Pretty),
            "compact" => Some(Format::Compact),
            "json" => Some(Format::Json),
            _ => None,
        }
    }
}

// ============================================================================
// Configuration
// ============================================================================

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    /// Whether debug mode is enabled
    pub debug: bool,
    /// Minimum log level
    pub level: Level,
    /// Output format
    pub format: Format,
    /// Whether ANSI colors are enabled
    pub color: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            debug: false,
            level: Level::Error,
            format: Format::Compact,
            color: true,
        }
    }
}

impl LogConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Create config from an arbitrary variable source.
    ///
    /// An explicit level wins over the debug flag. Unknown values fall back to
    /// the defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let debug = lookup(ENV_DEBUG).is_some_and(|v| is_truthy(&v));

        let level = lookup(ENV_LOG_LEVEL)
            .and_then(|s| Level::parse(&s))
            .unwrap_or(if debug { Level::Debug } else { Level::Error });

        let format = lookup(ENV_LOG_FORMAT)
            .and_then(|s| Format::parse(&s))
            .unwrap_or(Format::Compact);

        let color = lookup(ENV_NO_COLOR).is_none() && format != Format::Json;

        Self {
            debug,
            level,
            format,
            color,
        }
    }

    /// Apply a command-line debug flag on top of this config.
    ///
    /// The flag only ever raises verbosity.
    pub fn with_debug(mut self, debug: bool) -> Self {
        if debug {
            self.debug = true;
            self.level = self.level.min(Level::Debug);
        }
        self
    }

    /// Build the event filter. `RUST_LOG` overrides the configured level.
    pub fn filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(self.level.as_filter()))
    }
}

fn is_truthy(value: &str) -> bool {
    matches!(value.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

// ============================================================================
// Public API
// ============================================================================

/// Configuration installed by the first successful [`init`].
static INSTALLED: OnceCell<LogConfig> = OnceCell::new();

/// Initialize logging once per process.
///
/// The level is error by default and debug when `debug` is set. Environment
/// variables are honored as described in the crate docs. Calls after the first
/// return the configuration already installed and change nothing.
pub fn init(debug: bool) -> &'static LogConfig {
    init_with(LogConfig::from_env().with_debug(debug))
}

/// Initialize logging once per process with an explicit configuration.
pub fn init_with(config: LogConfig) -> &'static LogConfig {
    INSTALLED.get_or_init(|| {
        let installed = tracing_subscriber::registry()
            .with(config.filter())
            .with(fmt_layer(&config))
            .try_init();

        // Another global subscriber may already be set by the host application.
        if installed.is_err() {
            tracing::debug!("global tracing subscriber already set; keeping it");
        }

        config
    })
}

/// Check if logging has been initialized.
pub fn is_initialized() -> bool {
    INSTALLED.get().is_some()
}

/// Get the installed configuration, if any.
pub fn config() -> Option<&'static LogConfig> {
    INSTALLED.get()
}

fn fmt_layer<S>(config: &LogConfig) -> Box<dyn Layer<S> + Send + Sync>
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
{
    let layer = fmt::layer().with_writer(std::io::stderr).with_target(true);

    match config.format {
        Format::Pretty => layer.pretty().with_ansi(config.color).boxed(),
        Format::Compact => layer.compact().with_ansi(config.color).boxed(),
        #[cfg(feature = "json")]
        Format::Json => layer.json().with_ansi(false).boxed(),
        #[cfg(not(feature = "json"))]
        Format::Json => layer.compact().with_ansi(false).boxed(),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> LogConfig {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        LogConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_level_ordering() {
        assert!(Level::Trace < Level::Debug);
        assert!(Level::Debug < Level::Info);
        assert!(Level::Warn < Level::Error);
        assert!(Level::Error < Level::Off);
    }

    #[test]
    fn test_level_parse() {
        assert_eq!(Level::parse("debug"), Some(Level::Debug));
        assert_eq!(Level::parse(" DEBUG "), Some(Level::Debug));
        assert_eq!(Level::parse("warning"), Some(Level::Warn));
        assert_eq!(Level::parse("none"), Some(Level::Off));
        assert_eq!(Level::parse("verbose"), None);
    }

    #[test]
    fn test_format_parse() {
        assert_eq!(Format::parse("pretty"), Some(Format::Pretty));
        assert_eq!(Format::parse("JSON"), Some(Format::Json));
        assert_eq!(Format::parse("xml"), None);
    }

    #[test]
    fn test_defaults_to_errors_only() {
        let config = lookup(&[]);
        assert_eq!(config, LogConfig::default());
        assert_eq!(config.level, Level::Error);
    }

    #[test]
    fn test_debug_env_raises_level() {
        let config = lookup(&[(ENV_DEBUG, "1")]);
        assert!(config.debug);
        assert_eq!(config.level, Level::Debug);

        assert!(!lookup(&[(ENV_DEBUG, "0")]).debug);
    }

    #[test]
    fn test_explicit_level_wins() {
        let config = lookup(&[(ENV_DEBUG, "true"), (ENV_LOG_LEVEL, "warn")]);
        assert!(config.debug);
        assert_eq!(config.level, Level::Warn);
    }

    #[test]
    fn test_unknown_values_fall_back() {
        let config = lookup(&[(ENV_LOG_LEVEL, "loud"), (ENV_LOG_FORMAT, "xml")]);
        assert_eq!(config.level, Level::Error);
        assert_eq!(config.format, Format::Compact);
    }

    #[test]
    fn test_color_disabled() {
        assert!(!lookup(&[(ENV_NO_COLOR, "")]).color);
        assert!(!lookup(&[(ENV_LOG_FORMAT, "json")]).color);
        assert!(lookup(&[(ENV_LOG_FORMAT, "pretty")]).color);
    }

    #[test]
    fn test_with_debug_only_raises() {
        let config = LogConfig::default().with_debug(true);
        assert!(config.debug);
        assert_eq!(config.level, Level::Debug);

        let trace = LogConfig {
            level: Level::Trace,
            ..LogConfig::default()
        };
        assert_eq!(trace.clone().with_debug(true).level, Level::Trace);
        assert_eq!(trace.with_debug(false).level, Level::Trace);
    }

    #[test]
    fn test_init_is_idempotent() {
        let first = init_with(LogConfig::default().with_debug(true));
        let second = init(false);

        assert!(is_initialized());
        assert!(std::ptr::eq(first, second));
        assert_eq!(config(), Some(first));
        assert_eq!(second.level, Level::Debug);
    }
}
