use std::env;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing_subscriber::filter::EnvFilter;

/// All telemeter crates, configured to the chosen level by [`init`].
const CRATE_NAMES: &[&str] = &[
    "telemeter_influx",
    "telemeter_log",
    "telemeter_metrics",
    "telemeter_test",
];

/// Controls the log format.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Auto detect the best format.
    ///
    /// This chooses [`LogFormat::Pretty`] for TTY, otherwise
    /// [`LogFormat::Simplified`].
    Auto,

    /// Pretty printing with colors.
    Pretty,

    /// Simplified plain text output.
    Simplified,

    /// Dump out JSON lines.
    Json,
}

/// The minimum level for emitted log messages.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Only errors.
    Error,
    /// Errors and warnings.
    Warn,
    /// Messages relevant to the average user.
    Info,
    /// Messages relevant to debugging.
    Debug,
    /// Full auxiliary information.
    Trace,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Error => "error",
            Self::Warn => "warn",
            Self::Info => "info",
            Self::Debug => "debug",
            Self::Trace => "trace",
        };
        f.write_str(name)
    }
}

/// Controls the logging system.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct LogConfig {
    /// The log level for telemeter crates.
    ///
    /// Third-party crates stay at `info`. Both can be overridden through the
    /// `RUST_LOG` environment variable.
    pub level: LogLevel,

    /// Controls the log output format.
    ///
    /// Defaults to [`LogFormat::Auto`], which detects the best format based on
    /// the TTY.
    pub format: LogFormat,

    /// When set to `true`, backtraces are forced on.
    ///
    /// Otherwise, backtraces can be enabled by setting the `RUST_BACKTRACE`
    /// variable to `full`.
    pub enable_backtraces: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            format: LogFormat::Auto,
            enable_backtraces: false,
        }
    }
}

/// Builds the default filter: `info` for third-party crates, the configured
/// level for all telemeter crates.
fn default_filter(level: LogLevel) -> EnvFilter {
    let mut directives = "info".to_owned();
    for name in CRATE_NAMES {
        directives.push_str(&format!(",{name}={level}"));
    }
    EnvFilter::new(directives)
}

/// Initialize the logging system.
///
/// A `RUST_LOG` environment variable takes precedence over the configured
/// level. Calling `init` more than once is a no-op.
///
/// # Example
///
/// ```
/// let config = telemeter_log::LogConfig {
///     enable_backtraces: true,
///     ..Default::default()
/// };
///
/// telemeter_log::init(&config);
/// ```
pub fn init(config: &LogConfig) {
    if config.enable_backtraces {
        env::set_var("RUST_BACKTRACE", "full");
    }

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter(config.level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    match (config.format, console::user_attended()) {
        (LogFormat::Auto, true) | (LogFormat::Pretty, _) => {
            builder.compact().with_ansi(true).try_init().ok()
        }
        (LogFormat::Auto, false) | (LogFormat::Simplified, _) => {
            builder.with_ansi(false).try_init().ok()
        }
        (LogFormat::Json, _) => builder.json().flatten_event(true).try_init().ok(),
    };
}
