//! Structured logging setup for guidprobe
//!
//! Events go to stderr through `tracing-subscriber`, so stdout only ever
//! carries the report. The crate logs at WARN unless the command line asks
//! for more; a set `RUST_LOG` replaces the whole filter.
//!
//! # Example
//!
//! ```no_run
//! use guidprobe::util::logging::{self, LoggingConfig};
//! use tracing::Level;
//!
//! logging::init_logging(LoggingConfig::with_level(Level::DEBUG));
//! tracing::debug!(path = "build/WinCopyS3.dll", "Loading");
//! ```

use std::env;
use std::str::FromStr;
use std::sync::Once;
use tracing::Level;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static INIT: Once = Once::new();

/// Level used when neither a flag nor `RUST_LOG` says otherwise
pub const DEFAULT_LEVEL: Level = Level::WARN;

/// How log events are filtered and formatted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    /// Most verbose level emitted for `guidprobe` targets
    pub level: Level,

    /// Prefix events with their module path (e.g. `guidprobe::locator`)
    pub include_target: bool,

    /// Append source file and line
    pub include_location: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: DEFAULT_LEVEL,
            include_target: true,
            include_location: false,
        }
    }
}

impl LoggingConfig {
    pub fn with_level(level: Level) -> Self {
        Self {
            level,
            ..Default::default()
        }
    }

    /// Picks the level from command-line flags.
    ///
    /// An explicit `--log-level` wins over `--verbose` (DEBUG), which wins
    /// over `--quiet` (ERROR). Source locations are only shown at TRACE.
    pub fn from_cli_flags(log_level: Option<&str>, verbose: bool, quiet: bool) -> Self {
        let level = match (log_level, verbose, quiet) {
            (Some(text), _, _) => parse_level(text),
            (None, true, _) => Level::DEBUG,
            (None, false, true) => Level::ERROR,
            (None, false, false) => DEFAULT_LEVEL,
        };

        Self {
            level,
            include_location: level == Level::TRACE,
            ..Default::default()
        }
    }

    /// Filter directives used when `RUST_LOG` is unset
    pub fn directives(&self) -> String {
        format!("{},guidprobe={}", DEFAULT_LEVEL, self.level).to_lowercase()
    }
}

/// Parses a level name case-insensitively, falling back to WARN with a notice
///
/// # Example
///
/// ```
/// use guidprobe::util::logging::parse_level;
/// use tracing::Level;
///
/// assert_eq!(parse_level("debug"), Level::DEBUG);
/// assert_eq!(parse_level("INFO"), Level::INFO);
/// assert_eq!(parse_level("loud"), Level::WARN);
/// ```
pub fn parse_level(text: &str) -> Level {
    Level::from_str(text.trim()).unwrap_or_else(|_| {
        eprintln!(
            "Invalid log level '{}', defaulting to {}. Valid levels: trace, debug, info, warn, error",
            text, DEFAULT_LEVEL
        );
        DEFAULT_LEVEL
    })
}

/// Installs the global subscriber; only the first call has any effect
pub fn init_logging(config: LoggingConfig) {
    INIT.call_once(|| {
        let filter = match env::var("RUST_LOG") {
            Ok(_) => EnvFilter::from_default_env(),
            Err(_) => EnvFilter::new(config.directives()),
        };

        let layer = fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(config.include_target)
            .with_file(config.include_location)
            .with_line_number(config.include_location);

        // Another global subscriber (a test harness, an embedding program) takes precedence
        let _ = tracing_subscriber::registry().with(filter).with(layer).try_init();
    });
}

/// Initializes logging with the default configuration
pub fn init_default() {
    init_logging(LoggingConfig::default());
}
