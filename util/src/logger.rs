//! Session logger
//!
//! Log records go to both stdout and the session's log file, stamped with the time since the
//! session epoch. The default level given by the executable can be overridden at run time with
//! the `SWERVE_LOG` environment variable, for instance `SWERVE_LOG=trace` to see every limiter
//! and smoothing iteration.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External imports
use colored::{ColoredString, Colorize};
use log::{info, warn};
use std::str::FromStr;
use thiserror::Error;

// Internal imports
use crate::session::{self, Session};

// Re-exports
pub use log::LevelFilter;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Environment variable which overrides the level passed to [`logger_init`].
pub const LEVEL_ENV_VAR: &str = "SWERVE_LOG";

/// Crate prefix dropped from record targets to keep lines short.
const TARGET_PREFIX: &str = "swerve_lib::";

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Errors associated with initialising the logger.
#[derive(Debug, Error)]
pub enum LoggerInitError {
    #[error("Logging must include at least `INFO` records, found `{0}`")]
    InvalidMinLogLevel(LevelFilter),

    #[error("Error opening the session log file: {0}")]
    LogFileInitError(std::io::Error),

    #[error("A logger has already been set: {0}")]
    FernInitError(log::SetLoggerError),
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Initialise the logger for this execution.
///
/// `min_level` is used unless [`LEVEL_ENV_VAR`] holds a valid level. Either way the level must
/// let `INFO` records through. May only be called once per process.
pub fn logger_init(min_level: LevelFilter, session: &Session) -> Result<(), LoggerInitError> {
    let env_value = std::env::var(LEVEL_ENV_VAR).ok();
    let level = resolve_level(min_level, env_value.as_deref());

    if level < LevelFilter::Info {
        return Err(LoggerInitError::InvalidMinLogLevel(level));
    }

    let log_file =
        fern::log_file(&session.log_file_path).map_err(LoggerInitError::LogFileInitError)?;

    fern::Dispatch::new()
        .format(|out, message, record| {
            // Debug and trace lines say where they came from
            if record.level() > log::Level::Info {
                out.finish(format_args!(
                    "[{:10.6} {}] {}: {}",
                    session::get_elapsed_seconds(),
                    level_to_str(record.level()),
                    short_target(record.target()),
                    message
                ))
            } else {
                out.finish(format_args!(
                    "[{:10.6} {}] {}",
                    session::get_elapsed_seconds(),
                    level_to_str(record.level()),
                    message
                ))
            }
        })
        .level(level)
        .chain(std::io::stdout())
        .chain(log_file)
        .apply()
        .map_err(LoggerInitError::FernInitError)?;

    info!("Logging initialised");
    info!("    Session epoch: {}", session::get_epoch());
    info!("    Log level: {:?}", level);
    info!("    Log file path: {:?}", session.log_file_path);

    if let Some(value) = env_value {
        if LevelFilter::from_str(value.trim()).is_err() {
            warn!("Ignoring unknown {} level {:?}", LEVEL_ENV_VAR, value);
        }
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

/// The level to log at, from the executable's default and the environment override if any.
fn resolve_level(default: LevelFilter, env_value: Option<&str>) -> LevelFilter {
    env_value
        .and_then(|v| LevelFilter::from_str(v.trim()).ok())
        .unwrap_or(default)
}

/// Record target without the library's crate prefix.
fn short_target(target: &str) -> &str {
    target.strip_prefix(TARGET_PREFIX).unwrap_or(target)
}

/// Get the string representation of a log level
fn level_to_str(level: log::Level) -> ColoredString {
    match level {
        log::Level::Trace => "TRC".dimmed().italic(),
        log::Level::Debug => "DBG".dimmed(),
        log::Level::Info => "INF".normal(),
        log::Level::Warn => "WRN".yellow(),
        log::Level::Error => "ERR".red().bold(),
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------
