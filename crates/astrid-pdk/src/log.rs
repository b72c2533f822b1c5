//! Logging to the host log sink.
//!
//! Messages are copied into a temporary block, passed to the matching
//! `log_*` import and freed. The host reports its minimum level through
//! `get_log_level`, so messages below it are dropped before anything is
//! formatted or allocated.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::PdkResult;
use crate::memory::Memory;

/// Log severity level, ordered from most to least verbose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    /// Verbose tracing information.
    Trace,
    /// Debug-level diagnostic information.
    Debug,
    /// General informational messages.
    Info,
    /// Warning conditions that may need attention.
    Warn,
    /// Error conditions.
    Error,
}

impl LogLevel {
    /// The integer the host uses for this level.
    #[must_use]
    pub const fn as_i32(self) -> i32 {
        match self {
            Self::Trace => 0,
            Self::Debug => 1,
            Self::Info => 2,
            Self::Warn => 3,
            Self::Error => 4,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown level name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown log level: {0}")]
pub struct ParseLogLevelError(String);

impl FromStr for LogLevel {
    type Err = ParseLogLevelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "trace" => Ok(Self::Trace),
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            "warn" | "warning" => Ok(Self::Warn),
            "error" | "err" => Ok(Self::Error),
            _ => Err(ParseLogLevelError(s.to_string())),
        }
    }
}

/// The host's minimum level, or `None` when host logging is off.
#[must_use]
pub fn level() -> Option<LogLevel> {
    match unsafe { astrid_pdk_sys::get_log_level() } {
        i32::MIN..=0 => Some(LogLevel::Trace),
        1 => Some(LogLevel::Debug),
        2 => Some(LogLevel::Info),
        3 => Some(LogLevel::Warn),
        4 => Some(LogLevel::Error),
        _ => None,
    }
}

/// Whether the host would record a message at `level`.
#[must_use]
pub fn enabled(level: LogLevel) -> bool {
    self::level().is_some_and(|min| level >= min)
}

/// Send `message` to the host log sink at `level`.
///
/// # Errors
/// [`crate::PdkError::AllocationFailed`] if the message cannot be written to the host.
pub fn log(level: LogLevel, message: impl AsRef<str>) -> PdkResult<()> {
    if !enabled(level) {
        return Ok(());
    }
    write(level, message.as_ref())
}

/// Formatting entry point used by the logging macros. Failures are dropped:
/// a log line that cannot reach the host has nowhere else to go.
#[doc(hidden)]
pub fn log_fmt(level: LogLevel, args: fmt::Arguments<'_>) {
    if !enabled(level) {
        return;
    }
    let message = args
        .as_str()
        .map_or_else(|| args.to_string(), str::to_owned);
    let _ = write(level, &message);
}

/// Unconditionally send `message`; callers have already checked [`enabled`].
///
/// Empty messages are dropped: they would reach the host as offset 0, which
/// names no block.
pub(crate) fn write(level: LogLevel, message: &str) -> PdkResult<()> {
    if message.is_empty() {
        return Ok(());
    }
    let memory = Memory::from_bytes(message)?;
    let offset = memory.offset().raw();
    unsafe {
        match level {
            LogLevel::Trace => astrid_pdk_sys::log_trace(offset),
            LogLevel::Debug => astrid_pdk_sys::log_debug(offset),
            LogLevel::Info => astrid_pdk_sys::log_info(offset),
            LogLevel::Warn => astrid_pdk_sys::log_warn(offset),
            LogLevel::Error => astrid_pdk_sys::log_error(offset),
        }
    }
    memory.free();
    Ok(())
}

/// Log a formatted message at an explicit level.
///
/// ```rust,no_run
/// use astrid_pdk::log::LogLevel;
/// astrid_pdk::log!(LogLevel::Warn, "retrying {} more times", 3);
/// ```
#[macro_export]
macro_rules! log {
    ($level:expr, $($arg:tt)+) => {
        $crate::log::log_fmt($level, ::std::format_args!($($arg)+))
    };
}

/// Log a formatted message at [`LogLevel::Trace`].
#[macro_export]
macro_rules! trace {
    ($($arg:tt)+) => {
        $crate::log::log_fmt($crate::log::LogLevel::Trace, ::std::format_args!($($arg)+))
    };
}

/// Log a formatted message at [`LogLevel::Debug`].
#[macro_export]
macro_rules! debug {
    ($($arg:tt)+) => {
        $crate::log::log_fmt($crate::log::LogLevel::Debug, ::std::format_args!($($arg)+))
    };
}

/// Log a formatted message at [`LogLevel::Info`].
#[macro_export]
macro_rules! info {
    ($($arg:tt)+) => {
        $crate::log::log_fmt($crate::log::LogLevel::Info, ::std::format_args!($($arg)+))
    };
}

/// Log a formatted message at [`LogLevel::Warn`].
#[macro_export]
macro_rules! warn {
    ($($arg:tt)+) => {
        $crate::log::log_fmt($crate::log::LogLevel::Warn, ::std::format_args!($($arg)+))
    };
}

/// Log a formatted message at [`LogLevel::Error`].
#[macro_export]
macro_rules! error {
    ($($arg:tt)+) => {
        $crate::log::log_fmt($crate::log::LogLevel::Error, ::std::format_args!($($arg)+))
    };
}
