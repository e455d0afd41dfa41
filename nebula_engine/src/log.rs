//! Engine logging
//!
//! Every subsystem reports through the process-wide logger held by
//! [`Engine`](crate::nebula::Engine). The default logger prints colored lines to
//! the console; applications replace it with `Engine::set_logger`.
//!
//! Errors carry the file and line of the call site so that a fatal GPU
//! failure can be traced back to the exact submission or allocation.

use colored::*;
use std::time::SystemTime;
use chrono::{DateTime, Local};

/// Logger trait for custom logging implementations
///
/// # Example
///
/// ```no_run
/// use nebula_engine::nebula::log::{Logger, LogEntry};
///
/// struct FrameLogger;
///
/// impl Logger for FrameLogger {
///     fn log(&self, entry: &LogEntry) {
///         eprintln!("{:?} {}", entry.severity, entry.message);
///     }
/// }
/// ```
pub trait Logger: Send + Sync {
    /// Log an entry
    ///
    /// # Arguments
    ///
    /// * `entry` - The log entry to process
    fn log(&self, entry: &LogEntry);
}

/// One log record
#[derive(Debug, Clone)]
pub struct LogEntry {
    /// Severity level
    pub severity: LogSeverity,

    /// Timestamp when the log was created
    pub timestamp: SystemTime,

    /// Source module (e.g. "nebula::command_stream", "nebula::vulkan")
    pub source: String,

    /// Log message
    pub message: String,

    /// Source file (only for detailed ERROR logs)
    pub file: Option<&'static str>,

    /// Source line (only for detailed ERROR logs)
    pub line: Option<u32>,
}

/// Log severity levels, ordered from most to least verbose
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogSeverity {
    /// Per-frame detail (slot waits, ring usage)
    Trace,

    /// Development information
    Debug,

    /// Subsystem lifecycle events
    Info,

    /// Recoverable problems (texture fallback, slow waits)
    Warn,

    /// Fatal conditions, logged with file:line
    Error,
}

/// Default logger: colored console output
///
/// Format:
/// - Normal: `[timestamp] [SEVERITY] [source] message`
/// - Error: `[timestamp] [ERROR] [source] message (file:line)`, on stderr
pub struct DefaultLogger;

impl Logger for DefaultLogger {
    fn log(&self, entry: &LogEntry) {
        let datetime: DateTime<Local> = entry.timestamp.into();
        let timestamp = datetime.format("%Y-%m-%d %H:%M:%S%.3f").to_string();

        let severity_str = match entry.severity {
            LogSeverity::Trace => "TRACE".bright_black(),
            LogSeverity::Debug => "DEBUG".cyan(),
            LogSeverity::Info => "INFO ".green(),
            LogSeverity::Warn => "WARN ".yellow(),
            LogSeverity::Error => "ERROR".red().bold(),
        };

        let source = entry.source.bright_blue();

        if let (Some(file), Some(line)) = (entry.file, entry.line) {
            eprintln!(
                "[{}] [{}] [{}] {} ({}:{})",
                timestamp,
                severity_str,
                source,
                entry.message,
                file,
                line
            );
        } else {
            println!(
                "[{}] [{}] [{}] {}",
                timestamp,
                severity_str,
                source,
                entry.message
            );
        }
    }
}

// ===== LOGGING MACROS =====

/// Log a TRACE message
///
/// ```no_run
/// # use nebula_engine::engine_trace;
/// engine_trace!("nebula::command_stream", "slot {} already retired", 0);
/// ```
#[macro_export]
macro_rules! engine_trace {
    ($source:expr, $($arg:tt)*) => {
        $crate::nebula::Engine::log(
            $crate::nebula::log::LogSeverity::Trace,
            $source,
            format!($($arg)*)
        )
    };
}

/// Log a DEBUG message
#[macro_export]
macro_rules! engine_debug {
    ($source:expr, $($arg:tt)*) => {
        $crate::nebula::Engine::log(
            $crate::nebula::log::LogSeverity::Debug,
            $source,
            format!($($arg)*)
        )
    };
}

/// Log an INFO message
///
/// ```no_run
/// # use nebula_engine::engine_info;
/// engine_info!("nebula::renderer", "Renderer ready ({} frame slots)", 2);
/// ```
#[macro_export]
macro_rules! engine_info {
    ($source:expr, $($arg:tt)*) => {
        $crate::nebula::Engine::log(
            $crate::nebula::log::LogSeverity::Info,
            $source,
            format!($($arg)*)
        )
    };
}

/// Log a WARN message
#[macro_export]
macro_rules! engine_warn {
    ($source:expr, $($arg:tt)*) => {
        $crate::nebula::Engine::log(
            $crate::nebula::log::LogSeverity::Warn,
            $source,
            format!($($arg)*)
        )
    };
}

/// Log an ERROR message with file:line information
#[macro_export]
macro_rules! engine_error {
    ($source:expr, $($arg:tt)*) => {
        $crate::nebula::Engine::log_detailed(
            $crate::nebula::log::LogSeverity::Error,
            $source,
            format!($($arg)*),
            file!(),
            line!()
        )
    };
}

/// Log an ERROR and evaluate to `Error::BackendError` with the same message
///
/// ```no_run
/// # use nebula_engine::engine_err;
/// # fn f() -> nebula_engine::nebula::Result<()> {
/// let code = -4;
/// return Err(engine_err!("nebula::vulkan", "vkQueueSubmit failed: {}", code));
/// # }
/// ```
#[macro_export]
macro_rules! engine_err {
    ($source:expr, $($arg:tt)*) => {{
        let message = format!($($arg)*);
        $crate::nebula::Engine::log_detailed(
            $crate::nebula::log::LogSeverity::Error,
            $source,
            message.clone(),
            file!(),
            line!()
        );
        $crate::nebula::Error::BackendError(message)
    }};
}

/// Log an ERROR and return `Err(Error::BackendError(..))` from the current function
#[macro_export]
macro_rules! engine_bail {
    ($source:expr, $($arg:tt)*) => {
        return Err($crate::engine_err!($source, $($arg)*))
    };
}

/// Log a typed error at its origin and evaluate to it
///
/// ```no_run
/// # use nebula_engine::engine_fatal;
/// # use nebula_engine::nebula::Error;
/// let err = engine_fatal!("nebula::frame_constant_ring",
///     Error::ConstantRingOverflow { requested: 256, capacity: 0 });
/// ```
#[macro_export]
macro_rules! engine_fatal {
    ($source:expr, $error:expr) => {{
        let error = $error;
        $crate::nebula::Engine::log_detailed(
            $crate::nebula::log::LogSeverity::Error,
            $source,
            format!("{}", error),
            file!(),
            line!()
        );
        error
    }};
}

#[cfg(test)]
#[path = "log_tests.rs"]
mod tests;
