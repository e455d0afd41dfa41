//! Unit tests for log.rs
//!
//! Tests LogSeverity ordering, LogEntry and the DefaultLogger output paths.

use crate::log::{Logger, LogEntry, LogSeverity, DefaultLogger};
use std::time::SystemTime;

fn entry(severity: LogSeverity, file: Option<&'static str>, line: Option<u32>) -> LogEntry {
    LogEntry {
        severity,
        timestamp: SystemTime::now(),
        source: "nebula::command_stream".to_string(),
        message: format!("{:?} message", severity),
        file,
        line,
    }
}

// ============================================================================
// LOG SEVERITY TESTS
// ============================================================================

#[test]
fn test_log_severity_ordering() {
    assert!(LogSeverity::Trace < LogSeverity::Debug);
    assert!(LogSeverity::Debug < LogSeverity::Info);
    assert!(LogSeverity::Info < LogSeverity::Warn);
    assert!(LogSeverity::Warn < LogSeverity::Error);
}

#[test]
fn test_log_severity_filtering_by_threshold() {
    let threshold = LogSeverity::Warn;
    let all = [
        LogSeverity::Trace,
        LogSeverity::Debug,
        LogSeverity::Info,
        LogSeverity::Warn,
        LogSeverity::Error,
    ];
    let kept: Vec<_> = all.iter().filter(|s| **s >= threshold).collect();
    assert_eq!(kept, vec![&LogSeverity::Warn, &LogSeverity::Error]);
}

#[test]
fn test_log_severity_debug() {
    assert_eq!(format!("{:?}", LogSeverity::Trace), "Trace");
    assert_eq!(format!("{:?}", LogSeverity::Error), "Error");
}

// ============================================================================
// LOG ENTRY TESTS
// ============================================================================

#[test]
fn test_log_entry_creation_without_file_line() {
    let e = entry(LogSeverity::Info, None, None);
    assert_eq!(e.severity, LogSeverity::Info);
    assert_eq!(e.source, "nebula::command_stream");
    assert!(e.file.is_none());
    assert!(e.line.is_none());
}

#[test]
fn test_log_entry_creation_with_file_line() {
    let e = entry(LogSeverity::Error, Some("command_stream.rs"), Some(42));
    assert_eq!(e.file, Some("command_stream.rs"));
    assert_eq!(e.line, Some(42));
}

#[test]
fn test_log_entry_clone() {
    let e1 = entry(LogSeverity::Warn, Some("ring.rs"), Some(10));
    let e2 = e1.clone();
    assert_eq!(e1.severity, e2.severity);
    assert_eq!(e1.message, e2.message);
    assert_eq!(e1.line, e2.line);
}

// ============================================================================
// DEFAULT LOGGER TESTS
// ============================================================================

#[test]
fn test_default_logger_all_severities_without_file_line() {
    let logger = DefaultLogger;
    for severity in [
        LogSeverity::Trace,
        LogSeverity::Debug,
        LogSeverity::Info,
        LogSeverity::Warn,
        LogSeverity::Error,
    ] {
        logger.log(&entry(severity, None, None));
    }
}

#[test]
fn test_default_logger_error_with_file_line() {
    DefaultLogger.log(&entry(LogSeverity::Error, Some("vulkan.rs"), Some(123)));
}

#[test]
fn test_logger_trait_is_send_sync() {
    fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<DefaultLogger>();
}
