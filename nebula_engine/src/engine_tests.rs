//! Unit tests for the Engine logger registry and the logging macros
//!
//! LOGGER is a global shared across all tests, so every test that swaps
//! it is marked #[serial].

use crate::nebula::{Engine, Error, Result};
use crate::nebula::log::{Logger, LogEntry, LogSeverity};
use std::sync::{Arc, Mutex};
use serial_test::serial;

// ============================================================================
// TEST HELPERS
// ============================================================================

/// Test logger that captures log entries for verification
struct TestLogger {
    entries: Arc<Mutex<Vec<LogEntry>>>,
}

impl TestLogger {
    fn new() -> (Self, Arc<Mutex<Vec<LogEntry>>>) {
        let entries = Arc::new(Mutex::new(Vec::new()));
        (Self { entries: entries.clone() }, entries)
    }
}

impl Logger for TestLogger {
    fn log(&self, entry: &LogEntry) {
        self.entries.lock().unwrap().push(entry.clone());
    }
}

// ============================================================================
// LOGGER REGISTRY
// ============================================================================

#[test]
#[serial]
fn test_default_logger_logs_without_panic() {
    Engine::reset_logger();
    Engine::log(LogSeverity::Info, "nebula::test", "default logger".to_string());
    Engine::log_detailed(LogSeverity::Error, "nebula::test", "detailed".to_string(), file!(), line!());
}

#[test]
#[serial]
fn test_set_custom_logger() {
    let (logger, entries) = TestLogger::new();
    Engine::set_logger(logger);

    Engine::log(LogSeverity::Warn, "nebula::test", "captured".to_string());

    let entries = entries.lock().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].severity, LogSeverity::Warn);
    assert_eq!(entries[0].source, "nebula::test");
    assert_eq!(entries[0].message, "captured");
    assert!(entries[0].file.is_none());
    drop(entries);

    Engine::reset_logger();
}

#[test]
#[serial]
fn test_reset_logger_to_default() {
    let (logger, entries) = TestLogger::new();
    Engine::set_logger(logger);
    Engine::reset_logger();

    Engine::log(LogSeverity::Info, "nebula::test", "not captured".to_string());

    assert!(entries.lock().unwrap().is_empty());
}

#[test]
#[serial]
fn test_log_detailed_carries_file_and_line() {
    let (logger, entries) = TestLogger::new();
    Engine::set_logger(logger);

    Engine::log_detailed(LogSeverity::Error, "nebula::test", "boom".to_string(), "stage.rs", 12);

    let entries = entries.lock().unwrap();
    assert_eq!(entries[0].file, Some("stage.rs"));
    assert_eq!(entries[0].line, Some(12));
    drop(entries);

    Engine::reset_logger();
}

// ============================================================================
// MACROS
// ============================================================================

#[test]
#[serial]
fn test_severity_macros_route_to_logger() {
    let (logger, entries) = TestLogger::new();
    Engine::set_logger(logger);

    crate::engine_trace!("nebula::test", "t {}", 1);
    crate::engine_debug!("nebula::test", "d {}", 2);
    crate::engine_info!("nebula::test", "i {}", 3);
    crate::engine_warn!("nebula::test", "w {}", 4);
    crate::engine_error!("nebula::test", "e {}", 5);

    let entries = entries.lock().unwrap();
    let severities: Vec<LogSeverity> = entries.iter().map(|e| e.severity).collect();
    assert_eq!(
        severities,
        vec![
            LogSeverity::Trace,
            LogSeverity::Debug,
            LogSeverity::Info,
            LogSeverity::Warn,
            LogSeverity::Error,
        ]
    );
    assert_eq!(entries[4].message, "e 5");
    assert!(entries[4].line.is_some());
    drop(entries);

    Engine::reset_logger();
}

#[test]
#[serial]
fn test_engine_err_logs_and_builds_backend_error() {
    let (logger, entries) = TestLogger::new();
    Engine::set_logger(logger);

    let err = crate::engine_err!("nebula::test", "submit failed: {}", -4);

    assert_eq!(err, Error::BackendError("submit failed: -4".to_string()));
    let entries = entries.lock().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].severity, LogSeverity::Error);
    drop(entries);

    Engine::reset_logger();
}

#[test]
#[serial]
fn test_engine_bail_returns_early() {
    let (logger, entries) = TestLogger::new();
    Engine::set_logger(logger);

    fn fails(flag: bool) -> Result<u32> {
        if flag {
            crate::engine_bail!("nebula::test", "bailed out");
        }
        Ok(7)
    }

    assert_eq!(fails(false), Ok(7));
    assert!(matches!(fails(true), Err(Error::BackendError(msg)) if msg == "bailed out"));
    assert_eq!(entries.lock().unwrap().len(), 1);

    Engine::reset_logger();
}

#[test]
#[serial]
fn test_engine_fatal_keeps_typed_error() {
    let (logger, entries) = TestLogger::new();
    Engine::set_logger(logger);

    let err = crate::engine_fatal!(
        "nebula::test",
        Error::FenceTimeout { slot: Some(1), value: 9, timeout_ms: 100 }
    );

    assert!(matches!(err, Error::FenceTimeout { slot: Some(1), value: 9, .. }));
    let entries = entries.lock().unwrap();
    assert!(entries[0].message.contains("Fence timeout"));
    drop(entries);

    Engine::reset_logger();
}
