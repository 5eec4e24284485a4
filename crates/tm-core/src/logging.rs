use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

/// Message levels, most verbose first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    MethodTrace,
    Debug,
    Param,
    Info,
    Success,
    Warning,
    Error,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::MethodTrace => "method_trace",
            Self::Debug => "debug",
            Self::Param => "param",
            Self::Info => "info",
            Self::Success => "success",
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sink for operator-visible messages.
pub trait Logger {
    fn log(&self, level: LogLevel, message: &str);
}

pub(crate) fn log_trace(logger: &dyn Logger, step: &str) {
    logger.log(LogLevel::MethodTrace, &format!("\tBase\t{}()", step));
}

/// Forwards messages to `tracing`, dropping anything more verbose than the
/// configured threshold.
#[derive(Debug, Clone, Copy)]
pub struct TracingLogger {
    threshold: LogLevel,
}

impl TracingLogger {
    pub fn new(threshold: LogLevel) -> Self {
        Self { threshold }
    }

    pub fn enabled(&self, level: LogLevel) -> bool {
        level >= self.threshold
    }
}

impl Default for TracingLogger {
    fn default() -> Self {
        Self::new(LogLevel::Warning)
    }
}

impl Logger for TracingLogger {
    fn log(&self, level: LogLevel, message: &str) {
        if !self.enabled(level) {
            return;
        }
        match level {
            LogLevel::MethodTrace => tracing::trace!(target: "tm", "{}", message),
            LogLevel::Debug => tracing::debug!(target: "tm", "{}", message),
            LogLevel::Param | LogLevel::Info | LogLevel::Success => {
                tracing::info!(target: "tm", level = level.as_str(), "{}", message)
            }
            LogLevel::Warning => tracing::warn!(target: "tm", "{}", message),
            LogLevel::Error => tracing::error!(target: "tm", "{}", message),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogRecord {
    pub level: LogLevel,
    pub message: String,
}

/// Keeps every record in memory; clones share the same buffer.
#[derive(Debug, Clone, Default)]
pub struct RecordingLogger {
    records: Rc<RefCell<Vec<LogRecord>>>,
}

impl RecordingLogger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<LogRecord> {
        self.records.borrow().clone()
    }

    pub fn messages_at(&self, level: LogLevel) -> Vec<String> {
        self.records
            .borrow()
            .iter()
            .filter(|record| record.level == level)
            .map(|record| record.message.clone())
            .collect()
    }

    pub fn clear(&self) {
        self.records.borrow_mut().clear();
    }
}

impl Logger for RecordingLogger {
    fn log(&self, level: LogLevel, message: &str) {
        self.records.borrow_mut().push(LogRecord {
            level,
            message: message.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn threshold_drops_verbose_levels() {
        let logger = TracingLogger::default();
        assert!(!logger.enabled(LogLevel::MethodTrace));
        assert!(!logger.enabled(LogLevel::Param));
        assert!(logger.enabled(LogLevel::Warning));
        assert!(logger.enabled(LogLevel::Error));
        assert!(TracingLogger::new(LogLevel::Param).enabled(LogLevel::Param));
    }

    #[test]
    fn method_trace_format_matches_operator_logs() {
        let logger = RecordingLogger::new();
        log_trace(&logger, "setup");
        assert_eq!(
            logger.messages_at(LogLevel::MethodTrace),
            vec!["\tBase\tsetup()".to_string()]
        );
    }

    #[test]
    fn levels_parse_from_snake_case() {
        let level: LogLevel = serde_json::from_str("\"method_trace\"").expect("parse level");
        assert_eq!(level, LogLevel::MethodTrace);
        assert_eq!(LogLevel::Warning.to_string(), "warning");
    }
}
