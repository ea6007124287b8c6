//! # Logger Service
//!
//! This crate implements structured kernel logging.
//!
//! ## Philosophy
//!
//! Logging is explicit and structured, not text-based or printf-style.
//! Entries carry a level, the subsystem that produced them, and key/value
//! fields. They land in a bounded in-memory ring and are optionally echoed
//! to a sink such as the serial console.

mod config;

pub use config::LoggerConfig;

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use core_types::DeviceId;
use serde::{Deserialize, Serialize};

/// Log level
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Debug information
    Debug,
    /// Informational messages
    Info,
    /// Warnings
    Warn,
    /// Errors
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
        };
        f.write_str(label)
    }
}

/// A structured log entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    /// Log level
    pub level: LogLevel,
    /// Subsystem that produced the entry (e.g. "devicemgr", "fs::cfs")
    pub target: String,
    /// Device the entry is about (if any)
    pub source: Option<DeviceId>,
    /// Log message
    pub message: String,
    /// Structured fields
    pub fields: Vec<(String, String)>,
}

impl LogEntry {
    /// Creates a new log entry
    pub fn new(level: LogLevel, target: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level,
            target: target.into(),
            source: None,
            message: message.into(),
            fields: Vec::new(),
        }
    }

    /// Sets the source device
    pub fn with_source(mut self, source: DeviceId) -> Self {
        self.source = Some(source);
        self
    }

    /// Adds a field to the log entry
    pub fn with_field(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.fields.push((key.into(), value.to_string()));
        self
    }

    /// Returns the value of field `key`, if present
    pub fn field(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.level, self.target, self.message)?;
        for (key, value) in &self.fields {
            write!(f, " {}={}", key, value)?;
        }
        Ok(())
    }
}

/// Destination that receives every accepted entry
pub trait LogSink: Send + Sync {
    fn write_entry(&self, entry: &LogEntry);
}

struct LogState {
    entries: VecDeque<LogEntry>,
    dropped: u64,
    sink: Option<Arc<dyn LogSink>>,
}

/// Bounded in-memory kernel log
///
/// The oldest entry is evicted when the ring is full.
pub struct KernelLog {
    config: LoggerConfig,
    state: Mutex<LogState>,
}

impl KernelLog {
    /// Creates a log with the given configuration
    pub fn new(config: LoggerConfig) -> Self {
        Self {
            state: Mutex::new(LogState {
                entries: VecDeque::with_capacity(config.capacity.min(1024)),
                dropped: 0,
                sink: None,
            }),
            config,
        }
    }

    /// Returns the configuration the log was created with
    pub fn config(&self) -> &LoggerConfig {
        &self.config
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, LogState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Installs a sink; replaces any previous one
    pub fn set_sink(&self, sink: Arc<dyn LogSink>) {
        self.lock().sink = Some(sink);
    }

    /// Removes the sink
    pub fn clear_sink(&self) {
        self.lock().sink = None;
    }

    /// Records an entry if it meets the minimum level
    ///
    /// Returns whether the entry was accepted.
    pub fn log(&self, entry: LogEntry) -> bool {
        if entry.level < self.config.min_level || self.config.capacity == 0 {
            return false;
        }
        let sink = {
            let mut state = self.lock();
            if state.entries.len() == self.config.capacity {
                state.entries.pop_front();
                state.dropped += 1;
            }
            state.entries.push_back(entry.clone());
            state.sink.clone()
        };
        // The sink runs outside the lock so it may log itself.
        if let Some(sink) = sink {
            sink.write_entry(&entry);
        }
        true
    }

    pub fn debug(&self, target: &str, message: impl Into<String>) -> bool {
        self.log(LogEntry::new(LogLevel::Debug, target, message))
    }

    pub fn info(&self, target: &str, message: impl Into<String>) -> bool {
        self.log(LogEntry::new(LogLevel::Info, target, message))
    }

    pub fn warn(&self, target: &str, message: impl Into<String>) -> bool {
        self.log(LogEntry::new(LogLevel::Warn, target, message))
    }

    pub fn error(&self, target: &str, message: impl Into<String>) -> bool {
        self.log(LogEntry::new(LogLevel::Error, target, message))
    }

    /// Snapshot of retained entries, oldest first
    pub fn entries(&self) -> Vec<LogEntry> {
        self.lock().entries.iter().cloned().collect()
    }

    /// Retained entries whose message contains `needle`
    pub fn find(&self, needle: &str) -> Vec<LogEntry> {
        self.lock()
            .entries
            .iter()
            .filter(|entry| entry.message.contains(needle))
            .cloned()
            .collect()
    }

    /// Returns true if any retained entry's message contains `needle`
    pub fn contains(&self, needle: &str) -> bool {
        self.lock()
            .entries
            .iter()
            .any(|entry| entry.message.contains(needle))
    }

    /// Number of retained entries
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of entries evicted because the ring was full
    pub fn dropped(&self) -> u64 {
        self.lock().dropped
    }

    /// Discards all retained entries
    pub fn clear(&self) {
        let mut state = self.lock();
        state.entries.clear();
        state.dropped = 0;
    }
}

impl Default for KernelLog {
    fn default() -> Self {
        Self::new(LoggerConfig::default())
    }
}

impl fmt::Debug for KernelLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("KernelLog")
            .field("config", &self.config)
            .field("entries", &state.entries.len())
            .field("dropped", &state.dropped)
            .field("sink", &state.sink.is_some())
            .finish()
    }
}

static GLOBAL: OnceLock<KernelLog> = OnceLock::new();

/// Installs the process-wide log with `config`
///
/// Returns false if the log was already initialized (by an earlier call or
/// by a first use of [`global`]).
pub fn init_global(config: LoggerConfig) -> bool {
    GLOBAL.set(KernelLog::new(config)).is_ok()
}

/// The process-wide kernel log, created with defaults on first use
pub fn global() -> &'static KernelLog {
    GLOBAL.get_or_init(KernelLog::default)
}

/// Logs an info entry on the global log
pub fn info(target: &str, message: impl Into<String>) {
    global().info(target, message);
}

/// Logs a warning on the global log
pub fn warn(target: &str, message: impl Into<String>) {
    global().warn(target, message);
}

/// Logs an error on the global log
pub fn error(target: &str, message: impl Into<String>) {
    global().error(target, message);
}

/// Logs a debug entry on the global log
pub fn debug(target: &str, message: impl Into<String>) {
    global().debug(target, message);
}

#[cfg(test)]
mod tests {
    use super::*;

    struct CaptureSink {
        lines: Mutex<Vec<String>>,
    }

    impl LogSink for CaptureSink {
        fn write_entry(&self, entry: &LogEntry) {
            self.lines.lock().expect("lock sink").push(entry.to_string());
        }
    }

    fn config(min_level: LogLevel, capacity: usize) -> LoggerConfig {
        LoggerConfig {
            min_level,
            capacity,
        }
    }

    #[test]
    fn test_log_level_ordering() {
        assert!(LogLevel::Debug < LogLevel::Info);
        assert!(LogLevel::Info < LogLevel::Warn);
        assert!(LogLevel::Warn < LogLevel::Error);
    }

    #[test]
    fn test_log_entry_creation() {
        let entry = LogEntry::new(LogLevel::Info, "devicemgr", "test message");
        assert_eq!(entry.level, LogLevel::Info);
        assert_eq!(entry.target, "devicemgr");
        assert_eq!(entry.message, "test message");
        assert!(entry.source.is_none());
        assert!(entry.fields.is_empty());
    }

    #[test]
    fn test_log_entry_with_source() {
        let device = DeviceId::new();
        let entry = LogEntry::new(LogLevel::Info, "rtc", "test").with_source(device);
        assert_eq!(entry.source, Some(device));
    }

    #[test]
    fn test_log_entry_with_fields() {
        let entry = LogEntry::new(LogLevel::Info, "pci", "found")
            .with_field("vendor", "8086")
            .with_field("irq", 11);

        assert_eq!(entry.fields.len(), 2);
        assert_eq!(entry.field("vendor"), Some("8086"));
        assert_eq!(entry.field("irq"), Some("11"));
        assert_eq!(entry.field("missing"), None);
        assert_eq!(entry.to_string(), "[INFO] pci: found vendor=8086 irq=11");
    }

    #[test]
    fn test_min_level_filters() {
        let log = KernelLog::new(config(LogLevel::Warn, 8));
        assert!(!log.info("fs", "ignored"));
        assert!(log.warn("fs", "kept"));
        assert_eq!(log.len(), 1);
        assert!(log.contains("kept"));
        assert!(!log.contains("ignored"));
    }

    #[test]
    fn test_ring_evicts_oldest() {
        let log = KernelLog::new(config(LogLevel::Debug, 2));
        log.info("t", "one");
        log.info("t", "two");
        log.info("t", "three");

        let messages: Vec<String> = log.entries().into_iter().map(|e| e.message).collect();
        assert_eq!(messages, vec!["two", "three"]);
        assert_eq!(log.dropped(), 1);
    }

    #[test]
    fn test_zero_capacity_discards() {
        let log = KernelLog::new(config(LogLevel::Debug, 0));
        assert!(!log.error("t", "gone"));
        assert!(log.is_empty());
    }

    #[test]
    fn test_sink_receives_entries() {
        let log = KernelLog::default();
        let sink = Arc::new(CaptureSink {
            lines: Mutex::new(Vec::new()),
        });
        log.set_sink(sink.clone());
        log.info("devicemgr", "Init disk0");
        log.clear_sink();
        log.info("devicemgr", "Init disk1");

        let lines = sink.lines.lock().expect("lock sink");
        assert_eq!(lines.as_slice(), ["[INFO] devicemgr: Init disk0"]);
    }

    #[test]
    fn test_find_and_clear() {
        let log = KernelLog::default();
        log.info("fs", "Init cfs on partition0 (fs0)");
        log.info("fs", "Uninit cfs on partition0 (fs0)");
        assert_eq!(log.find("Init cfs").len(), 1);
        log.clear();
        assert!(log.is_empty());
    }

    #[test]
    fn test_global_log_is_shared() {
        info("test_global", "hello from global");
        assert!(global().contains("hello from global"));
    }
}
