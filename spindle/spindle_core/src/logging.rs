//! Logging sink for the spindle substrate.
//!
//! The spindle crates report through a process-wide sink: a callback that
//! receives `(level, message)` pairs. A record is built up, optionally
//! annotated with metadata, and handed to the sink by calling
//! [`LogRecord::emit`], which is the end-of-record step. When no callback
//! is registered the record is discarded.
//!
//! [`install`] additionally bridges the standard `log` facade into the
//! sink so the `debug!`/`warn!`/`error!` calls made by the substrate
//! itself end up in the same place.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::RwLock;

/// Log level.
///
/// This enum represents the different log levels in the system,
/// ordered by increasing severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LogLevel {
    /// Debug information.
    Debug,

    /// Informational messages.
    Info,

    /// Warning messages.
    Warning,

    /// Error messages.
    Error,

    /// Unrecoverable faults; the process is in an undefined state.
    Fatal,
}

impl LogLevel {
    /// Get the name of this log level.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warning => "WARNING",
            Self::Error => "ERROR",
            Self::Fatal => "FATAL",
        }
    }

    /// Get the numeric value of this log level.
    ///
    /// Higher values indicate higher severity.
    pub fn as_number(&self) -> u8 {
        match self {
            Self::Debug => 0,
            Self::Info => 1,
            Self::Warning => 2,
            Self::Error => 3,
            Self::Fatal => 4,
        }
    }

    /// Check if this log level is at least as severe as the given level.
    pub fn is_at_least(&self, level: LogLevel) -> bool {
        self.as_number() >= level.as_number()
    }
}

impl FromStr for LogLevel {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            "warning" | "warn" => Ok(Self::Warning),
            "error" | "err" => Ok(Self::Error),
            "fatal" => Ok(Self::Fatal),
            _ => Err(()),
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The sink callback signature: a level and a formatted message.
pub type LogCallback = Box<dyn Fn(LogLevel, &str) + Send + Sync>;

static CALLBACK: RwLock<Option<LogCallback>> = RwLock::new(None);

/// Register the process-wide sink callback.
///
/// Replaces any previously registered callback. Until a callback is
/// registered, emitted records are discarded.
pub fn set_callback(callback: impl Fn(LogLevel, &str) + Send + Sync + 'static) {
    *CALLBACK.write().expect("log callback lock poisoned") = Some(Box::new(callback));
}

/// Remove the sink callback, returning to the discarding default.
pub fn clear_callback() {
    *CALLBACK.write().expect("log callback lock poisoned") = None;
}

fn dispatch(level: LogLevel, message: &str) {
    if let Ok(callback) = CALLBACK.read() {
        if let Some(callback) = callback.as_ref() {
            // failures of the sink itself are suppressed
            let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                callback(level, message);
            }));
        }
    }
}

/// A log record.
///
/// This structure represents one record on its way to the sink: the
/// level, the message, a timestamp taken at creation, and optional
/// metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogRecord {
    /// The log level.
    pub level: LogLevel,

    /// The log message.
    pub message: String,

    /// The timestamp when the record was created.
    pub timestamp: chrono::DateTime<chrono::Utc>,

    /// Additional metadata.
    pub metadata: Vec<(String, String)>,
}

impl LogRecord {
    /// Create a new log record with the current timestamp.
    pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
            timestamp: chrono::Utc::now(),
            metadata: Vec::new(),
        }
    }

    /// Add metadata to this log record.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.push((key.into(), value.into()));
        self
    }

    /// Format this log record for display.
    pub fn format(&self) -> String {
        let mut result = format!(
            "{} [{}] - {}",
            self.timestamp.format("%Y-%m-%d %H:%M:%S%.3f"),
            self.level,
            self.message
        );

        if !self.metadata.is_empty() {
            let metadata_str = self
                .metadata
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect::<Vec<_>>()
                .join(" ");
            result = format!("{} - {}", result, metadata_str);
        }

        result
    }

    /// Close the record and hand it to the sink.
    ///
    /// This is the end-of-record step; the record is consumed.
    pub fn emit(self) {
        dispatch(self.level, &self.format());
    }
}

/// Bridge from the `log` facade into the spindle sink.
struct FacadeBridge;

impl log::Log for FacadeBridge {
    fn enabled(&self, _metadata: &log::Metadata<'_>) -> bool {
        true
    }

    fn log(&self, record: &log::Record<'_>) {
        let level = match record.level() {
            log::Level::Error => LogLevel::Error,
            log::Level::Warn => LogLevel::Warning,
            log::Level::Info => LogLevel::Info,
            log::Level::Debug | log::Level::Trace => LogLevel::Debug,
        };
        LogRecord::new(level, record.args().to_string()).emit();
    }

    fn flush(&self) {}
}

static FACADE_BRIDGE: FacadeBridge = FacadeBridge;

/// Install the sink as the global `log` facade logger.
///
/// After this call, `log::warn!` and friends are delivered to the
/// registered callback. Fails if another global logger was installed
/// first; that failure is ignored because the application's logger then
/// receives the records instead, which is the intent.
pub fn install() {
    if log::set_logger(&FACADE_BRIDGE).is_ok() {
        log::set_max_level(log::LevelFilter::Debug);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::sync::Mutex;

    #[test]
    fn test_log_level_ordering() {
        assert!(LogLevel::Fatal > LogLevel::Error);
        assert!(LogLevel::Error > LogLevel::Warning);
        assert!(LogLevel::Warning > LogLevel::Info);
        assert!(LogLevel::Info > LogLevel::Debug);
    }

    #[test]
    fn test_log_level_from_str() {
        assert_eq!("debug".parse::<LogLevel>().unwrap(), LogLevel::Debug);
        assert_eq!("DEBUG".parse::<LogLevel>().unwrap(), LogLevel::Debug);
        assert_eq!("info".parse::<LogLevel>().unwrap(), LogLevel::Info);
        assert_eq!("warning".parse::<LogLevel>().unwrap(), LogLevel::Warning);
        assert_eq!("warn".parse::<LogLevel>().unwrap(), LogLevel::Warning);
        assert_eq!("error".parse::<LogLevel>().unwrap(), LogLevel::Error);
        assert_eq!("err".parse::<LogLevel>().unwrap(), LogLevel::Error);
        assert_eq!("fatal".parse::<LogLevel>().unwrap(), LogLevel::Fatal);
        assert!("invalid".parse::<LogLevel>().is_err());
    }

    #[test]
    fn test_log_level_is_at_least() {
        assert!(LogLevel::Fatal.is_at_least(LogLevel::Error));
        assert!(LogLevel::Error.is_at_least(LogLevel::Error));
        assert!(!LogLevel::Info.is_at_least(LogLevel::Warning));
    }

    #[test]
    fn test_record_format() {
        let record = LogRecord::new(LogLevel::Warning, "thread already running")
            .with_metadata("thread", "worker_3");

        let formatted = record.format();
        assert!(formatted.contains("[WARNING]"));
        assert!(formatted.contains("thread already running"));
        assert!(formatted.contains("thread=worker_3"));
    }

    #[test]
    fn test_record_serialization() {
        let record = LogRecord::new(LogLevel::Info, "pool started").with_metadata("size", "4");

        let serialized = serde_json::to_string(&record).unwrap();
        let deserialized: LogRecord = serde_json::from_str(&serialized).unwrap();

        assert_eq!(record.level, deserialized.level);
        assert_eq!(record.message, deserialized.message);
        assert_eq!(record.metadata, deserialized.metadata);
    }

    #[test]
    fn test_sink_callback() {
        let count = Arc::new(AtomicUsize::new(0));
        let last = Arc::new(Mutex::new(String::new()));

        {
            let count = Arc::clone(&count);
            let last = Arc::clone(&last);
            set_callback(move |level, message| {
                count.fetch_add(1, Ordering::SeqCst);
                *last.lock().unwrap() = format!("{}: {}", level, message);
            });
        }

        LogRecord::new(LogLevel::Error, "mutex destroyed while locked").emit();

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(last.lock().unwrap().starts_with("ERROR:"));
        assert!(last
            .lock()
            .unwrap()
            .contains("mutex destroyed while locked"));

        clear_callback();
        LogRecord::new(LogLevel::Error, "discarded").emit();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
