//! Typed logging port.
//!
//! The master-facing ABI specifies a printf-shaped (varargs) logger
//! callback. Core code never touches varargs: the C boundary formats the
//! varargs into a `String` and calls [`LogSink::log`] through this typed
//! port.

use std::fmt;
use std::sync::Arc;

/// Severity of a log line, independent of [`crate::status::Status`] (a
/// `Discard` step still only logs at `Warning`, for instance).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    Debug,
    Warning,
    Error,
    Fatal,
}

/// Short category tag every error path emits alongside the instance name:
/// `ABORT`, `DISCARD STEP`, `WARNING`, `DEBUG`.
pub type Category = &'static str;

pub const CAT_ABORT: Category = "ABORT";
pub const CAT_DISCARD_STEP: Category = "DISCARD STEP";
pub const CAT_WARNING: Category = "WARNING";
pub const CAT_DEBUG: Category = "DEBUG";

/// A logging sink, injected at construction time rather than reached for
/// as a process-wide global — no implicit global sink.
pub trait LogSink: Send + Sync {
    fn log(&self, instance_name: &str, level: Level, category: Category, message: &str);
}

/// Default sink: routes every line through `tracing`, the crate the rest
/// of the ambient stack standardizes on.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn log(&self, instance_name: &str, level: Level, category: Category, message: &str) {
        match level {
            Level::Debug => tracing::debug!(instance = instance_name, category, "{}", message),
            Level::Warning => tracing::warn!(instance = instance_name, category, "{}", message),
            Level::Error => tracing::error!(instance = instance_name, category, "{}", message),
            Level::Fatal => tracing::error!(instance = instance_name, category, "{}", message),
        }
    }
}

/// Cheap handle passed around by the adapters; cloning shares the sink.
#[derive(Clone)]
pub struct Logger {
    instance_name: String,
    sink: Arc<dyn LogSink>,
    debug_enabled: bool,
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger")
            .field("instance_name", &self.instance_name)
            .field("debug_enabled", &self.debug_enabled)
            .finish()
    }
}

impl Logger {
    pub fn new(instance_name: impl Into<String>, sink: Arc<dyn LogSink>) -> Self {
        Logger {
            instance_name: instance_name.into(),
            sink,
            debug_enabled: false,
        }
    }

    pub fn with_default_sink(instance_name: impl Into<String>) -> Self {
        Self::new(instance_name, Arc::new(TracingSink))
    }

    /// Toggles debug-line emission.
    pub fn set_debug_logging(&mut self, enabled: bool) {
        self.debug_enabled = enabled;
    }

    pub fn debug_logging(&self) -> bool {
        self.debug_enabled
    }

    pub fn abort(&self, message: impl fmt::Display) {
        self.sink
            .log(&self.instance_name, Level::Fatal, CAT_ABORT, &message.to_string());
    }

    pub fn discard_step(&self, message: impl fmt::Display) {
        self.sink.log(
            &self.instance_name,
            Level::Warning,
            CAT_DISCARD_STEP,
            &message.to_string(),
        );
    }

    pub fn warning(&self, message: impl fmt::Display) {
        self.sink
            .log(&self.instance_name, Level::Warning, CAT_WARNING, &message.to_string());
    }

    pub fn debug(&self, message: impl fmt::Display) {
        if self.debug_enabled {
            self.sink
                .log(&self.instance_name, Level::Debug, CAT_DEBUG, &message.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct CollectingSink {
        lines: Mutex<Vec<(Level, Category, String)>>,
    }

    impl LogSink for CollectingSink {
        fn log(&self, _instance_name: &str, level: Level, category: Category, message: &str) {
            self.lines
                .lock()
                .unwrap()
                .push((level, category, message.to_string()));
        }
    }

    #[test]
    fn debug_suppressed_unless_enabled() {
        let sink = Arc::new(CollectingSink::default());
        let mut logger = Logger::new("inst", sink.clone());
        logger.debug("hidden");
        assert!(sink.lines.lock().unwrap().is_empty());

        logger.set_debug_logging(true);
        logger.debug("shown");
        let lines = sink.lines.lock().unwrap();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].1, CAT_DEBUG);
    }

    #[test]
    fn warning_and_abort_always_emitted() {
        let sink = Arc::new(CollectingSink::default());
        let logger = Logger::new("inst", sink.clone());
        logger.warning("w");
        logger.abort("fatal");
        let lines = sink.lines.lock().unwrap();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].1, CAT_WARNING);
        assert_eq!(lines[1].1, CAT_ABORT);
    }
}
