//! Bridges the master-facing varargs-shaped logger callback to the typed
//! [`rdv_common::LogSink`] port.
//!
//! The standard this adapter targets specifies a printf-style logger
//! callback the component calls with an instance name, a status, a
//! category and a message (plus format arguments the *caller* of the
//! standard's own C component would supply). Nothing downstream of
//! `rdv-frontend` ever touches varargs directly — by the time a log line
//! reaches this module it is already a formatted `String`, so the
//! callback type here is a fixed-arity shim the Rust side calls with the
//! final message rather than a true C variadic function pointer.

use std::ffi::{c_char, CString};

use rdv_common::{Level, LogSink};

/// `status` uses the same numbering as [`crate::RdvStatus`]; levels that
/// have no direct 1:1 status (e.g. [`Level::Debug`]) are mapped to the
/// closest meaningful status for callers that only branch on severity.
pub type LoggerCallback = unsafe extern "C" fn(
    status: i32,
    instance_name: *const c_char,
    category: *const c_char,
    message: *const c_char,
);

pub struct CallbackLogSink {
    callback: LoggerCallback,
}

impl CallbackLogSink {
    pub fn new(callback: LoggerCallback) -> Self {
        CallbackLogSink { callback }
    }
}

fn level_to_status(level: Level) -> i32 {
    match level {
        Level::Debug => 0,
        Level::Warning => 1,
        Level::Error => 3,
        Level::Fatal => 4,
    }
}

impl LogSink for CallbackLogSink {
    fn log(&self, instance_name: &str, level: Level, category: &'static str, message: &str) {
        let Ok(instance_name) = CString::new(instance_name) else { return };
        let Ok(category) = CString::new(category) else { return };
        let Ok(message) = CString::new(message) else { return };

        unsafe {
            (self.callback)(level_to_status(level), instance_name.as_ptr(), category.as_ptr(), message.as_ptr());
        }
    }
}
