//! The status set shared by every call across the master/slave boundary.

/// Outcome of a call across the slave-side contract.
///
/// Mirrors the co-simulation standard's status enum: `OK`, `Warning`,
/// `Discard`, `Error`, `Fatal`, `Pending` (the last is accepted for ABI
/// compatibility but never produced by this runtime, which has no
/// asynchronous `doStep`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(C)]
pub enum Status {
    Ok = 0,
    Warning = 1,
    Discard = 2,
    Error = 3,
    Fatal = 4,
    Pending = 5,
}

impl Status {
    /// Once a call returns `Fatal`, every later call on the same instance
    /// must short-circuit to `Fatal` without touching shared state again.
    pub fn is_fatal(self) -> bool {
        matches!(self, Status::Fatal)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Status::Ok => "OK",
            Status::Warning => "Warning",
            Status::Discard => "Discard",
            Status::Error => "Error",
            Status::Fatal => "Fatal",
            Status::Pending => "Pending",
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
