//! Shared vocabulary for the co-simulation rendezvous runtime: status
//! codes, the logging port, the error taxonomy, scalar-record types, and
//! a bounded-retry helper. Every other crate in the workspace depends on
//! this one and nothing here depends back on them.

pub mod backoff;
pub mod error;
pub mod log;
pub mod status;
pub mod types;

pub use error::InstantiateError;
pub use log::{Level, LogSink, Logger, TracingSink};
pub use status::Status;
pub use types::{Causality, FixedName, ValueRef, ValueType, Variability, MAX_NAME_LEN};
