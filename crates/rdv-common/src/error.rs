//! Error taxonomy. Configuration and resource errors are `Fatal` at
//! `instantiate`; contract violations return `Discard`/`Warning` and never
//! unwind — they are values, not panics.

use thiserror::Error;

/// Configuration or resource errors encountered during `instantiate`.
/// Always maps to [`crate::status::Status::Fatal`].
#[derive(Debug, Error)]
pub enum InstantiateError {
    #[error("model description not found at {0}")]
    ModelDescriptionMissing(String),

    #[error("failed to parse model description: {0}")]
    ModelDescriptionInvalid(#[from] anyhow::Error),

    #[error("GUID mismatch: expected {expected}, found {found}")]
    GuidMismatch { expected: String, found: String },

    #[error("unknown variable referenced in configuration: {0}")]
    UnknownVariable(String),

    #[error("failed to create shared segment: {0}")]
    SegmentCreation(String),

    #[error("failed to launch worker process: {0}")]
    WorkerLaunch(String),

    #[error("rendezvous with worker timed out after {0:?}")]
    RendezvousTimeout(std::time::Duration),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_is_human_readable() {
        let e = InstantiateError::GuidMismatch {
            expected: "a".into(),
            found: "b".into(),
        };
        assert_eq!(e.to_string(), "GUID mismatch: expected a, found b");
    }
}
