//! Error taxonomy for the worker-side runtime, as seen from the back-end
//! rather than the front-end.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error(transparent)]
    Segment(#[from] rdv_shm::SegmentError),

    #[error("rendezvous with master failed during startInitialization")]
    Rendezvous,

    #[error("no variable named '{0}' found in the shared segment")]
    UnknownVariable(String),

    #[error("variable '{0}' has a causality incompatible with the requested role")]
    CausalityMismatch(String),

    #[error("buffer length does not match the declared variable count")]
    LengthMismatch,

    #[error("transferring scalar values between local buffers and the shared segment failed")]
    Transfer,

    #[error("could not write declared variable names to disk")]
    WriteVariableNames(#[from] std::io::Error),
}
