use thiserror::Error;

/// Failures launching or tearing down the external worker process.
#[derive(Debug, Error)]
pub enum SpawnError {
    #[error("executable path is not valid UTF-8 or otherwise unusable: {0}")]
    InvalidExecutable(String),

    #[error("failed to set executable permissions on '{path}': {source}")]
    Permissions {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to launch worker process '{command}': {source}")]
    Launch {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to create job object for worker process")]
    JobObject,

    #[error("failed to assign worker process to job object")]
    AssignJobObject,

    #[error("failed to place worker process in its own process group: {0}")]
    ProcessGroup(std::io::Error),
}
