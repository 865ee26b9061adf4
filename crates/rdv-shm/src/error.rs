use thiserror::Error;

/// Failures from the Shared-Segment Manager. A manager that fails
/// `create`/`open` is left non-operational (queryable via
/// [`crate::segment::SegmentManager::is_operational`]) rather than
/// panicking — every other failure surfaces through a `Result`.
#[derive(Debug, Error)]
pub enum SegmentError {
    #[error("segment '{0}' already exists")]
    AlreadyExists(String),

    #[error("segment '{0}' not found")]
    NotFound(String),

    #[error("invalid segment name: {0}")]
    InvalidName(String),

    #[error("OS refused to allocate {requested} bytes for segment '{name}': {source}")]
    Allocation {
        name: String,
        requested: usize,
        #[source]
        source: std::io::Error,
    },

    #[error("semaphore '{0}' missing or could not be created: {1}")]
    Semaphore(String, #[source] std::io::Error),

    #[error("name '{0}' already taken in segment directory")]
    NameTaken(String),

    #[error("segment directory is full (capacity {0})")]
    DirectoryFull(usize),

    #[error("insufficient free space in segment: needed {needed}, have {available}")]
    OutOfSpace { needed: usize, available: usize },

    #[error("object '{0}' not found in segment")]
    ObjectNotFound(String),

    #[error("manager is not operational")]
    NotOperational,
}
