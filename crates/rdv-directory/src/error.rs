use thiserror::Error;

#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("duplicate variable name '{0}' in model description")]
    DuplicateName(String),

    #[error("segment allocation failed while building variable directory: {0}")]
    Segment(#[from] rdv_shm::SegmentError),

    #[error("string start value for '{0}' does not fit the inline capacity")]
    StringTooLong(String),
}
