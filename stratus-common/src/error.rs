use std::time::Duration;

pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Object not found: {0}")]
    NotFound(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("{operation} failed: HTTP {status} - {message}")]
    Remote {
        operation: &'static str,
        status: u16,
        message: String,
    },
    #[error("Missing parts: expected 1..={expected}, found {found:?}")]
    MissingParts { expected: u32, found: Vec<u32> },
    #[error("Expiry of {}s exceeds the maximum of {}s", .requested.as_secs(), .max.as_secs())]
    ExpiryTooLong { requested: Duration, max: Duration },
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Backend-independent classification of a [`StoreError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Io,
    MissingParts,
    ExpiryTooLong,
    InvalidInput,
}

impl StoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StoreError::NotFound(_) => ErrorKind::NotFound,
            StoreError::Io(_) | StoreError::Http(_) | StoreError::Remote { .. } => ErrorKind::Io,
            StoreError::MissingParts { .. } => ErrorKind::MissingParts,
            StoreError::ExpiryTooLong { .. } => ErrorKind::ExpiryTooLong,
            StoreError::InvalidInput(_) => ErrorKind::InvalidInput,
        }
    }

    pub fn invalid(msg: impl Into<String>) -> Self {
        StoreError::InvalidInput(msg.into())
    }
}
