use thiserror::Error;

#[derive(Error, Debug)]
pub enum StrataError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("does not exist: {0}")]
    DoesNotExist(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("corruption: {0}")]
    Corruption(String),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("still referenced: {0}")]
    StillOpen(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("environment: {0}")]
    Environment(String),
}

pub type Result<T> = std::result::Result<T, StrataError>;
