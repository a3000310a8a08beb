use thiserror::Error;

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid media file: {0}")]
    InvalidMedia(String),

    #[error("record not found: {0}")]
    NotFound(String),

    #[error("operation already active: {0}")]
    AlreadyActive(String),

    #[error("no active operation: {0}")]
    NotActive(String),

    #[error("operation cancelled: {0}")]
    Cancelled(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, CatalogError>;
