/// Error type shared by the store, the fetch procedure and the client controllers.
use thiserror::Error;
use uuid::Uuid;

use crate::column::ColumnType;

#[derive(Error, Debug)]
pub enum GridError {
    #[error("Base '{0}' not found")]
    BaseNotFound(Uuid),

    #[error("Table '{0}' not found")]
    TableNotFound(Uuid),

    #[error("Column '{0}' not found")]
    ColumnNotFound(Uuid),

    #[error("Row '{0}' not found")]
    RowNotFound(Uuid),

    #[error("View '{0}' not found")]
    ViewNotFound(Uuid),

    #[error("Cursor '{0}' does not reference a row in this result set")]
    CursorNotFound(String),

    #[error("Page size {0} out of range [1, {max}]", max = crate::query::MAX_PAGE_SIZE)]
    InvalidLimit(usize),

    #[error("{0} name must not be empty")]
    EmptyName(&'static str),

    #[error("Type mismatch: column expects {expected:?}, got {found:?}")]
    TypeMismatch {
        expected: ColumnType,
        found: ColumnType,
    },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Write rejected: {0}")]
    WriteRejected(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("{0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, GridError>;
