use thiserror::Error;

/// Errors that can occur within the storage layer.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying SQLite / rusqlite error.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// A JSON column could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A stored value could not be mapped back to its domain type.
    #[error("Invalid row: {0}")]
    InvalidRow(String),

    /// No row of the given kind exists with this ID.
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// A previous holder of the connection lock panicked.
    #[error("Connection lock poisoned")]
    Poisoned,
}

pub type Result<T> = std::result::Result<T, StoreError>;
