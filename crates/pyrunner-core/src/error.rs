use thiserror::Error;

#[derive(Debug, Error)]
pub enum PyrunnerError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Job not found: {id}")]
    JobNotFound { id: String },

    #[error("Run not found: {id}")]
    RunNotFound { id: String },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Database error: {0}")]
    Database(String),
}

impl PyrunnerError {
    /// Short error code string returned to HTTP clients.
    pub fn code(&self) -> &'static str {
        match self {
            PyrunnerError::Config(_) => "CONFIG_ERROR",
            PyrunnerError::JobNotFound { .. } => "JOB_NOT_FOUND",
            PyrunnerError::RunNotFound { .. } => "RUN_NOT_FOUND",
            PyrunnerError::InvalidRequest(_) => "INVALID_REQUEST",
            PyrunnerError::Database(_) => "DATABASE_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, PyrunnerError>;
