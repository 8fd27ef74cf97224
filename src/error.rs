use thiserror::Error;

#[derive(Error, Debug)]
pub enum FarmError {
    /// Malformed input such as a bad email address or a missing report window.
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// Some sub-operations of a grouped write failed. Succeeded writes are not rolled back.
    #[error("{operation} partially failed: {succeeded} succeeded, {failed} failed ({message})")]
    PartialFailure {
        operation: String,
        succeeded: usize,
        failed: usize,
        message: String,
    },

    /// Store or storage backend failure. Never retried here.
    #[error("Backend unavailable: {0}")]
    TransientIo(String),
}

impl From<sqlx::Error> for FarmError {
    fn from(err: sqlx::Error) -> Self {
        FarmError::TransientIo(err.to_string())
    }
}

impl From<sqlx::migrate::MigrateError> for FarmError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        FarmError::TransientIo(err.to_string())
    }
}

impl From<std::io::Error> for FarmError {
    fn from(err: std::io::Error) -> Self {
        FarmError::TransientIo(err.to_string())
    }
}

impl From<csv::Error> for FarmError {
    fn from(err: csv::Error) -> Self {
        FarmError::TransientIo(err.to_string())
    }
}

pub type FarmResult<T> = Result<T, FarmError>;
