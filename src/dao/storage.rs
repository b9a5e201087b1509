use std::error::Error;
use thiserror::Error;

/// Result alias for quiz-storage operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Error raised by the quiz-storage backend regardless of the transport behind it.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backend could not be reached or answered with a server-side failure.
    #[error("quiz storage unavailable: {message}")]
    Unavailable {
        /// Human readable description of the failure.
        message: String,
        /// Underlying transport error.
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
    /// The backend answered but the payload did not match the expected document shape.
    #[error("quiz storage returned malformed data: {0}")]
    Malformed(String),
}

impl StoreError {
    /// Construct an unavailable error from any backend failure.
    pub fn unavailable(message: String, source: impl Error + Send + Sync + 'static) -> Self {
        StoreError::Unavailable {
            message,
            source: Box::new(source),
        }
    }
}
