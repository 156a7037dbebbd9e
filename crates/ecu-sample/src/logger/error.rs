//! Error types for the logger module.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LoggerError {
    /// A `store_reading` job arrived without a payload.
    #[error("Job from {0} carries no reading")]
    MissingReading(String),

    /// The payload is not a valid reading.
    #[error("Invalid reading: {0}")]
    InvalidReading(#[from] serde_json::Error),
}
