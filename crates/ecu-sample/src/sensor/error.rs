//! Error types for the sensor module.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SensorError {
    /// The reading could not be encoded as a job payload.
    #[error("Reading encoding failed: {0}")]
    Encoding(#[from] serde_json::Error),
}
