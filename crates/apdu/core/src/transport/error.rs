//! Errors reported by card transports

use thiserror::Error;

/// Failure to move bytes between host and card
#[derive(Debug, Error)]
pub enum TransportError {
    /// No card or reader connection
    #[error("Not connected to a card")]
    Connection,

    /// The exchange was interrupted
    #[error("Failed to transmit data")]
    Transmission,

    /// The card did not answer in time
    #[error("Operation timed out")]
    Timeout,

    /// Transport-specific failure
    #[error("{0}")]
    Other(String),
}
