//! Errors raised while interpreting APDU responses

use thiserror::Error;

/// Error for APDU response processing
#[derive(Debug, Error)]
pub enum ResponseError {
    /// Fewer than two bytes, so no status word
    #[error("Incomplete response")]
    Incomplete,
}
