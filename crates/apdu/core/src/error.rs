//! Core error type for APDU operations

use crate::response::error::ResponseError;
use crate::transport::TransportError;

/// Result type for APDU operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while building commands, parsing responses or talking to a transport
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The transport failed to exchange bytes with the card
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The card response could not be parsed
    #[error(transparent)]
    Response(#[from] ResponseError),

    /// Raw command bytes do not form a short APDU
    #[error("Malformed command APDU of {0} bytes")]
    InvalidCommandLength(usize),

    /// Command data does not fit a short APDU
    #[error("Command data of {0} bytes exceeds the 255-byte short APDU limit")]
    DataTooLong(usize),
}

impl Error {
    /// Returns true if the error originated in the transport layer
    pub const fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}
