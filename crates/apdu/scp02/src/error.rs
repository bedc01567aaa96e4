use gpcard_apdu_core::{StatusWord, TransportError, response::error::ResponseError};
use thiserror::Error;

/// Result type for SCP02 operations
pub type Result<T> = std::result::Result<T, Error>;

/// Broad category of an [`Error`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The underlying transport failed
    Transport,
    /// The card sent something SCP02 does not allow
    Protocol,
    /// A cryptogram or response MAC did not verify
    Authentication,
    /// The caller asked for something invalid
    Configuration,
    /// A cipher primitive rejected its input
    CryptoEngine,
    /// The card answered with an error status word
    CardStatus,
}

/// Error type for SCP02 operations
#[derive(Debug, Error)]
pub enum Error {
    /// Transport-related errors
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Errors raised by the APDU core while encoding or decoding
    #[error(transparent)]
    Apdu(#[from] gpcard_apdu_core::Error),

    /// Response-related errors
    #[error(transparent)]
    Response(#[from] ResponseError),

    /// Wrong data length
    #[error("Invalid length: expected {expected}, got {actual}")]
    InvalidLength {
        /// Expected length
        expected: usize,
        /// Actual length
        actual: usize,
    },

    /// The card violated the SCP02 message format or sequencing
    #[error("Protocol violation: {0}")]
    Protocol(&'static str),

    /// Unsupported SCP version
    #[error("Unsupported SCP version: {0:#04x}")]
    UnsupportedScpVersion(u8),

    /// The card answered with a different key set than requested
    #[error("Key version mismatch: requested {requested:#04x}, card reported {reported:#04x}")]
    KeyVersionMismatch {
        /// Key version number sent in INITIALIZE UPDATE
        requested: u8,
        /// Key version number reported by the card
        reported: u8,
    },

    /// Card or host authentication failed
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(&'static str),

    /// The card rejected the host cryptogram (6300)
    #[error("Card rejected the host cryptogram")]
    HostCryptogramRejected,

    /// The card is locked (6982 or 6983)
    #[error("Card is locked: {0}")]
    CardLocked(StatusWord),

    /// The requested key set does not exist on the card (6A88)
    #[error("Referenced data not found")]
    ReferencedDataNotFound,

    /// Response indicates an error condition
    #[error("{command} failed with status {status} ({})", status.description())]
    CardStatus {
        /// Command that failed
        command: &'static str,
        /// Status word returned by the card
        status: StatusWord,
    },

    /// Invalid security level requested
    #[error("Invalid security level: {0}")]
    InvalidSecurityLevel(&'static str),

    /// Command data does not fit once secure messaging overhead is added
    #[error("Command data too long: {length} bytes, at most {max} allowed")]
    DataTooLong {
        /// Length of the command data
        length: usize,
        /// Maximum data length for the active security level
        max: usize,
    },

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    InvalidConfig(&'static str),

    /// The key provider has no key for the given identifier and version
    #[error("No key {key_id:#04x} for key version {key_version:#04x}")]
    KeyNotFound {
        /// Key identifier
        key_id: u8,
        /// Key version number
        key_version: u8,
    },

    /// Cryptographic operation failed
    #[error("Cryptographic error: {0}")]
    Crypto(&'static str),

    /// Operation requires an open secure channel
    #[error("Secure channel not established")]
    NoSecureChannel,
}

impl Error {
    /// The category this error belongs to
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Transport(_) => ErrorKind::Transport,
            Self::Apdu(err) if err.is_transport() => ErrorKind::Transport,
            Self::Apdu(_)
            | Self::Response(_)
            | Self::InvalidLength { .. }
            | Self::Protocol(_)
            | Self::UnsupportedScpVersion(_)
            | Self::KeyVersionMismatch { .. }
            | Self::NoSecureChannel => ErrorKind::Protocol,
            Self::AuthenticationFailed(_) | Self::HostCryptogramRejected => {
                ErrorKind::Authentication
            }
            Self::CardLocked(_) | Self::ReferencedDataNotFound | Self::CardStatus { .. } => {
                ErrorKind::CardStatus
            }
            Self::InvalidSecurityLevel(_)
            | Self::DataTooLong { .. }
            | Self::InvalidConfig(_)
            | Self::KeyNotFound { .. } => ErrorKind::Configuration,
            Self::Crypto(_) => ErrorKind::CryptoEngine,
        }
    }

    /// The status word carried by this error, if any
    pub const fn status_word(&self) -> Option<StatusWord> {
        match self {
            Self::CardLocked(sw) | Self::CardStatus { status: sw, .. } => Some(*sw),
            Self::ReferencedDataNotFound => Some(crate::constants::status::REFERENCED_DATA_NOT_FOUND),
            Self::HostCryptogramRejected => Some(crate::constants::status::AUTHENTICATION_FAILED),
            _ => None,
        }
    }
}

impl From<cipher::InvalidLength> for Error {
    fn from(_: cipher::InvalidLength) -> Self {
        Self::Crypto("invalid key length")
    }
}
