//! GlobalPlatform SCP02 secure channel
//!
//! This crate establishes and runs the SCP02 secure channel protocol on top of
//! a [`CardTransport`](gpcard_apdu_core::CardTransport):
//!
//! - [`ScpParameters`] decodes the "i" parameter that selects protocol options
//! - [`SessionKeys`] derives per-session keys from long-term keys supplied by a
//!   [`KeyProvider`]
//! - [`Scp02Session`] runs the INITIALIZE UPDATE / EXTERNAL AUTHENTICATE
//!   handshake
//! - [`SecureMessaging`] wraps commands and unwraps responses once the channel
//!   is open
//!
//! A session owns one channel and all of its chaining state, so every call
//! that touches the card takes `&mut self`. Share a session between threads
//! only behind a lock that serializes complete command/response exchanges.
#![forbid(unsafe_code)]
#![warn(missing_docs, rustdoc::missing_crate_level_docs)]

pub mod commands;
pub mod config;
pub mod constants;
pub mod crypto;
pub mod error;
pub mod keys;
pub mod params;
pub mod secure_channel;
pub mod security_level;
pub mod session;
pub mod util;

pub use config::ChannelConfig;
pub use error::{Error, ErrorKind, Result};
pub use keys::{
    DefaultKeys, DerivationContext, DerivationStrategy, KeyProvider, KeyUsage, SessionKey,
    SessionKeys, StaticKey, StaticKeys,
};
pub use params::{CardMetadata, CardRecognition, InitiationMode, ScpParameters};
pub use secure_channel::SecureMessaging;
pub use security_level::SecurityLevel;
pub use session::{HandshakeStage, HandshakeState, Scp02Session};

pub use commands::{ExternalAuthenticateCommand, InitializeUpdateCommand, InitializeUpdateResponse};
