//! Core types for APDU (Application Protocol Data Unit) operations
//!
//! This crate provides the foundational types and traits for exchanging
//! ISO/IEC 7816-4 short APDUs with a smart card:
//!
//! - [`Command`] and the [`ApduCommand`] trait for building and serializing commands
//! - [`Response`] and [`StatusWord`] for parsing card responses
//! - [`CardTransport`], the synchronous byte-level transport abstraction that
//!   secure channel layers are stacked on top of
#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![forbid(unsafe_code)]
#![warn(missing_docs, rustdoc::missing_crate_level_docs)]

// Re-export bytes for convenience
pub use bytes::{Bytes, BytesMut};

pub mod command;
pub mod response;
pub mod transport;

mod error;
pub use error::{Error, Result};

pub use command::{ApduCommand, Command, ExpectedLength, MAX_DATA_LENGTH};
pub use response::status::StatusWord;
pub use response::Response;
pub use transport::{CardTransport, TransportError};
