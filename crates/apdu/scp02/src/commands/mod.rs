//! Handshake commands for SCP02
//!
//! The two commands exchanged while opening a secure channel.

pub mod external_authenticate;
pub mod initialize_update;

pub use external_authenticate::ExternalAuthenticateCommand;
pub use initialize_update::{InitializeUpdateCommand, InitializeUpdateResponse};
