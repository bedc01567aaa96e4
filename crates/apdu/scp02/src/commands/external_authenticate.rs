//! EXTERNAL AUTHENTICATE command for GlobalPlatform
//!
//! This command authenticates the host to the card and fixes the security
//! level of the secure channel.

use gpcard_apdu_core::{ApduCommand, ExpectedLength, Response};

use crate::{
    Error, Result,
    constants::{cla, ins, status},
    crypto::Cryptogram,
    security_level::SecurityLevel,
};

/// EXTERNAL AUTHENTICATE command for GlobalPlatform
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalAuthenticateCommand {
    security_level: SecurityLevel,
    host_cryptogram: Cryptogram,
}

impl ExternalAuthenticateCommand {
    /// Create a new EXTERNAL AUTHENTICATE command
    pub const fn new(security_level: SecurityLevel, host_cryptogram: Cryptogram) -> Self {
        Self {
            security_level,
            host_cryptogram,
        }
    }
}

impl ApduCommand for ExternalAuthenticateCommand {
    type Success = ();
    type Error = Error;

    fn convert_error(error: gpcard_apdu_core::Error) -> Self::Error {
        error.into()
    }

    fn class(&self) -> u8 {
        cla::GP
    }

    fn instruction(&self) -> u8 {
        ins::EXTERNAL_AUTHENTICATE
    }

    fn p1(&self) -> u8 {
        self.security_level.bits()
    }

    fn p2(&self) -> u8 {
        0x00
    }

    fn data(&self) -> Option<&[u8]> {
        Some(&self.host_cryptogram)
    }

    fn expected_length(&self) -> Option<ExpectedLength> {
        None
    }

    fn parse_response(response: Response) -> Result<Self::Success> {
        match response.status() {
            status::SUCCESS => Ok(()),
            status::AUTHENTICATION_FAILED => Err(Error::HostCryptogramRejected),
            sw => Err(Error::CardStatus {
                command: "EXTERNAL AUTHENTICATE",
                status: sw,
            }),
        }
    }
}
