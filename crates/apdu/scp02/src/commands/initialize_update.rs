//! INITIALIZE UPDATE command for GlobalPlatform
//!
//! This command starts a secure channel session: the host sends its challenge
//! and the card answers with its own challenge and a cryptogram.

use gpcard_apdu_core::{ApduCommand, ExpectedLength, Response};
use tracing::warn;

use crate::{
    Error, Result,
    constants::{cla, ins, scp, status},
    crypto::{CardChallenge, Cryptogram, HostChallenge, SequenceCounter},
    util::check_length,
};

/// INITIALIZE UPDATE command for GlobalPlatform
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitializeUpdateCommand {
    key_version: u8,
    host_challenge: HostChallenge,
}

impl InitializeUpdateCommand {
    /// Create a new INITIALIZE UPDATE command with a host challenge
    pub const fn with_challenge(key_version: u8, host_challenge: HostChallenge) -> Self {
        Self {
            key_version,
            host_challenge,
        }
    }

    /// Create a new INITIALIZE UPDATE command with random host challenge
    pub fn with_random_challenge(key_version: u8) -> Self {
        let mut challenge = HostChallenge::default();
        rand::RngCore::fill_bytes(&mut rand::rng(), &mut challenge);
        Self::with_challenge(key_version, challenge)
    }

    /// The host challenge carried by this command
    pub const fn host_challenge(&self) -> &HostChallenge {
        &self.host_challenge
    }
}

impl ApduCommand for InitializeUpdateCommand {
    type Success = InitializeUpdateResponse;
    type Error = Error;

    fn convert_error(error: gpcard_apdu_core::Error) -> Self::Error {
        error.into()
    }

    fn class(&self) -> u8 {
        cla::GP
    }

    fn instruction(&self) -> u8 {
        ins::INITIALIZE_UPDATE
    }

    fn p1(&self) -> u8 {
        self.key_version
    }

    fn p2(&self) -> u8 {
        0x00
    }

    fn data(&self) -> Option<&[u8]> {
        Some(&self.host_challenge)
    }

    fn expected_length(&self) -> Option<ExpectedLength> {
        // Maximum length (256)
        Some(0x00)
    }

    fn parse_response(response: Response) -> Result<Self::Success> {
        match response.status() {
            status::SUCCESS => InitializeUpdateResponse::parse(response.payload()),
            sw @ (status::SECURITY_CONDITION_NOT_SATISFIED
            | status::AUTHENTICATION_METHOD_BLOCKED) => {
                warn!(status = %sw, "INITIALIZE UPDATE refused, card is locked");
                Err(Error::CardLocked(sw))
            }
            status::REFERENCED_DATA_NOT_FOUND => {
                warn!("INITIALIZE UPDATE refused, key set not found");
                Err(Error::ReferencedDataNotFound)
            }
            sw => Err(Error::CardStatus {
                command: "INITIALIZE UPDATE",
                status: sw,
            }),
        }
    }
}

/// Successful INITIALIZE UPDATE response body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitializeUpdateResponse {
    /// Key diversification data
    pub key_diversification_data: [u8; 10],
    /// Key version number of the key set the card used
    pub key_version: u8,
    /// Secure channel protocol identifier
    pub scp_version: u8,
    /// Card sequence counter
    pub sequence_counter: SequenceCounter,
    /// Card challenge
    pub card_challenge: CardChallenge,
    /// Card cryptogram
    pub card_cryptogram: Cryptogram,
}

impl InitializeUpdateResponse {
    /// Parse the 28-byte response body
    pub fn parse(payload: &[u8]) -> Result<Self> {
        check_length(payload, scp::INITIALIZE_UPDATE_RESPONSE_LENGTH)?;

        let mut response = Self {
            key_diversification_data: [0u8; 10],
            key_version: payload[10],
            scp_version: payload[11],
            sequence_counter: [0u8; 2],
            card_challenge: [0u8; 6],
            card_cryptogram: [0u8; 8],
        };
        response
            .key_diversification_data
            .copy_from_slice(&payload[0..10]);
        response.sequence_counter.copy_from_slice(&payload[12..14]);
        response.card_challenge.copy_from_slice(&payload[14..20]);
        response.card_cryptogram.copy_from_slice(&payload[20..28]);

        Ok(response)
    }
}
