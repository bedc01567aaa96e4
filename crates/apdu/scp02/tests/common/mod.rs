//! Simulated SCP02 card for integration tests
//!
//! The card answers INITIALIZE UPDATE and EXTERNAL AUTHENTICATE with the
//! default test keys, checks the C-MAC of every secured command, echoes the
//! command data back, and signs responses with an R-MAC when requested.

#![allow(dead_code)]

use gpcard_apdu_core::{ApduCommand, Bytes, CardTransport, Command, StatusWord, TransportError};
use gpcard_scp02::{
    CardRecognition, DefaultKeys, DerivationContext, DerivationStrategy, ScpParameters,
    SecureMessaging, SecurityLevel, SessionKeys,
    crypto::{HostChallenge, Icv, calculate_cryptogram, decrypt_cbc, mac_full_3des},
};
use hex_literal::hex;

pub const KEY_VERSION: u8 = 0x01;
pub const CARD_CHALLENGE: [u8; 6] = hex!("D9857D532F04");

const SUCCESS: StatusWord = StatusWord::new(0x90, 0x00);
const WRONG_LENGTH: StatusWord = StatusWord::new(0x67, 0x00);
const CRYPTOGRAM_REJECTED: StatusWord = StatusWord::new(0x63, 0x00);
const SECURITY_NOT_SATISFIED: StatusWord = StatusWord::new(0x69, 0x82);
const CONDITIONS_NOT_SATISFIED: StatusWord = StatusWord::new(0x69, 0x85);
const REFERENCED_DATA_NOT_FOUND: StatusWord = StatusWord::new(0x6A, 0x88);

#[derive(Debug)]
struct CardChannel {
    keys: SessionKeys,
    host_challenge: HostChallenge,
    sequence_counter: [u8; 2],
    level: SecurityLevel,
    mirror: Option<SecureMessaging>,
    r_icv: Icv,
}

#[derive(Debug)]
pub struct SimulatedCard {
    pub parameters: ScpParameters,
    pub sequence_counter: u16,
    /// Status returned to INITIALIZE UPDATE instead of a normal answer
    pub initialize_update_status: Option<StatusWord>,
    pub reject_host_cryptogram: bool,
    /// Flip an R-MAC bit in the answer to the n-th secured command (1-based)
    pub corrupt_rmac_at: Option<usize>,
    /// Fail the transport on the n-th secured command (1-based)
    pub transport_failure_at: Option<usize>,
    /// Every raw command received
    pub commands: Vec<Vec<u8>>,
    secured_commands: usize,
    channel: Option<CardChannel>,
}

impl Default for SimulatedCard {
    fn default() -> Self {
        Self::new(ScpParameters::default())
    }
}

impl SimulatedCard {
    pub fn new(parameters: ScpParameters) -> Self {
        Self {
            parameters,
            sequence_counter: 0x0001,
            initialize_update_status: None,
            reject_host_cryptogram: false,
            corrupt_rmac_at: None,
            transport_failure_at: None,
            commands: Vec::new(),
            secured_commands: 0,
            channel: None,
        }
    }

    /// Card recognition data advertising SCP02 with this card's parameter
    pub fn recognition(&self) -> CardRecognition {
        CardRecognition::scp02(self.parameters.value())
    }

    /// Session keys of the current handshake
    pub fn session_keys(&self) -> Option<&SessionKeys> {
        self.channel.as_ref().map(|channel| &channel.keys)
    }

    /// Whether the card considers the secure channel open
    pub fn is_authenticated(&self) -> bool {
        self.channel
            .as_ref()
            .is_some_and(|channel| channel.mirror.is_some())
    }

    fn initialize_update(&mut self, command: &Command) -> (Vec<u8>, StatusWord) {
        self.channel = None;

        if let Some(status) = self.initialize_update_status {
            return (Vec::new(), status);
        }
        if command.p1 != 0 && command.p1 != KEY_VERSION {
            return (Vec::new(), REFERENCED_DATA_NOT_FOUND);
        }
        let Ok(host_challenge) = HostChallenge::try_from(command.payload()) else {
            return (Vec::new(), WRONG_LENGTH);
        };

        self.sequence_counter += 1;
        let sequence_counter = self.sequence_counter.to_be_bytes();
        let context = DerivationContext {
            sequence_counter,
            key_version: KEY_VERSION,
        };
        let keys = SessionKeys::derive(
            &DefaultKeys::key_set(),
            DerivationStrategy::SingleBaseKey { key_id: 1 },
            &context,
        )
        .unwrap();
        let cryptogram = calculate_cryptogram(
            keys.enc(),
            &sequence_counter,
            &CARD_CHALLENGE,
            &host_challenge,
            false,
        )
        .unwrap();

        let mut response = vec![0u8; 10];
        response.extend_from_slice(&[KEY_VERSION, 0x02]);
        response.extend_from_slice(&sequence_counter);
        response.extend_from_slice(&CARD_CHALLENGE);
        response.extend_from_slice(&cryptogram);

        self.channel = Some(CardChannel {
            keys,
            host_challenge,
            sequence_counter,
            level: SecurityLevel::NONE,
            mirror: None,
            r_icv: Icv::default(),
        });
        (response, SUCCESS)
    }

    fn external_authenticate(&mut self, raw: &[u8], command: &Command) -> (Vec<u8>, StatusWord) {
        let Some(channel) = self.channel.as_mut() else {
            return (Vec::new(), CONDITIONS_NOT_SATISFIED);
        };
        let Ok(level) = SecurityLevel::from_bits(command.p1) else {
            self.channel = None;
            return (Vec::new(), SECURITY_NOT_SATISFIED);
        };

        let host_cryptogram = calculate_cryptogram(
            channel.keys.enc(),
            &channel.sequence_counter,
            &CARD_CHALLENGE,
            &channel.host_challenge,
            true,
        )
        .unwrap();
        let mut bootstrap = SecureMessaging::new(
            channel.keys.clone(),
            self.parameters,
            SecurityLevel::C_MAC,
            None,
            255,
        )
        .unwrap();
        let expected = bootstrap
            .wrap(&Command::new_with_data(
                0x80,
                0x82,
                command.p1,
                0x00,
                host_cryptogram.to_vec(),
            ))
            .unwrap();

        if self.reject_host_cryptogram || expected.to_bytes().unwrap().as_ref() != raw {
            self.channel = None;
            return (Vec::new(), CRYPTOGRAM_REJECTED);
        }

        let icv = bootstrap.icv().unwrap();
        channel.mirror = Some(
            SecureMessaging::new(channel.keys.clone(), self.parameters, level, Some(icv), 255)
                .unwrap(),
        );
        channel.level = level;
        channel.r_icv = icv;
        (Vec::new(), SUCCESS)
    }

    fn secured_command(&mut self, raw: &[u8], command: &Command) -> (Vec<u8>, StatusWord) {
        self.secured_commands += 1;
        let count = self.secured_commands;

        let Some(channel) = self.channel.as_mut().filter(|c| c.mirror.is_some()) else {
            return (Vec::new(), CONDITIONS_NOT_SATISFIED);
        };
        let level = channel.level;

        let plain = if level.has_cmac() {
            let payload = command.payload();
            if command.cla & 0x04 == 0 || payload.len() < 8 {
                self.channel = None;
                return (Vec::new(), SECURITY_NOT_SATISFIED);
            }
            let body = &payload[..payload.len() - 8];
            let data = if level.has_cdecryption() && !body.is_empty() {
                match decrypt_cbc(channel.keys.enc(), body) {
                    Ok(data) => data,
                    Err(_) => {
                        self.channel = None;
                        return (Vec::new(), SECURITY_NOT_SATISFIED);
                    }
                }
            } else {
                body.to_vec()
            };

            let mut plain = Command::new(command.cla & !0x04, command.ins, command.p1, command.p2);
            if !data.is_empty() {
                plain = plain.with_data(data);
            }
            if let Some(le) = command.le {
                plain = plain.with_le(le);
            }
            plain
        } else {
            command.clone()
        };

        let verified = channel
            .mirror
            .as_mut()
            .and_then(|mirror| mirror.wrap(&plain).ok())
            .is_some_and(|rewrapped| rewrapped.to_bytes().unwrap().as_ref() == raw);
        if !verified {
            self.channel = None;
            return (Vec::new(), SECURITY_NOT_SATISFIED);
        }

        let mut response = plain.payload().to_vec();
        if level.has_rmac() {
            let mut mac_input = plain.header().to_vec();
            mac_input[0] &= 0xF8;
            if !plain.payload().is_empty() {
                mac_input.push(plain.payload().len() as u8);
                mac_input.extend_from_slice(plain.payload());
            }
            mac_input.push(response.len() as u8);
            mac_input.extend_from_slice(&response);
            mac_input.extend_from_slice(&SUCCESS.to_bytes());

            let mut rmac = mac_full_3des(channel.keys.rmac(), &channel.r_icv, &mac_input).unwrap();
            channel.r_icv = rmac;
            if self.corrupt_rmac_at == Some(count) {
                rmac[0] ^= 0x01;
            }
            response.extend_from_slice(&rmac);
        }
        (response, SUCCESS)
    }
}

impl CardTransport for SimulatedCard {
    fn do_transmit_raw(&mut self, raw: &[u8]) -> Result<Bytes, TransportError> {
        self.commands.push(raw.to_vec());

        let command = Command::from_bytes(raw)
            .map_err(|e| TransportError::Other(format!("malformed command: {e}")))?;

        let (mut data, status) = match (command.cla, command.ins) {
            (0x80, 0x50) => self.initialize_update(&command),
            (_, 0x82) => self.external_authenticate(raw, &command),
            _ => {
                if self.transport_failure_at == Some(self.secured_commands + 1) {
                    return Err(TransportError::Transmission);
                }
                self.secured_command(raw, &command)
            }
        };

        data.extend_from_slice(&status.to_bytes());
        Ok(Bytes::from(data))
    }

    fn is_connected(&self) -> bool {
        true
    }

    fn reset(&mut self) -> Result<(), TransportError> {
        self.channel = None;
        Ok(())
    }
}
