//! SCP02 secure messaging
//!
//! [`SecureMessaging`] wraps outgoing commands with a chained C-MAC (and
//! optionally encrypts their data) and verifies the chained R-MAC of incoming
//! responses. It owns the chaining state of exactly one channel, so every
//! operation takes `&mut self`; commands must be wrapped, sent, and their
//! responses unwrapped strictly in order.

use bytes::{BufMut, Bytes, BytesMut};
use gpcard_apdu_core::{ApduCommand, CardTransport, Command, MAX_DATA_LENGTH, Response};
use subtle::ConstantTimeEq;
use tracing::{debug, trace, warn};

use crate::{
    Error, Result,
    constants::{cla, scp},
    crypto::{Icv, encrypt_cbc, encrypt_icv, mac_full_3des},
    keys::SessionKeys,
    params::ScpParameters,
    security_level::SecurityLevel,
};

/// Secure messaging state for one open SCP02 channel
#[derive(Debug)]
pub struct SecureMessaging {
    keys: SessionKeys,
    parameters: ScpParameters,
    security_level: SecurityLevel,
    max_data_length: usize,
    /// Last C-MAC; `None` until the first command of an unseeded channel
    icv: Option<Icv>,
    /// Last verified R-MAC
    r_icv: Icv,
    /// Header and data of the last command, kept for R-MAC verification
    rmac_snapshot: Option<Vec<u8>>,
}

impl SecureMessaging {
    /// Create the channel state
    ///
    /// `icv` seeds both the command and response chaining values; when absent
    /// the first C-MAC is computed over a zero ICV without encryption.
    /// `max_apdu_data_length` is the largest data field the card accepts; the
    /// MAC and encryption overhead is subtracted from it.
    pub fn new(
        keys: SessionKeys,
        parameters: ScpParameters,
        security_level: SecurityLevel,
        icv: Option<Icv>,
        max_apdu_data_length: usize,
    ) -> Result<Self> {
        security_level.validate()?;

        if max_apdu_data_length > MAX_DATA_LENGTH {
            return Err(Error::InvalidConfig(
                "max APDU data length exceeds a short APDU",
            ));
        }
        let mut max_data_length = max_apdu_data_length;
        if security_level.has_cmac() {
            max_data_length = max_data_length
                .checked_sub(scp::MAC_LENGTH)
                .ok_or(Error::InvalidConfig("max APDU data length cannot hold a C-MAC"))?;
            if security_level.has_cdecryption() {
                max_data_length = max_data_length
                    .checked_sub(scp::BLOCK_SIZE)
                    .ok_or(Error::InvalidConfig(
                        "max APDU data length cannot hold encryption padding",
                    ))?;
            }
        }

        Ok(Self {
            keys,
            parameters,
            security_level,
            max_data_length,
            icv,
            r_icv: icv.unwrap_or_default(),
            rmac_snapshot: None,
        })
    }

    /// The security level applied by this channel
    pub const fn security_level(&self) -> SecurityLevel {
        self.security_level
    }

    /// The "i" parameter this channel follows
    pub const fn parameters(&self) -> ScpParameters {
        self.parameters
    }

    /// Largest command data field accepted by [`wrap`](Self::wrap)
    pub const fn max_data_length(&self) -> usize {
        self.max_data_length
    }

    /// Current command chaining value
    pub const fn icv(&self) -> Option<Icv> {
        self.icv
    }

    /// Current response chaining value
    pub const fn r_icv(&self) -> Icv {
        self.r_icv
    }

    /// Session keys of this channel
    pub const fn keys(&self) -> &SessionKeys {
        &self.keys
    }

    /// Protect a command according to the security level
    pub fn wrap(&mut self, command: &Command) -> Result<Command> {
        let data = command.payload();
        let nc = data.len();
        let header = command.header();

        // Checked before any chaining state changes
        if nc > self.max_data_length {
            return Err(Error::DataTooLong {
                length: nc,
                max: self.max_data_length,
            });
        }

        if self.security_level.has_rmac() {
            let mut snapshot = header.to_vec();
            if nc > 0 {
                snapshot.push(nc as u8);
                snapshot.extend_from_slice(data);
            }
            snapshot[0] &= cla::CHANNEL_AGNOSTIC_MASK;
            self.rmac_snapshot = Some(snapshot);
        }

        if !self.security_level.has_cmac() {
            return Ok(command.clone());
        }

        let mut mac_input = Vec::with_capacity(5 + nc);
        mac_input.extend_from_slice(&header);
        mac_input.push(nc as u8);
        mac_input.extend_from_slice(data);

        if self.parameters.cmac_on_modified_apdu() {
            Self::mark_secure(&mut mac_input);
        }

        let icv = match self.icv {
            None => Icv::default(),
            Some(icv) if self.parameters.icv_encryption() => encrypt_icv(self.keys.mac(), &icv)?,
            Some(icv) => icv,
        };
        let cmac = mac_full_3des(self.keys.mac(), &icv, &mac_input)?;
        self.icv = Some(cmac);

        if self.parameters.cmac_on_unmodified_apdu() {
            Self::mark_secure(&mut mac_input);
        }

        let body = if nc > 0 && self.security_level.has_cdecryption() {
            Bytes::from(encrypt_cbc(self.keys.enc(), data)?)
        } else {
            Bytes::copy_from_slice(data)
        };

        let mut protected = BytesMut::with_capacity(body.len() + scp::MAC_LENGTH);
        protected.put_slice(&body);
        protected.put_slice(&cmac);

        let mut wrapped = Command::new(mac_input[0], header[1], header[2], header[3])
            .with_data(protected.freeze());
        if let Some(le) = command.le {
            wrapped = wrapped.with_le(le);
        }

        trace!(command = %hex::encode(wrapped.to_bytes()?), "Wrapped command");
        Ok(wrapped)
    }

    /// Verify and strip the R-MAC of a response
    ///
    /// On a MAC mismatch the response chaining value is left untouched.
    pub fn unwrap(&mut self, response: Response) -> Result<Response> {
        if !self.security_level.has_rmac() {
            return Ok(response);
        }

        let payload = response.payload();
        if payload.len() < scp::MAC_LENGTH {
            warn!(length = payload.len(), "Response too short to carry an R-MAC");
            return Err(Error::Protocol("response too short to carry an R-MAC"));
        }
        let snapshot = self
            .rmac_snapshot
            .as_ref()
            .ok_or(Error::Protocol("no command to match the response against"))?;

        let (rdata, card_rmac) = payload.split_at(payload.len() - scp::MAC_LENGTH);

        let mut mac_input = Vec::with_capacity(snapshot.len() + rdata.len() + 3);
        mac_input.extend_from_slice(snapshot);
        mac_input.push(rdata.len() as u8);
        mac_input.extend_from_slice(rdata);
        mac_input.extend_from_slice(&response.status().to_bytes());

        let rmac = mac_full_3des(self.keys.rmac(), &self.r_icv, &mac_input)?;
        if !bool::from(rmac.ct_eq(card_rmac)) {
            warn!("Response MAC verification failed");
            return Err(Error::AuthenticationFailed("invalid R-MAC"));
        }
        self.r_icv = rmac;

        Ok(Response::new(
            Bytes::copy_from_slice(rdata),
            response.status(),
        ))
    }

    /// Wrap a command, send it, and unwrap the response
    pub fn transmit<T: CardTransport + ?Sized>(
        &mut self,
        transport: &mut T,
        command: &Command,
    ) -> Result<Response> {
        let wrapped = self.wrap(command)?;
        let raw = transport.transmit_raw(&wrapped.to_bytes()?)?;
        let response = Response::from_bytes(&raw)?;
        let response = self.unwrap(response)?;

        debug!(status = %response.status(), "Secured exchange completed");
        Ok(response)
    }

    fn mark_secure(apdu: &mut [u8]) {
        apdu[0] |= cla::SECURE_MESSAGING;
        apdu[4] = apdu[4].wrapping_add(scp::MAC_LENGTH as u8);
    }
}
