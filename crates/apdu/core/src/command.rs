//! APDU command definitions and traits
//!
//! This module provides types and traits for working with short APDU commands
//! according to ISO/IEC 7816-4.

use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};

use crate::{Error, Response};

/// Expected length (Le) of a short APDU; `0x00` requests up to 256 bytes
pub type ExpectedLength = u8;

/// Largest data field a short APDU can carry
pub const MAX_DATA_LENGTH: usize = 255;

/// Core trait for APDU commands
pub trait ApduCommand {
    /// Success response type
    type Success;

    /// Error response type
    type Error: fmt::Debug;

    /// Convert core Error to command-specific error type
    fn convert_error(error: Error) -> Self::Error;

    /// Command class (CLA)
    fn class(&self) -> u8;

    /// Instruction code (INS)
    fn instruction(&self) -> u8;

    /// First parameter (P1)
    fn p1(&self) -> u8;

    /// Second parameter (P2)
    fn p2(&self) -> u8;

    /// Command payload data (optional)
    fn data(&self) -> Option<&[u8]>;

    /// Expected response length (optional)
    fn expected_length(&self) -> Option<ExpectedLength>;

    /// Convert to raw APDU bytes
    ///
    /// Fails when the data field does not fit a single-byte Lc.
    fn to_bytes(&self) -> crate::Result<Bytes> {
        let lc = self
            .data()
            .map(|data| u8::try_from(data.len()).map_err(|_| Error::DataTooLong(data.len())))
            .transpose()?;

        let mut buffer = BytesMut::with_capacity(self.command_length());

        // Header: CLA, INS, P1, P2
        buffer.put_u8(self.class());
        buffer.put_u8(self.instruction());
        buffer.put_u8(self.p1());
        buffer.put_u8(self.p2());

        if let (Some(lc), Some(data)) = (lc, self.data()) {
            buffer.put_u8(lc);
            buffer.put_slice(data);
        }

        if let Some(le) = self.expected_length() {
            buffer.put_u8(le);
        }

        Ok(buffer.freeze())
    }

    /// Calculate length of serialized command
    fn command_length(&self) -> usize {
        4 + self.data().map_or(0, |data| 1 + data.len())
            + usize::from(self.expected_length().is_some())
    }

    /// Convert to a generic Command
    fn to_command(&self) -> Command {
        Command {
            cla: self.class(),
            ins: self.instruction(),
            p1: self.p1(),
            p2: self.p2(),
            data: self.data().map(Bytes::copy_from_slice),
            le: self.expected_length(),
        }
    }

    /// Parse response into the command's response type
    fn parse_response(response: Response) -> Result<Self::Success, Self::Error>;

    /// Parse raw bytes into the command's response type
    fn parse_response_raw(bytes: Bytes) -> Result<Self::Success, Self::Error> {
        let response = Response::from_bytes(&bytes)
            .map_err(|e| Self::convert_error(e.into()))?;
        Self::parse_response(response)
    }
}

/// Generic APDU command structure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    /// Command class byte
    pub cla: u8,
    /// Instruction byte
    pub ins: u8,
    /// Parameter 1
    pub p1: u8,
    /// Parameter 2
    pub p2: u8,
    /// Command data (optional)
    pub data: Option<Bytes>,
    /// Expected length (optional)
    pub le: Option<ExpectedLength>,
}

impl Command {
    /// Create a new command with just the header bytes
    pub const fn new(cla: u8, ins: u8, p1: u8, p2: u8) -> Self {
        Self {
            cla,
            ins,
            p1,
            p2,
            data: None,
            le: None,
        }
    }

    /// Create a new command with expected response length (Le)
    pub const fn new_with_le(cla: u8, ins: u8, p1: u8, p2: u8, le: ExpectedLength) -> Self {
        Self {
            cla,
            ins,
            p1,
            p2,
            data: None,
            le: Some(le),
        }
    }

    /// Create a new command with data payload
    pub fn new_with_data<T: Into<Bytes>>(cla: u8, ins: u8, p1: u8, p2: u8, data: T) -> Self {
        Self::new(cla, ins, p1, p2).with_data(data)
    }

    /// Create a new command with both data and expected length
    pub fn new_with_data_and_le<T: Into<Bytes>>(
        cla: u8,
        ins: u8,
        p1: u8,
        p2: u8,
        data: T,
        le: ExpectedLength,
    ) -> Self {
        Self::new(cla, ins, p1, p2).with_data(data).with_le(le)
    }

    /// Set the data field
    pub fn with_data<T: Into<Bytes>>(mut self, data: T) -> Self {
        self.data = Some(data.into());
        self
    }

    /// Set the expected length field
    pub const fn with_le(mut self, le: ExpectedLength) -> Self {
        self.le = Some(le);
        self
    }

    /// The header bytes `CLA INS P1 P2`
    pub const fn header(&self) -> [u8; 4] {
        [self.cla, self.ins, self.p1, self.p2]
    }

    /// Command data, empty when the command carries none
    pub fn payload(&self) -> &[u8] {
        self.data.as_deref().unwrap_or_default()
    }

    /// Parse a command from raw bytes
    pub fn from_bytes(data: &[u8]) -> Result<Self, Error> {
        if data.len() < 4 {
            return Err(Error::InvalidCommandLength(data.len()));
        }

        let mut command = Self::new(data[0], data[1], data[2], data[3]);

        if data.len() == 5 {
            // Case 2: only Le present
            command.le = Some(data[4]);
        } else if data.len() > 5 {
            let lc = data[4] as usize;
            if lc == 0 || data.len() < 5 + lc {
                return Err(Error::InvalidCommandLength(data.len()));
            }
            command.data = Some(Bytes::copy_from_slice(&data[5..5 + lc]));

            match data.len() - (5 + lc) {
                0 => {}
                1 => command.le = Some(data[5 + lc]),
                _ => return Err(Error::InvalidCommandLength(data.len())),
            }
        }

        Ok(command)
    }
}

impl ApduCommand for Command {
    type Success = Response;
    type Error = Error;

    fn convert_error(error: Error) -> Self::Error {
        error
    }

    fn class(&self) -> u8 {
        self.cla
    }

    fn instruction(&self) -> u8 {
        self.ins
    }

    fn p1(&self) -> u8 {
        self.p1
    }

    fn p2(&self) -> u8 {
        self.p2
    }

    fn data(&self) -> Option<&[u8]> {
        self.data.as_deref()
    }

    fn expected_length(&self) -> Option<ExpectedLength> {
        self.le
    }

    fn parse_response(response: Response) -> Result<Self::Success, Self::Error> {
        Ok(response)
    }
}
