//! Constants used by the SCP02 handshake and secure messaging
//!
//! This module contains the GlobalPlatform values SCP02 relies on: command
//! classes, instruction codes, key derivation constants and status words.

/// GlobalPlatform command classes
pub mod cla {
    /// GlobalPlatform command class
    pub const GP: u8 = 0x80;
    /// Secure messaging indication bit, set on every C-MAC'd command
    pub const SECURE_MESSAGING: u8 = 0x04;
    /// Bits of CLA that carry the logical channel number
    pub const LOGICAL_CHANNEL_MASK: u8 = 0x03;
    /// Mask clearing the secure messaging and logical channel bits
    pub const CHANNEL_AGNOSTIC_MASK: u8 = !(SECURE_MESSAGING | LOGICAL_CHANNEL_MASK);
}

/// GlobalPlatform instruction codes
pub mod ins {
    /// INITIALIZE UPDATE command
    pub const INITIALIZE_UPDATE: u8 = 0x50;
    /// EXTERNAL AUTHENTICATE command
    pub const EXTERNAL_AUTHENTICATE: u8 = 0x82;
}

/// Constants describing the SCP02 protocol itself
pub mod scp {
    /// Protocol identifier reported by SCP02 cards
    pub const SCP02: u8 = 0x02;
    /// Default "i" parameter when the card does not advertise one
    pub const DEFAULT_I_PARAMETER: u8 = 0x15;
    /// Key version number meaning "any key set"
    pub const ANY_KEY_VERSION: u8 = 0x00;
    /// DES block size
    pub const BLOCK_SIZE: usize = 8;
    /// Length of every C-MAC and R-MAC
    pub const MAC_LENGTH: usize = 8;
    /// Length of the INITIALIZE UPDATE response body
    pub const INITIALIZE_UPDATE_RESPONSE_LENGTH: usize = 28;
    /// Default maximum short APDU data length
    pub const DEFAULT_MAX_APDU_DATA_LENGTH: usize = 255;
}

/// Session key derivation constants
pub mod derivation {
    /// Derivation constant for the C-MAC key
    pub const C_MAC: [u8; 2] = [0x01, 0x01];
    /// Derivation constant for the R-MAC key
    pub const R_MAC: [u8; 2] = [0x01, 0x02];
    /// Derivation constant for the encryption key
    pub const ENC: [u8; 2] = [0x01, 0x82];
    /// Derivation constant for the data encryption key
    pub const DEK: [u8; 2] = [0x01, 0x81];
}

/// Key identifiers within a key set
pub mod key_id {
    /// Secure channel encryption key
    pub const ENC: u8 = 0x01;
    /// Secure channel MAC key
    pub const MAC: u8 = 0x02;
    /// Data encryption key
    pub const DEK: u8 = 0x03;
}

/// Commonly used status words in GlobalPlatform
pub mod status {
    use gpcard_apdu_core::StatusWord;

    /// Success
    pub const SUCCESS: StatusWord = StatusWord::new(0x90, 0x00);
    /// Authentication of host cryptogram failed
    pub const AUTHENTICATION_FAILED: StatusWord = StatusWord::new(0x63, 0x00);
    /// Security condition not satisfied
    pub const SECURITY_CONDITION_NOT_SATISFIED: StatusWord = StatusWord::new(0x69, 0x82);
    /// Authentication method blocked
    pub const AUTHENTICATION_METHOD_BLOCKED: StatusWord = StatusWord::new(0x69, 0x83);
    /// Referenced data not found
    pub const REFERENCED_DATA_NOT_FOUND: StatusWord = StatusWord::new(0x6A, 0x88);
}
