//! SCP02 implementation options ("i" parameter)
//!
//! Every SCP02 card advertises a single option byte in its card recognition
//! data. Each bit selects one facet of the protocol independently of the
//! others; [`ScpParameters`] decodes them.

use std::fmt;

use crate::constants::scp;

/// Opaque view of card metadata
///
/// Card recognition data is parsed elsewhere; the engine only needs these two
/// values, and both may be absent.
pub trait CardMetadata {
    /// Secure channel protocol identifier advertised by the card
    fn scp_version(&self) -> Option<u8>;

    /// SCP02 "i" parameter advertised by the card
    fn scp_parameter(&self) -> Option<u8>;
}

/// Card recognition values already extracted by the caller
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CardRecognition {
    /// Secure channel protocol identifier
    pub scp_version: Option<u8>,
    /// SCP02 "i" parameter
    pub scp_parameter: Option<u8>,
}

impl CardRecognition {
    /// Metadata for a card advertising SCP02 with the given "i" parameter
    pub const fn scp02(parameter: u8) -> Self {
        Self {
            scp_version: Some(scp::SCP02),
            scp_parameter: Some(parameter),
        }
    }
}

impl CardMetadata for CardRecognition {
    fn scp_version(&self) -> Option<u8> {
        self.scp_version
    }

    fn scp_parameter(&self) -> Option<u8> {
        self.scp_parameter
    }
}

/// How the card expects the secure channel to be initiated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitiationMode {
    /// INITIALIZE UPDATE / EXTERNAL AUTHENTICATE
    Explicit,
    /// Channel opened implicitly on the first secured command
    Implicit,
}

/// Decoded SCP02 "i" parameter
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScpParameters(u8);

impl ScpParameters {
    const THREE_KEYS: u8 = 0x01;
    const CMAC_ON_UNMODIFIED_APDU: u8 = 0x02;
    const EXPLICIT_INITIATION: u8 = 0x04;
    const ICV_MAC_OVER_AID: u8 = 0x08;
    const ICV_ENCRYPTION: u8 = 0x10;
    const RMAC_SUPPORTED: u8 = 0x20;
    const WELL_KNOWN_CHALLENGE: u8 = 0x40;

    /// Wrap a raw "i" parameter
    pub const fn new(value: u8) -> Self {
        Self(value)
    }

    /// Parameters advertised by the card, or the `0x15` default
    pub fn from_metadata(metadata: &impl CardMetadata) -> Self {
        Self(metadata.scp_parameter().unwrap_or(scp::DEFAULT_I_PARAMETER))
    }

    /// The raw byte
    pub const fn value(self) -> u8 {
        self.0
    }

    const fn has(self, bit: u8) -> bool {
        self.0 & bit != 0
    }

    /// Three secure channel base keys instead of a single one
    pub const fn three_base_keys(self) -> bool {
        self.has(Self::THREE_KEYS)
    }

    /// C-MAC computed over the APDU before CLA and Lc are modified
    pub const fn cmac_on_unmodified_apdu(self) -> bool {
        self.has(Self::CMAC_ON_UNMODIFIED_APDU)
    }

    /// C-MAC computed over the APDU after CLA and Lc are modified
    pub const fn cmac_on_modified_apdu(self) -> bool {
        !self.cmac_on_unmodified_apdu()
    }

    /// Explicit or implicit initiation
    pub const fn initiation_mode(self) -> InitiationMode {
        if self.has(Self::EXPLICIT_INITIATION) {
            InitiationMode::Explicit
        } else {
            InitiationMode::Implicit
        }
    }

    /// First ICV is a MAC over the selected AID instead of zero
    pub const fn icv_mac_over_aid(self) -> bool {
        self.has(Self::ICV_MAC_OVER_AID)
    }

    /// ICV is encrypted before each C-MAC computation
    pub const fn icv_encryption(self) -> bool {
        self.has(Self::ICV_ENCRYPTION)
    }

    /// Card supports R-MAC
    pub const fn rmac_supported(self) -> bool {
        self.has(Self::RMAC_SUPPORTED)
    }

    /// Card challenge generated with the well-known pseudo-random algorithm
    pub const fn well_known_challenge(self) -> bool {
        self.has(Self::WELL_KNOWN_CHALLENGE)
    }
}

impl Default for ScpParameters {
    fn default() -> Self {
        Self(scp::DEFAULT_I_PARAMETER)
    }
}

impl From<u8> for ScpParameters {
    fn from(value: u8) -> Self {
        Self(value)
    }
}

impl fmt::Debug for ScpParameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScpParameters")
            .field("i", &format_args!("{:#04x}", self.0))
            .field("three_base_keys", &self.three_base_keys())
            .field("cmac_on_unmodified_apdu", &self.cmac_on_unmodified_apdu())
            .field("initiation_mode", &self.initiation_mode())
            .field("icv_mac_over_aid", &self.icv_mac_over_aid())
            .field("icv_encryption", &self.icv_encryption())
            .field("rmac_supported", &self.rmac_supported())
            .field("well_known_challenge", &self.well_known_challenge())
            .finish()
    }
}
